//! Quote/Route Resolver
//!
//! Picks the execution venue and prices the trade. Curve tokens are checked
//! against the migration index first, since the curve program and the
//! general liquidity venue take incompatible instruction sets.

use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::{debug, info};

use super::errors::{diagnostic, ExecutionError, ExecutionResult};
use super::jupiter::SwapAggregator;
use super::raydium::MigrationIndex;
use crate::utils::types::{Asset, Quote, TradeSide};

/// Curve trade that has not migrated; built from on-chain curve state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurveOrder {
    pub mint: Pubkey,
    pub side: TradeSide,
    /// Lamports in for a buy, token base units in for a sell
    pub amount: u64,
    pub slippage_bps: u16,
}

#[derive(Debug, Clone)]
pub enum Route {
    /// Priced by a routing venue that composes the transaction server side
    Aggregated(Quote),
    BondingCurve(CurveOrder),
}

pub struct RouteResolver {
    aggregator: Arc<dyn SwapAggregator>,
    general_liquidity: Arc<dyn SwapAggregator>,
    migrations: Arc<dyn MigrationIndex>,
}

impl RouteResolver {
    pub fn new(
        aggregator: Arc<dyn SwapAggregator>,
        general_liquidity: Arc<dyn SwapAggregator>,
        migrations: Arc<dyn MigrationIndex>,
    ) -> Self {
        Self { aggregator, general_liquidity, migrations }
    }

    pub fn aggregator(&self) -> &dyn SwapAggregator {
        self.aggregator.as_ref()
    }

    pub fn general_liquidity(&self) -> &dyn SwapAggregator {
        self.general_liquidity.as_ref()
    }

    /// Fungible swap through the aggregated router
    pub async fn resolve_swap(
        &self,
        input: &Asset,
        output: &Asset,
        amount: u64,
        slippage_bps: u16,
    ) -> ExecutionResult<Quote> {
        if input.mint == output.mint {
            return Err(ExecutionError::NoRouteFound(format!(
                "input and output are both {}",
                input.symbol
            )));
        }

        let quote = self
            .aggregator
            .quote(input, output, amount, slippage_bps)
            .await
            .map_err(|e| ExecutionError::NoRouteFound(diagnostic(&e)))?;

        debug!("Resolved {} -> {} via {}", input.symbol, output.symbol, quote.venue);
        Ok(quote)
    }

    /// Curve token trade. Migrated tokens are quoted on general liquidity,
    /// others become a bonding-curve order.
    pub async fn resolve_curve_trade(
        &self,
        token: &Asset,
        side: TradeSide,
        amount: u64,
        slippage_bps: u16,
    ) -> ExecutionResult<Route> {
        let migrated = self
            .migrations
            .is_migrated(&token.mint)
            .await
            .map_err(|e| ExecutionError::NoRouteFound(diagnostic(&e)))?;

        if !migrated {
            info!("{} trades on its bonding curve", token.mint);
            return Ok(Route::BondingCurve(CurveOrder {
                mint: token.mint,
                side,
                amount,
                slippage_bps,
            }));
        }

        let sol = Asset::native_sol();
        let (input, output) = match side {
            TradeSide::Buy => (&sol, token),
            TradeSide::Sell => (token, &sol),
        };
        let quote = self
            .general_liquidity
            .quote(input, output, amount, slippage_bps)
            .await
            .map_err(|e| ExecutionError::NoRouteFound(diagnostic(&e)))?;

        info!("{} migrated; routing through {}", token.mint, quote.venue);
        Ok(Route::Aggregated(quote))
    }

    /// Venue client that issued `quote`
    pub fn composer_for(&self, quote: &Quote) -> &dyn SwapAggregator {
        match quote.venue {
            crate::utils::types::Venue::GeneralLiquidity => self.general_liquidity.as_ref(),
            _ => self.aggregator.as_ref(),
        }
    }
}

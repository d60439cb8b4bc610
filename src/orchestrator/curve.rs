//! Bonding-curve buy, sell and launch
//!
//! Tokens still on their curve are traded through the curve program with
//! locally built instructions. Migrated tokens are quoted and composed by
//! the general liquidity venue instead.

use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::instruction::create_associated_token_account_idempotent;
use tracing::{info, Instrument};

use super::{require_positive, require_representable, CallContext, Invocation, LaunchReceipt, Stage, SwapReceipt, TradeOrchestrator};
use crate::execution::errors::{diagnostic, ExecutionError, ExecutionResult};
use crate::execution::pumpfun::{self, BondingCurveState, GlobalState};
use crate::execution::tx_builder::{ensure_associated_account, EphemeralSigner};
use crate::execution::{FeeStrategy, Route};
use crate::utils::helpers::format_sol;
use crate::utils::types::{Asset, TradeSide};

/// New curve token
#[derive(Debug, Clone)]
pub struct TokenLaunch {
    pub name: String,
    pub symbol: String,
    /// Already-uploaded metadata JSON
    pub metadata_uri: String,
    /// Lamports spent buying from the fresh curve in the same transaction
    pub initial_buy_lamports: u64,
}

impl TradeOrchestrator {
    /// Buys `mint` for `lamports`
    pub async fn buy_token(
        &self,
        mint: Pubkey,
        lamports: u64,
        strategy: FeeStrategy,
        ctx: &CallContext,
    ) -> ExecutionResult<SwapReceipt> {
        let mut inv = Invocation::new("buy", ctx);
        let span = inv.span();
        let result = self
            .run_curve_trade(&mut inv, mint, TradeSide::Buy, lamports, &strategy)
            .instrument(span)
            .await;
        inv.finish(result)
    }

    /// Sells `token_amount` base units of `mint`
    pub async fn sell_token(
        &self,
        mint: Pubkey,
        token_amount: u64,
        strategy: FeeStrategy,
        ctx: &CallContext,
    ) -> ExecutionResult<SwapReceipt> {
        let mut inv = Invocation::new("sell", ctx);
        let span = inv.span();
        let result = self
            .run_curve_trade(&mut inv, mint, TradeSide::Sell, token_amount, &strategy)
            .instrument(span)
            .await;
        inv.finish(result)
    }

    /// Creates a token on a fresh curve, optionally buying in the same
    /// transaction. The mint keypair lives only for this call.
    pub async fn launch_token(
        &self,
        launch: TokenLaunch,
        strategy: FeeStrategy,
        ctx: &CallContext,
    ) -> ExecutionResult<LaunchReceipt> {
        let mut inv = Invocation::new("launch", ctx);
        let span = inv.span();
        let result = self
            .run_launch(&mut inv, &launch, &strategy)
            .instrument(span)
            .await;
        inv.finish(result)
    }

    async fn run_curve_trade(
        &self,
        inv: &mut Invocation<'_>,
        mint: Pubkey,
        side: TradeSide,
        amount: u64,
        strategy: &FeeStrategy,
    ) -> ExecutionResult<SwapReceipt> {
        inv.advance(Stage::Validating, "checking wallet and balance")?;
        let (wallet, provider) = self.connected_wallet()?;
        require_positive(amount, "trade amount")?;
        let payer = wallet.address();
        let reserve = self.fee_reserve(strategy);
        match side {
            TradeSide::Buy => self.ensure_sol_balance(&payer, amount.saturating_add(reserve)).await?,
            TradeSide::Sell => {
                self.ensure_sol_balance(&payer, reserve).await?;
                self.ensure_token_balance(&payer, &mint, amount).await?;
            }
        }

        inv.advance(Stage::Quoting, format!("locating market for {}", mint))?;
        let decimals = self
            .rpc
            .mint_decimals(&mint)
            .await
            .map_err(|e| ExecutionError::NoRouteFound(diagnostic(&e)))?;
        let token = Asset::new(mint, decimals, mint.to_string());
        require_representable(&token)?;
        let sol = Asset::native_sol();

        let route = self
            .router
            .resolve_curve_trade(&token, side, amount, self.curve_slippage_bps)
            .await?;

        let order = match route {
            Route::Aggregated(quote) => {
                inv.advance(Stage::Building, format!("composing swap via {} ({})", quote.venue, strategy))?;
                let steps = self.build_from_quote(&quote, &payer, strategy).await?;
                let receipt = self.sign_and_submit(inv, &provider, strategy, steps).await?;
                return Ok(SwapReceipt {
                    receipt,
                    realized_input: quote.realized_input(),
                    realized_output: quote.realized_output(),
                });
            }
            Route::BondingCurve(order) => order,
        };

        let (global, curve) = self.curve_state(&mint).await?;
        let (instruction, realized_input, realized_output) = match side {
            TradeSide::Buy => {
                let tokens = curve.buy_tokens(order.amount);
                if tokens == 0 {
                    return Err(ExecutionError::NoRouteFound(format!(
                        "curve returns no tokens for {}",
                        format_sol(order.amount)
                    )));
                }
                let max_cost = pumpfun::with_buy_slippage(order.amount, order.slippage_bps);
                (
                    pumpfun::buy_instruction(&payer, &mint, &global.fee_recipient(), tokens, max_cost)
                        .map_err(|e| ExecutionError::BuildFailed(diagnostic(&e)))?,
                    sol.from_base_units(order.amount),
                    token.from_base_units(tokens),
                )
            }
            TradeSide::Sell => {
                let lamports = curve.sell_lamports(order.amount, global.fee_basis_points);
                if lamports == 0 {
                    return Err(ExecutionError::NoRouteFound(format!(
                        "curve returns nothing for {} tokens",
                        token.from_base_units(order.amount)
                    )));
                }
                let min_out = pumpfun::with_sell_slippage(lamports, order.slippage_bps);
                (
                    pumpfun::sell_instruction(&payer, &mint, &global.fee_recipient(), order.amount, min_out)
                        .map_err(|e| ExecutionError::BuildFailed(diagnostic(&e)))?,
                    token.from_base_units(order.amount),
                    sol.from_base_units(lamports),
                )
            }
        };
        info!("Curve {:?} of {}: {} -> {}", side, mint, realized_input, realized_output);

        inv.advance(Stage::Building, format!("building curve {:?} ({})", side, strategy))?;
        let mut instructions = Vec::with_capacity(2);
        if side == TradeSide::Buy {
            ensure_associated_account(self.rpc.as_ref(), &mut instructions, &payer, &mint, &payer).await?;
        }
        instructions.push(instruction);

        let receipt = self
            .submit_local(inv, &provider, strategy, instructions, None)
            .await?;
        Ok(SwapReceipt { receipt, realized_input, realized_output })
    }

    async fn run_launch(
        &self,
        inv: &mut Invocation<'_>,
        launch: &TokenLaunch,
        strategy: &FeeStrategy,
    ) -> ExecutionResult<LaunchReceipt> {
        inv.advance(Stage::Validating, "checking wallet and balance")?;
        let (wallet, provider) = self.connected_wallet()?;
        if launch.name.trim().is_empty() || launch.symbol.trim().is_empty() {
            return Err(ExecutionError::BuildFailed("token name and symbol are required".into()));
        }
        if launch.metadata_uri.trim().is_empty() {
            return Err(ExecutionError::BuildFailed("metadata uri is required".into()));
        }
        let payer = wallet.address();
        self.ensure_sol_balance(
            &payer,
            launch.initial_buy_lamports.saturating_add(self.fee_reserve(strategy)),
        )
        .await?;

        inv.advance(Stage::Building, format!("building launch of {} ({})", launch.symbol, strategy))?;
        let global = pumpfun::fetch_global(self.rpc.as_ref())
            .await
            .map_err(|e| ExecutionError::BuildFailed(diagnostic(&e)))?;

        let mint_signer = EphemeralSigner::generate();
        let mint = mint_signer.pubkey();
        let create = pumpfun::create_instruction(&payer, &mint, &launch.name, &launch.symbol, &launch.metadata_uri)
            .map_err(|e| ExecutionError::BuildFailed(diagnostic(&e)))?;
        let mut instructions = vec![create];

        if launch.initial_buy_lamports > 0 {
            let tokens = global.initial_buy_tokens(launch.initial_buy_lamports);
            if tokens == 0 {
                return Err(ExecutionError::BuildFailed(format!(
                    "initial buy of {} buys no tokens",
                    format_sol(launch.initial_buy_lamports)
                )));
            }
            // a brand-new mint has no holder accounts yet
            instructions.push(create_associated_token_account_idempotent(
                &payer,
                &payer,
                &mint,
                &spl_token::id(),
            ));
            let buy = pumpfun::buy_instruction(
                &payer,
                &mint,
                &global.fee_recipient(),
                tokens,
                pumpfun::with_buy_slippage(launch.initial_buy_lamports, self.curve_slippage_bps),
            )
            .map_err(|e| ExecutionError::BuildFailed(diagnostic(&e)))?;
            instructions.push(buy);
        }
        info!("Launching {} ({}) as {}", launch.name, launch.symbol, mint);

        let receipt = self
            .submit_local(inv, &provider, strategy, instructions, Some(mint_signer))
            .await?;
        Ok(LaunchReceipt { receipt, mint })
    }

    /// Global config and the mint's curve; completed curves cannot trade
    async fn curve_state(&self, mint: &Pubkey) -> ExecutionResult<(GlobalState, BondingCurveState)> {
        let global = pumpfun::fetch_global(self.rpc.as_ref())
            .await
            .map_err(|e| ExecutionError::NoRouteFound(diagnostic(&e)))?;
        let curve = pumpfun::fetch_bonding_curve(self.rpc.as_ref(), mint)
            .await
            .map_err(|e| ExecutionError::NoRouteFound(diagnostic(&e)))?
            .ok_or_else(|| ExecutionError::NoRouteFound(format!("{} has no bonding curve", mint)))?;

        if curve.complete {
            return Err(ExecutionError::BuildFailed(format!(
                "bonding curve for {} is complete and awaiting migration",
                mint
            )));
        }
        Ok((global, curve))
    }
}

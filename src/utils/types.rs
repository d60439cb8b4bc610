//! Common types used throughout the pipeline

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey, pubkey::Pubkey};
use std::fmt;
use std::time::{Duration, Instant};

/// Wrapped SOL mint
pub const NATIVE_MINT: Pubkey = pubkey!("So11111111111111111111111111111111111111112");

/// Decimal places of the native asset
pub const NATIVE_DECIMALS: u8 = 9;

/// Widest precision a human amount can carry exactly
pub const MAX_DECIMALS: u8 = 28;

/// A fungible asset identified by its mint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub mint: Pubkey,
    pub decimals: u8,
    pub symbol: String,
}

impl Asset {
    pub fn new(mint: Pubkey, decimals: u8, symbol: impl Into<String>) -> Self {
        Self { mint, decimals, symbol: symbol.into() }
    }

    pub fn native_sol() -> Self {
        Self::new(NATIVE_MINT, NATIVE_DECIMALS, "SOL")
    }

    pub fn is_native(&self) -> bool {
        self.mint == NATIVE_MINT
    }

    /// Whether amounts of this asset fit a `Decimal` without rounding
    pub fn is_representable(&self) -> bool {
        self.decimals <= MAX_DECIMALS
    }

    /// Human amount to base units. `None` when negative, fractional past the
    /// asset's precision, or too large for a u64.
    pub fn to_base_units(&self, amount: Decimal) -> Option<u64> {
        if amount.is_sign_negative() {
            return None;
        }
        let scaled = amount.checked_mul(Decimal::from(10u64.checked_pow(self.decimals as u32)?))?;
        if !scaled.fract().is_zero() {
            return None;
        }
        scaled.to_u64()
    }

    /// Base units to a human amount at this asset's precision. Precision
    /// past `MAX_DECIMALS` is truncated rather than rejected.
    pub fn from_base_units(&self, raw: u64) -> Decimal {
        if let Ok(value) = Decimal::try_from_i128_with_scale(raw as i128, self.decimals as u32) {
            return value.normalize();
        }
        let mut value = Decimal::from_i128_with_scale(raw as i128, MAX_DECIMALS as u32);
        for _ in MAX_DECIMALS..self.decimals {
            if value.is_zero() {
                break;
            }
            value = value / Decimal::TEN;
        }
        value.normalize()
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.symbol, self.mint)
    }
}

/// Execution venue chosen by the route resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    /// Aggregated router across many pools
    Aggregator,
    /// General AMM liquidity, where migrated curve tokens trade
    GeneralLiquidity,
    /// Creator bonding curve, before migration
    BondingCurve,
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Venue::Aggregator => write!(f, "AGGREGATOR"),
            Venue::GeneralLiquidity => write!(f, "GENERAL_LIQUIDITY"),
            Venue::BondingCurve => write!(f, "BONDING_CURVE"),
        }
    }
}

/// Buy or sell on a bonding curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Priced route for one user action. Never cached across actions.
#[derive(Debug, Clone)]
pub struct Quote {
    pub input: Asset,
    pub output: Asset,
    pub in_amount: u64,
    pub out_amount: u64,
    pub min_out_amount: u64,
    pub price_impact_pct: f64,
    pub venue: Venue,
    /// Venue-specific route payload, handed back when composing
    pub route: serde_json::Value,
    pub expires_at: Instant,
}

impl Quote {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    pub fn realized_input(&self) -> Decimal {
        self.input.from_base_units(self.in_amount)
    }

    pub fn realized_output(&self) -> Decimal {
        self.output.from_base_units(self.out_amount)
    }
}

pub(crate) fn expiry_after(ttl: Duration) -> Instant {
    Instant::now() + ttl
}

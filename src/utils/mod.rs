//! Shared helpers and data types

pub mod helpers;
pub mod types;

pub use types::{Asset, Quote, TradeSide, Venue, NATIVE_MINT};

//! Solana Trade Pipeline Library
//!
//! Transaction construction, multi-provider signing and execution for
//! transfers, swaps, bonding-curve trades and NFT listings on Solana.

pub mod config;
pub mod execution;
pub mod network;
pub mod orchestrator;
pub mod telemetry;
pub mod utils;

// Re-export main types
pub use config::AppConfig;
pub use execution::{ExecutionError, ExecutionResult, FeeMode, FeeStrategy, WalletSession};
pub use network::{ChainRpc, RpcManager};
pub use orchestrator::{
    CallContext, ExecutionReceipt, FinalityStatus, LaunchReceipt, ListingRequest, ProgressEvent,
    Stage, SwapReceipt, TokenLaunch, TradeOrchestrator, TradeTarget, Venues,
};
pub use utils::{Asset, Quote};

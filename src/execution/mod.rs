//! Execution Module
//!
//! Transaction construction, signing and submission:
//! - route resolution across aggregator, general liquidity and bonding curve
//! - transaction builder for opaque and locally composed payloads
//! - wallet capability adapter over custody backends
//! - fee strategies, Jito bundles and confirmation polling

pub mod errors;
pub mod fees;
pub mod jito;
pub mod jupiter;
pub mod pumpfun;
pub mod raydium;
pub mod router;
pub mod submitter;
pub mod tensor;
pub mod tx_builder;
pub mod wallet;

pub use errors::{ExecutionError, ExecutionResult};
pub use fees::{FeeMode, FeeStrategy, FeeTier};
pub use jito::{BundleSender, JitoClient};
pub use jupiter::{JupiterClient, SwapAggregator};
pub use raydium::{MigrationIndex, RaydiumClient};
pub use router::{CurveOrder, Route, RouteResolver};
pub use submitter::TransactionSubmitter;
pub use tensor::{AssetProof, NftMarketplace, TensorClient};
pub use tx_builder::{SignedTransaction, TxFormat, UnsignedTransaction};
pub use wallet::{
    Capabilities, Capability, CustodyBackend, KeypairBackend, ProviderTag, SigningProvider,
    WalletHandle, WalletSession,
};

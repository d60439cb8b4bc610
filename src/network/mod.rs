//! Network module
//!
//! Provides the cluster RPC surface used by every pipeline stage.

pub mod rpc_client;

pub use rpc_client::{ChainRpc, RpcManager, SignatureState};

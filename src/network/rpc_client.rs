//! Solana RPC access
//!
//! `ChainRpc` is the narrow read/submit surface the pipeline needs. The
//! `RpcManager` implementation wraps one nonblocking client and holds no
//! mutable state, so a single instance is shared by concurrent invocations.

use anyhow::{Context, Result};
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::RpcConfig;

/// Status of a submitted signature as seen by the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureState {
    /// Not yet visible at the configured commitment
    Pending,
    Confirmed,
    /// Landed with an on-chain error
    Failed(String),
}

/// Read and submit operations against a Solana cluster
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn get_balance(&self, address: &Pubkey) -> Result<u64>;

    async fn latest_blockhash(&self) -> Result<Hash>;

    async fn account_exists(&self, address: &Pubkey) -> Result<bool>;

    /// Raw account data, `None` when the account does not exist
    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>>;

    /// Raw token amount held by a token account, zero when it does not exist
    async fn token_balance(&self, token_account: &Pubkey) -> Result<u64>;

    async fn mint_decimals(&self, mint: &Pubkey) -> Result<u8>;

    /// Submits a fully signed transaction once, without client-side retries
    async fn send_transaction(&self, transaction: &VersionedTransaction) -> Result<Signature>;

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureState>;
}

/// RPC manager over a single endpoint
pub struct RpcManager {
    client: Arc<RpcClient>,
}

impl RpcManager {
    pub fn new(config: &RpcConfig) -> Result<Self> {
        url::Url::parse(&config.primary_url)
            .with_context(|| format!("Invalid RPC url: {}", config.primary_url))?;

        let client = Arc::new(RpcClient::new_with_timeout_and_commitment(
            config.primary_url.clone(),
            Duration::from_millis(config.request_timeout_ms),
            CommitmentConfig::confirmed(),
        ));

        info!("RPC Manager initialized for {}", config.primary_url);
        Ok(Self { client })
    }

    pub fn client(&self) -> Arc<RpcClient> {
        self.client.clone()
    }
}

#[async_trait]
impl ChainRpc for RpcManager {
    async fn get_balance(&self, address: &Pubkey) -> Result<u64> {
        self.client
            .get_balance(address)
            .await
            .context("Failed to get balance")
    }

    async fn latest_blockhash(&self) -> Result<Hash> {
        let start = Instant::now();
        let blockhash = self
            .client
            .get_latest_blockhash()
            .await
            .context("Failed to get recent blockhash")?;

        debug!("Blockhash fetch took {:?}", start.elapsed());
        Ok(blockhash)
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool> {
        Ok(self.account_data(address).await?.is_some())
    }

    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        let response = self
            .client
            .get_account_with_commitment(address, self.client.commitment())
            .await
            .with_context(|| format!("Failed to get account {}", address))?;

        Ok(response.value.map(|account| account.data))
    }

    async fn token_balance(&self, token_account: &Pubkey) -> Result<u64> {
        if !self.account_exists(token_account).await? {
            return Ok(0);
        }
        let balance = self
            .client
            .get_token_account_balance(token_account)
            .await
            .with_context(|| format!("Failed to get token balance for {}", token_account))?;

        balance
            .amount
            .parse::<u64>()
            .with_context(|| format!("Malformed token amount: {}", balance.amount))
    }

    async fn mint_decimals(&self, mint: &Pubkey) -> Result<u8> {
        let supply = self
            .client
            .get_token_supply(mint)
            .await
            .with_context(|| format!("Failed to get token supply for {}", mint))?;

        Ok(supply.decimals)
    }

    async fn send_transaction(&self, transaction: &VersionedTransaction) -> Result<Signature> {
        let start = Instant::now();
        let config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(self.client.commitment().commitment),
            max_retries: Some(0),
            ..Default::default()
        };

        let signature = self
            .client
            .send_transaction_with_config(transaction, config)
            .await
            .context("Failed to send transaction")?;

        debug!("Transaction {} sent in {:?}", signature, start.elapsed());
        Ok(signature)
    }

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureState> {
        let status = self
            .client
            .get_signature_status(signature)
            .await
            .with_context(|| format!("Failed to get status for {}", signature))?;

        Ok(match status {
            None => SignatureState::Pending,
            Some(Ok(())) => SignatureState::Confirmed,
            Some(Err(e)) => SignatureState::Failed(e.to_string()),
        })
    }
}

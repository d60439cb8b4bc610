//! Jito Client
//!
//! Private bundle submission to a block engine:
//! - fixed pool of tip accounts
//! - `sendBundle` JSON-RPC with base64 encoded transactions

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::Client;
use serde::Deserialize;
use solana_sdk::{pubkey, pubkey::Pubkey};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ExecutionConfig;

/// Block engines reject bundles larger than this
pub const MAX_BUNDLE_SIZE: usize = 5;

/// Jito tip accounts
pub const JITO_TIP_ACCOUNTS: [Pubkey; 8] = [
    pubkey!("96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5"),
    pubkey!("HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe"),
    pubkey!("Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY"),
    pubkey!("ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49"),
    pubkey!("DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh"),
    pubkey!("ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt"),
    pubkey!("DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL"),
    pubkey!("3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT"),
];

/// Picks a tip account uniformly from the pool
pub fn random_tip_account(pool: &[Pubkey]) -> Option<Pubkey> {
    pool.choose(&mut rand::thread_rng()).copied()
}

/// Bundle submission response
#[derive(Debug, Clone, Deserialize)]
pub struct BundleResponse {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<JitoError>,
}

/// Jito error
#[derive(Debug, Clone, Deserialize)]
pub struct JitoError {
    pub code: i64,
    pub message: String,
}

/// Private submission path accepting signed bundles
#[async_trait]
pub trait BundleSender: Send + Sync {
    /// Sends base64 encoded signed transactions, returns the bundle id
    async fn send_bundle(&self, encoded_transactions: Vec<String>) -> Result<String>;
}

/// Jito client for bundle submission
pub struct JitoClient {
    client: Client,
    block_engine_url: String,
}

impl JitoClient {
    pub fn new(config: &ExecutionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            block_engine_url: config.jito_block_engine_url.trim_end_matches('/').to_string(),
        })
    }

    fn bundles_url(&self) -> String {
        format!("{}/api/v1/bundles", self.block_engine_url)
    }
}

#[async_trait]
impl BundleSender for JitoClient {
    async fn send_bundle(&self, encoded_transactions: Vec<String>) -> Result<String> {
        anyhow::ensure!(!encoded_transactions.is_empty(), "Cannot submit empty bundle");
        anyhow::ensure!(
            encoded_transactions.len() <= MAX_BUNDLE_SIZE,
            "Bundle of {} transactions exceeds limit of {}",
            encoded_transactions.len(),
            MAX_BUNDLE_SIZE
        );

        let count = encoded_transactions.len();
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "sendBundle",
            "params": [encoded_transactions, { "encoding": "base64" }]
        });

        debug!("Submitting Jito bundle with {} transactions", count);

        let response = self
            .client
            .post(self.bundles_url())
            .json(&request)
            .send()
            .await
            .context("Failed to submit Jito bundle")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Jito bundle submission failed: {} - {}", status, body);
        }

        let bundle_response: BundleResponse = response
            .json()
            .await
            .context("Failed to parse Jito bundle response")?;

        let bundle_id = parse_bundle_response(bundle_response)?;
        info!("Jito bundle submitted: {}", bundle_id);
        Ok(bundle_id)
    }
}

fn parse_bundle_response(response: BundleResponse) -> Result<String> {
    if let Some(error) = response.error {
        anyhow::bail!("Jito bundle error: {} - {}", error.code, error.message);
    }
    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No bundle ID returned"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tip_accounts_distinct() {
        let mut keys = JITO_TIP_ACCOUNTS.to_vec();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 8);
    }

    #[test]
    fn test_random_tip_account_from_pool() {
        for _ in 0..32 {
            let tip = random_tip_account(&JITO_TIP_ACCOUNTS).unwrap();
            assert!(JITO_TIP_ACCOUNTS.contains(&tip));
        }
        assert_eq!(random_tip_account(&[]), None);
    }

    #[test]
    fn test_bundle_error_surfaces_verbatim() {
        let response: BundleResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"bundle contains an expired blockhash"}}"#,
        )
        .unwrap();
        let err = parse_bundle_response(response).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Jito bundle error: -32602 - bundle contains an expired blockhash"
        );
    }

    #[tokio::test]
    async fn test_oversized_bundle_rejected_locally() {
        let client = JitoClient::new(&ExecutionConfig::default()).unwrap();
        let err = client.send_bundle(vec!["AA==".to_string(); 6]).await.unwrap_err();
        assert!(err.to_string().contains("exceeds limit"));
    }
}

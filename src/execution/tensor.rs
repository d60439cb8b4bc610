//! Tensor Client
//!
//! NFT marketplace listing and compressed-asset proofs:
//! - `tx/list` returns an ordered list of server-composed transactions, each
//!   tagged legacy (`tx`) or versioned (`txV0`)
//! - DAS `getAssetProof` for Merkle-tree backed assets
//! - compressed listings composed by a backend from a fresh proof

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use solana_sdk::{hash::Hash, pubkey::Pubkey};
use std::time::Duration;
use tracing::{debug, info};

use super::tx_builder::TxFormat;
use crate::config::TensorConfig;

/// One server-composed transaction with its declared wire format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedTransaction {
    pub format: TxFormat,
    pub bytes: Vec<u8>,
}

/// Inclusion proof for a compressed asset at the current tree state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetProof {
    pub tree_id: String,
    pub root: String,
    pub leaf: String,
    pub node_index: u64,
    pub proof: Vec<String>,
}

/// Listing request for a marketplace
#[derive(Debug, Clone)]
pub struct ListingParams {
    pub seller: Pubkey,
    pub mint: Pubkey,
    pub price_lamports: u64,
    pub blockhash: Hash,
    pub expire_in_secs: Option<u64>,
}

#[async_trait]
pub trait NftMarketplace: Send + Sync {
    /// Ordered transactions listing a standard NFT
    async fn list_transactions(&self, params: &ListingParams) -> Result<Vec<EncodedTransaction>>;

    /// Fresh inclusion proof for a compressed asset
    async fn asset_proof(&self, asset_id: &Pubkey) -> Result<AssetProof>;

    /// Ordered transactions listing a compressed asset under `proof`
    async fn compressed_listing_transactions(
        &self,
        params: &ListingParams,
        proof: &AssetProof,
    ) -> Result<Vec<EncodedTransaction>>;
}

/// Transaction bytes as a Buffer JSON object or a base64 string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireBytes {
    Buffer { data: Vec<u8> },
    Base64 { data: String },
    Plain(String),
}

impl WireBytes {
    fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            WireBytes::Buffer { data } => Ok(data),
            WireBytes::Base64 { data } | WireBytes::Plain(data) => base64::engine::general_purpose::STANDARD
                .decode(data)
                .context("Transaction bytes are not base64"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ListedTx {
    #[serde(default)]
    tx: Option<WireBytes>,
    #[serde(default, rename = "txV0")]
    tx_v0: Option<WireBytes>,
}

#[derive(Debug, Clone, Deserialize)]
struct ListResponse {
    #[serde(default)]
    txs: Vec<ListedTx>,
}

/// Parses a list response, preferring the versioned form of each step
fn parse_list_response(body: &str) -> Result<Vec<EncodedTransaction>> {
    let response: ListResponse =
        serde_json::from_str(body).context("Marketplace returned a non-JSON response")?;
    anyhow::ensure!(!response.txs.is_empty(), "No transactions returned for listing");

    response
        .txs
        .into_iter()
        .enumerate()
        .map(|(i, listed)| match (listed.tx_v0, listed.tx) {
            (Some(v0), _) => Ok(EncodedTransaction { format: TxFormat::Versioned, bytes: v0.into_bytes()? }),
            (None, Some(legacy)) => Ok(EncodedTransaction { format: TxFormat::Legacy, bytes: legacy.into_bytes()? }),
            (None, None) => anyhow::bail!("Transaction #{} is in an unknown format", i + 1),
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ProofPath {
    Flat(Vec<String>),
    Nested(Vec<Vec<String>>),
}

#[derive(Debug, Clone, Deserialize)]
struct RawAssetProof {
    tree_id: String,
    root: String,
    leaf: String,
    node_index: u64,
    proof: ProofPath,
}

#[derive(Debug, Clone, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

fn parse_asset_proof(body: &str) -> Result<AssetProof> {
    let envelope: RpcEnvelope<RawAssetProof> =
        serde_json::from_str(body).context("Failed to parse asset proof response")?;
    if let Some(error) = envelope.error {
        anyhow::bail!("getAssetProof error {}: {}", error.code, error.message);
    }
    let raw = envelope
        .result
        .context("Asset proof response is missing proof data")?;

    let proof = match raw.proof {
        ProofPath::Flat(path) => path,
        ProofPath::Nested(paths) => paths.into_iter().next().unwrap_or_default(),
    };
    anyhow::ensure!(!proof.is_empty(), "Asset proof path is empty");

    Ok(AssetProof {
        tree_id: raw.tree_id,
        root: raw.root,
        leaf: raw.leaf,
        node_index: raw.node_index,
        proof,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompressedListingRequest<'a> {
    seller: String,
    asset_id: String,
    price_lamports: u64,
    blockhash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expire_in: Option<u64>,
    proof: &'a AssetProof,
}

/// Tensor client
pub struct TensorClient {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    das_url: String,
    compressed_listing_url: Option<String>,
}

impl TensorClient {
    pub fn new(config: &TensorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            das_url: config.das_url.clone(),
            compressed_listing_url: config.compressed_listing_url.clone(),
        })
    }

    async fn read_body(response: reqwest::Response, what: &str) -> Result<String> {
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read {} response", what))?;
        if !status.is_success() {
            anyhow::bail!("{} failed: {} - {}", what, status, body);
        }
        Ok(body)
    }
}

#[async_trait]
impl NftMarketplace for TensorClient {
    async fn list_transactions(&self, params: &ListingParams) -> Result<Vec<EncodedTransaction>> {
        let mut url = url::Url::parse(&format!("{}/tx/list", self.api_url)).context("Invalid Tensor API url")?;
        url.query_pairs_mut()
            .append_pair("seller", &params.seller.to_string())
            .append_pair("owner", &params.seller.to_string())
            .append_pair("mint", &params.mint.to_string())
            .append_pair("price", &params.price_lamports.to_string())
            .append_pair("blockhash", &params.blockhash.to_string());
        if let Some(expire_in) = params.expire_in_secs {
            url.query_pairs_mut().append_pair("expireIn", &expire_in.to_string());
        }

        debug!("Fetching Tensor listing transactions for {}", params.mint);

        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.header("x-tensor-api-key", key);
        }
        let response = request.send().await.context("Failed to call Tensor list endpoint")?;
        let body = Self::read_body(response, "Tensor listing").await?;

        let txs = parse_list_response(&body)?;
        info!("Tensor returned {} listing transactions for {}", txs.len(), params.mint);
        Ok(txs)
    }

    async fn asset_proof(&self, asset_id: &Pubkey) -> Result<AssetProof> {
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": "asset-proof",
            "method": "getAssetProof",
            "params": { "id": asset_id.to_string() }
        });

        let response = self
            .client
            .post(&self.das_url)
            .json(&request)
            .send()
            .await
            .context("Failed to fetch asset proof")?;
        let body = Self::read_body(response, "getAssetProof").await?;

        parse_asset_proof(&body)
    }

    async fn compressed_listing_transactions(
        &self,
        params: &ListingParams,
        proof: &AssetProof,
    ) -> Result<Vec<EncodedTransaction>> {
        let url = self
            .compressed_listing_url
            .as_deref()
            .context("No compressed listing backend configured")?;

        let request = CompressedListingRequest {
            seller: params.seller.to_string(),
            asset_id: params.mint.to_string(),
            price_lamports: params.price_lamports,
            blockhash: params.blockhash.to_string(),
            expire_in: params.expire_in_secs,
            proof,
        };

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .context("Failed to call compressed listing backend")?;
        let body = Self::read_body(response, "Compressed listing").await?;

        parse_list_response(&body)
    }
}

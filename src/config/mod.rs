//! Configuration module
//!
//! Handles loading and validation of the application configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub rpc: RpcConfig,
    pub wallet: WalletConfig,
    pub execution: ExecutionConfig,
    pub telemetry: TelemetryConfig,
    pub protocols: ProtocolsConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_yaml(&content)?;
        info!("Configuration loaded from {:?}", path);
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.execution.validate()?;
        anyhow::ensure!(
            self.protocols.pumpfun.slippage_bps <= 10_000,
            "pumpfun.slippage_bps must be at most 10000"
        );
        Ok(())
    }

    /// Create a default config for testing
    #[cfg(test)]
    pub fn default_for_test() -> Self {
        Self {
            rpc: RpcConfig {
                primary_url: "https://api.mainnet-beta.solana.com".to_string(),
                request_timeout_ms: 10000,
            },
            wallet: WalletConfig {
                keypair_path: "./wallet.json".to_string(),
                keypair_env: None,
                external_app_address: None,
            },
            execution: ExecutionConfig::default(),
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
                json_logs: false,
                log_file: None,
                metrics_port: 9090,
                enable_metrics: false,
            },
            protocols: ProtocolsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_url")]
    pub primary_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

#[cfg(not(feature = "devnet"))]
fn default_rpc_url() -> String { "https://api.mainnet-beta.solana.com".to_string() }
#[cfg(feature = "devnet")]
fn default_rpc_url() -> String { "https://api.devnet.solana.com".to_string() }
fn default_request_timeout() -> u64 { 10000 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    pub keypair_path: String,
    /// Env var holding a JSON or base58 secret key, checked before the file
    #[serde(default)]
    pub keypair_env: Option<String>,
    /// Address of a wallet that signs through an external app handoff
    #[serde(default)]
    pub external_app_address: Option<String>,
}

/// One selectable priority level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeTierConfig {
    pub label: String,
    pub lamports: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Ordered fee tiers offered to the user
    #[serde(default = "default_fee_tiers")]
    pub fee_tiers: Vec<FeeTierConfig>,
    #[serde(default = "default_fee_tier")]
    pub default_fee_tier: String,
    /// Fee reserve added to the amount when checking balance sufficiency
    #[serde(default = "default_fee_estimate")]
    pub fee_estimate_lamports: u64,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u16,
    #[serde(default = "default_compute_unit_limit")]
    pub compute_unit_limit: u32,
    #[serde(default = "default_signing_timeout")]
    pub signing_timeout_secs: u64,
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub confirmation_poll_ms: u64,
    #[serde(default = "default_quote_ttl")]
    pub quote_ttl_secs: u64,
    #[serde(default = "default_jito_url")]
    pub jito_block_engine_url: String,
    #[serde(default)]
    pub compressed_listing_enabled: bool,
}

impl ExecutionConfig {
    fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.fee_tiers.is_empty(), "fee_tiers must not be empty");
        anyhow::ensure!(
            self.fee_tiers.iter().any(|t| t.label == self.default_fee_tier),
            "default_fee_tier {:?} is not one of the configured fee_tiers",
            self.default_fee_tier
        );
        anyhow::ensure!(
            self.slippage_bps > 0 && self.slippage_bps <= 5_000,
            "slippage_bps must be between 1 and 5000"
        );
        anyhow::ensure!(
            self.compute_unit_limit > 0 && self.compute_unit_limit <= 1_400_000,
            "compute_unit_limit must be between 1 and 1400000"
        );
        anyhow::ensure!(self.signing_timeout_secs > 0, "signing_timeout_secs must be positive");
        anyhow::ensure!(
            self.confirmation_timeout_secs > 0,
            "confirmation_timeout_secs must be positive"
        );
        Ok(())
    }

    pub fn signing_timeout(&self) -> Duration {
        Duration::from_secs(self.signing_timeout_secs)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn confirmation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_ms)
    }

    pub fn quote_ttl(&self) -> Duration {
        Duration::from_secs(self.quote_ttl_secs)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            fee_tiers: default_fee_tiers(),
            default_fee_tier: default_fee_tier(),
            fee_estimate_lamports: default_fee_estimate(),
            slippage_bps: default_slippage_bps(),
            compute_unit_limit: default_compute_unit_limit(),
            signing_timeout_secs: default_signing_timeout(),
            confirmation_timeout_secs: default_confirmation_timeout(),
            confirmation_poll_ms: default_poll_interval(),
            quote_ttl_secs: default_quote_ttl(),
            jito_block_engine_url: default_jito_url(),
            compressed_listing_enabled: false,
        }
    }
}

fn default_fee_tiers() -> Vec<FeeTierConfig> {
    [("low", 1_000), ("medium", 10_000), ("high", 100_000), ("very-high", 1_000_000)]
        .into_iter()
        .map(|(label, lamports)| FeeTierConfig { label: label.to_string(), lamports })
        .collect()
}
fn default_fee_tier() -> String { "medium".to_string() }
fn default_fee_estimate() -> u64 { 500_000 }
fn default_slippage_bps() -> u16 { 50 }
fn default_compute_unit_limit() -> u32 { 200_000 }
fn default_signing_timeout() -> u64 { 120 }
fn default_confirmation_timeout() -> u64 { 60 }
fn default_poll_interval() -> u64 { 500 }
fn default_quote_ttl() -> u64 { 30 }

fn default_jito_url() -> String {
    "https://mainnet.block-engine.jito.wtf".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    pub log_file: Option<String>,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default)]
    pub enable_metrics: bool,
}

fn default_metrics_port() -> u16 { 9090 }

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtocolsConfig {
    #[serde(default)]
    pub jupiter: JupiterConfig,
    #[serde(default)]
    pub raydium: RaydiumConfig,
    #[serde(default)]
    pub pumpfun: PumpFunConfig,
    #[serde(default)]
    pub tensor: TensorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JupiterConfig {
    pub quote_url: String,
    /// Swap composition endpoint; a trusted backend proxy or Jupiter itself
    pub swap_url: String,
}

impl Default for JupiterConfig {
    fn default() -> Self {
        Self {
            quote_url: "https://api.jup.ag/swap/v1/quote".to_string(),
            swap_url: "https://api.jup.ag/swap/v1/swap".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaydiumConfig {
    pub swap_api: String,
    pub v3_api: String,
}

impl Default for RaydiumConfig {
    fn default() -> Self {
        Self {
            swap_api: "https://transaction-v1.raydium.io".to_string(),
            v3_api: "https://api-v3.raydium.io".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PumpFunConfig {
    #[serde(default = "default_curve_slippage")]
    pub slippage_bps: u16,
}

fn default_curve_slippage() -> u16 { 500 }

impl Default for PumpFunConfig {
    fn default() -> Self {
        Self { slippage_bps: default_curve_slippage() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorConfig {
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// DAS endpoint serving `getAssetProof`
    pub das_url: String,
    /// Backend that composes compressed-asset listings from a proof
    #[serde(default)]
    pub compressed_listing_url: Option<String>,
}

impl Default for TensorConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.mainnet.tensordev.io/api/v1".to_string(),
            api_key: None,
            das_url: "https://mainnet.helius-rpc.com".to_string(),
            compressed_listing_url: None,
        }
    }
}

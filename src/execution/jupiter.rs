//! Jupiter Client
//!
//! Aggregated swap routing:
//! - quote fetching (exact-in)
//! - server-composed swap transactions, returned as opaque base64

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::JupiterConfig;
use crate::utils::types::{expiry_after, Asset, Quote, Venue};

/// Quote and swap composition against a routing venue
#[async_trait]
pub trait SwapAggregator: Send + Sync {
    /// Prices `amount` base units of `input` into `output`
    async fn quote(&self, input: &Asset, output: &Asset, amount: u64, slippage_bps: u16) -> Result<Quote>;

    /// Composes the swap for `payer`; returns a base64 transaction
    async fn build_swap_transaction(
        &self,
        quote: &Quote,
        payer: &Pubkey,
        compute_unit_price: Option<u64>,
    ) -> Result<String>;
}

/// Jupiter quote response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub input_mint: String,
    pub in_amount: String,
    pub output_mint: String,
    pub out_amount: String,
    pub other_amount_threshold: String,
    pub swap_mode: String,
    pub slippage_bps: u32,
    pub price_impact_pct: String,
    #[serde(default)]
    pub route_plan: Vec<RoutePlan>,
}

/// Route plan segment
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePlan {
    pub swap_info: SwapInfo,
    pub percent: u8,
}

/// Swap info
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInfo {
    pub amm_key: String,
    pub label: Option<String>,
}

/// Swap request for Jupiter API
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    pub quote_response: serde_json::Value,
    pub user_public_key: String,
    pub wrap_and_unwrap_sol: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compute_unit_price_micro_lamports: Option<u64>,
}

/// Swap response from Jupiter API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapResponse {
    pub swap_transaction: String,
    #[serde(default)]
    pub last_valid_block_height: Option<u64>,
}

/// Jupiter client for aggregated swaps
pub struct JupiterClient {
    client: Client,
    quote_url: String,
    swap_url: String,
    quote_ttl: Duration,
}

impl JupiterClient {
    pub fn new(config: &JupiterConfig, quote_ttl: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            quote_url: config.quote_url.clone(),
            swap_url: config.swap_url.clone(),
            quote_ttl,
        })
    }
}

/// Converts a raw quote body into a venue-neutral quote
pub fn quote_from_response(
    raw: serde_json::Value,
    input: &Asset,
    output: &Asset,
    quote_ttl: Duration,
) -> Result<Quote> {
    let parsed: QuoteResponse =
        serde_json::from_value(raw.clone()).context("Failed to parse Jupiter quote")?;

    anyhow::ensure!(
        parsed.input_mint == input.mint.to_string() && parsed.output_mint == output.mint.to_string(),
        "Jupiter quoted {} -> {}, requested {} -> {}",
        parsed.input_mint,
        parsed.output_mint,
        input.mint,
        output.mint
    );

    let in_amount = parsed.in_amount.parse::<u64>().context("Malformed inAmount")?;
    let out_amount = parsed.out_amount.parse::<u64>().context("Malformed outAmount")?;
    let min_out_amount = parsed
        .other_amount_threshold
        .parse::<u64>()
        .context("Malformed otherAmountThreshold")?;
    let price_impact_pct = parsed.price_impact_pct.parse::<f64>().unwrap_or_default();

    anyhow::ensure!(out_amount > 0, "Jupiter returned an empty route");

    Ok(Quote {
        input: input.clone(),
        output: output.clone(),
        in_amount,
        out_amount,
        min_out_amount,
        price_impact_pct,
        venue: Venue::Aggregator,
        route: raw,
        expires_at: expiry_after(quote_ttl),
    })
}

#[async_trait]
impl SwapAggregator for JupiterClient {
    async fn quote(&self, input: &Asset, output: &Asset, amount: u64, slippage_bps: u16) -> Result<Quote> {
        let url = format!(
            "{}?inputMint={}&outputMint={}&amount={}&slippageBps={}&swapMode=ExactIn",
            self.quote_url, input.mint, output.mint, amount, slippage_bps
        );

        debug!("Fetching Jupiter quote: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch Jupiter quote")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Jupiter quote failed: {} - {}", status, body);
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse Jupiter quote")?;
        let quote = quote_from_response(raw, input, output, self.quote_ttl)?;

        info!(
            "Jupiter quote: {} {} -> {} {}, price_impact: {}%",
            quote.in_amount, input.symbol, quote.out_amount, output.symbol, quote.price_impact_pct
        );

        Ok(quote)
    }

    async fn build_swap_transaction(
        &self,
        quote: &Quote,
        payer: &Pubkey,
        compute_unit_price: Option<u64>,
    ) -> Result<String> {
        anyhow::ensure!(quote.venue == Venue::Aggregator, "Quote was not issued by Jupiter");

        let request = SwapRequest {
            quote_response: quote.route.clone(),
            user_public_key: payer.to_string(),
            wrap_and_unwrap_sol: true,
            compute_unit_price_micro_lamports: compute_unit_price,
        };

        debug!("Fetching Jupiter swap transaction");

        let response = self
            .client
            .post(&self.swap_url)
            .json(&request)
            .send()
            .await
            .context("Failed to fetch Jupiter swap transaction")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Jupiter swap failed: {} - {}", status, body);
        }

        let swap_response: SwapResponse = response
            .json()
            .await
            .context("Failed to parse Jupiter swap response")?;

        Ok(swap_response.swap_transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::types::NATIVE_MINT;
    use solana_sdk::pubkey;

    const USDC: Pubkey = pubkey!("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v");

    fn quote_json() -> serde_json::Value {
        serde_json::json!({
            "inputMint": NATIVE_MINT.to_string(),
            "inAmount": "1000000000",
            "outputMint": USDC.to_string(),
            "outAmount": "20000000",
            "otherAmountThreshold": "19900000",
            "swapMode": "ExactIn",
            "slippageBps": 50,
            "priceImpactPct": "0.01",
            "routePlan": [{ "swapInfo": { "ammKey": "pool", "label": "Whirlpool" }, "percent": 100 }]
        })
    }

    #[test]
    fn test_quote_response_parse() {
        let usdc = Asset::new(USDC, 6, "USDC");
        let quote =
            quote_from_response(quote_json(), &Asset::native_sol(), &usdc, Duration::from_secs(30)).unwrap();

        assert_eq!(quote.in_amount, 1_000_000_000);
        assert_eq!(quote.min_out_amount, 19_900_000);
        assert_eq!(quote.venue, Venue::Aggregator);
        assert_eq!(quote.route["routePlan"][0]["percent"], 100);
        assert!(!quote.is_expired());
    }

    #[test]
    fn test_quote_for_wrong_pair_rejected() {
        let other = Asset::new(Pubkey::new_unique(), 6, "XYZ");
        assert!(quote_from_response(quote_json(), &Asset::native_sol(), &other, Duration::from_secs(30)).is_err());
    }

    #[test]
    fn test_swap_request_shape() {
        let request = SwapRequest {
            quote_response: quote_json(),
            user_public_key: "user".into(),
            wrap_and_unwrap_sol: true,
            compute_unit_price_micro_lamports: Some(50_000),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["computeUnitPriceMicroLamports"], 50_000);
        assert_eq!(json["wrapAndUnwrapSol"], true);
    }
}

//! Raydium Client
//!
//! General liquidity venue where bonding-curve tokens trade after migration:
//! - pool lookup by mint, used as the migration index
//! - trade API quote (`compute/swap-base-in`) and composed swap transaction

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;
use std::time::Duration;
use tracing::{debug, info};

use super::jupiter::SwapAggregator;
use crate::config::RaydiumConfig;
use crate::utils::types::{expiry_after, Asset, Quote, Venue};

const TX_VERSION: &str = "V0";

/// Answers whether a curve token has moved to general liquidity
#[async_trait]
pub trait MigrationIndex: Send + Sync {
    async fn is_migrated(&self, mint: &Pubkey) -> Result<bool>;
}

/// Envelope shared by Raydium API responses
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default)]
    pub msg: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    fn into_data(self, what: &str) -> Result<T> {
        if !self.success {
            anyhow::bail!(
                "Raydium {} failed: {}",
                what,
                self.msg.unwrap_or_else(|| "unknown error".to_string())
            );
        }
        self.data
            .ok_or_else(|| anyhow::anyhow!("Raydium {} returned no data", what))
    }
}

/// Page of pools from the v3 pool index
#[derive(Debug, Clone, Deserialize)]
pub struct PoolPage {
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

/// Trade API quote body, kept whole for the compose request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeSwap {
    pub input_mint: String,
    pub input_amount: String,
    pub output_mint: String,
    pub output_amount: String,
    pub other_amount_threshold: String,
    #[serde(default)]
    pub price_impact_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapTransactionRequest {
    pub compute_unit_price_micro_lamports: String,
    pub swap_response: serde_json::Value,
    pub tx_version: String,
    pub wallet: String,
    pub wrap_sol: bool,
    pub unwrap_sol: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_account: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComposedTransaction {
    pub transaction: String,
}

/// Raydium client
pub struct RaydiumClient {
    client: Client,
    swap_api: String,
    v3_api: String,
    quote_ttl: Duration,
}

impl RaydiumClient {
    pub fn new(config: &RaydiumConfig, quote_ttl: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            swap_api: config.swap_api.trim_end_matches('/').to_string(),
            v3_api: config.v3_api.trim_end_matches('/').to_string(),
            quote_ttl,
        })
    }

    async fn get_json(&self, url: &str, what: &str) -> Result<serde_json::Value> {
        debug!("Raydium {}: {}", what, url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch Raydium {}", what))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Raydium {} failed: {} - {}", what, status, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse Raydium {}", what))
    }
}

/// Converts a trade API quote envelope into a venue-neutral quote
pub fn quote_from_compute(
    raw: serde_json::Value,
    input: &Asset,
    output: &Asset,
    quote_ttl: Duration,
) -> Result<Quote> {
    let envelope: ApiResponse<serde_json::Value> =
        serde_json::from_value(raw).context("Failed to parse Raydium quote")?;
    let body = envelope.into_data("quote")?;
    let parsed: ComputeSwap =
        serde_json::from_value(body.clone()).context("Failed to parse Raydium quote")?;

    anyhow::ensure!(
        parsed.input_mint == input.mint.to_string() && parsed.output_mint == output.mint.to_string(),
        "Raydium quoted {} -> {}, requested {} -> {}",
        parsed.input_mint,
        parsed.output_mint,
        input.mint,
        output.mint
    );

    let out_amount = parsed.output_amount.parse::<u64>().context("Malformed outputAmount")?;
    anyhow::ensure!(out_amount > 0, "Raydium returned an empty route");

    Ok(Quote {
        input: input.clone(),
        output: output.clone(),
        in_amount: parsed.input_amount.parse().context("Malformed inputAmount")?,
        out_amount,
        min_out_amount: parsed
            .other_amount_threshold
            .parse()
            .context("Malformed otherAmountThreshold")?,
        price_impact_pct: parsed.price_impact_pct,
        venue: Venue::GeneralLiquidity,
        route: body,
        expires_at: expiry_after(quote_ttl),
    })
}

#[async_trait]
impl MigrationIndex for RaydiumClient {
    async fn is_migrated(&self, mint: &Pubkey) -> Result<bool> {
        let url = format!(
            "{}/pools/info/mint?mint1={}&poolType=all&poolSortField=default&sortType=desc&pageSize=1&page=1",
            self.v3_api, mint
        );
        let raw = self.get_json(&url, "pool lookup").await?;
        let page: ApiResponse<PoolPage> =
            serde_json::from_value(raw).context("Failed to parse Raydium pool lookup")?;
        let migrated = !page.into_data("pool lookup")?.data.is_empty();

        debug!("Token {} migrated: {}", mint, migrated);
        Ok(migrated)
    }
}

#[async_trait]
impl SwapAggregator for RaydiumClient {
    async fn quote(&self, input: &Asset, output: &Asset, amount: u64, slippage_bps: u16) -> Result<Quote> {
        let url = format!(
            "{}/compute/swap-base-in?inputMint={}&outputMint={}&amount={}&slippageBps={}&txVersion={}",
            self.swap_api, input.mint, output.mint, amount, slippage_bps, TX_VERSION
        );
        let raw = self.get_json(&url, "quote").await?;
        let quote = quote_from_compute(raw, input, output, self.quote_ttl)?;

        info!(
            "Raydium quote: {} {} -> {} {}",
            quote.in_amount, input.symbol, quote.out_amount, output.symbol
        );
        Ok(quote)
    }

    async fn build_swap_transaction(
        &self,
        quote: &Quote,
        payer: &Pubkey,
        compute_unit_price: Option<u64>,
    ) -> Result<String> {
        anyhow::ensure!(quote.venue == Venue::GeneralLiquidity, "Quote was not issued by Raydium");

        let input_account = (!quote.input.is_native())
            .then(|| get_associated_token_address(payer, &quote.input.mint).to_string());

        let request = SwapTransactionRequest {
            compute_unit_price_micro_lamports: compute_unit_price.unwrap_or_default().to_string(),
            swap_response: serde_json::json!({ "success": true, "data": quote.route }),
            tx_version: TX_VERSION.to_string(),
            wallet: payer.to_string(),
            wrap_sol: quote.input.is_native(),
            unwrap_sol: quote.output.is_native(),
            input_account,
        };

        let response = self
            .client
            .post(format!("{}/transaction/swap-base-in", self.swap_api))
            .json(&request)
            .send()
            .await
            .context("Failed to fetch Raydium swap transaction")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Raydium swap failed: {} - {}", status, body);
        }

        let envelope: ApiResponse<Vec<ComposedTransaction>> = response
            .json()
            .await
            .context("Failed to parse Raydium swap response")?;
        let mut transactions = envelope.into_data("swap")?;

        anyhow::ensure!(
            transactions.len() == 1,
            "Raydium composed {} transactions, expected one",
            transactions.len()
        );
        Ok(transactions.remove(0).transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_from_compute() {
        let token = Asset::new(Pubkey::new_unique(), 6, "CURVE");
        let raw = serde_json::json!({
            "id": "abc",
            "success": true,
            "version": "V1",
            "data": {
                "swapType": "BaseIn",
                "inputMint": token.mint.to_string(),
                "inputAmount": "5000000",
                "outputMint": Asset::native_sol().mint.to_string(),
                "outputAmount": "12000000",
                "otherAmountThreshold": "11940000",
                "slippageBps": 50,
                "priceImpactPct": 0.2,
                "routePlan": []
            }
        });

        let quote = quote_from_compute(raw, &token, &Asset::native_sol(), Duration::from_secs(30)).unwrap();
        assert_eq!(quote.venue, Venue::GeneralLiquidity);
        assert_eq!(quote.out_amount, 12_000_000);
        assert_eq!(quote.route["swapType"], "BaseIn");
    }

    #[test]
    fn test_unsuccessful_envelope_carries_message() {
        let raw = serde_json::json!({ "id": "x", "success": false, "msg": "ROUTE_NOT_FOUND" });
        let err = quote_from_compute(raw, &Asset::native_sol(), &Asset::native_sol(), Duration::from_secs(1))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("ROUTE_NOT_FOUND"));
    }

    #[test]
    fn test_pool_page_parse() {
        let page: ApiResponse<PoolPage> = serde_json::from_str(
            r#"{"id":"1","success":true,"data":{"count":0,"data":[],"hasNextPage":false}}"#,
        )
        .unwrap();
        assert!(page.into_data("pool lookup").unwrap().data.is_empty());
    }
}

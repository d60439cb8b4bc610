//! NFT listing, standard and compressed

use solana_sdk::pubkey::Pubkey;
use tracing::{debug, Instrument};

use super::{require_positive, CallContext, ExecutionReceipt, Invocation, Stage, TradeOrchestrator};
use crate::execution::errors::{diagnostic, ExecutionError, ExecutionResult};
use crate::execution::tensor::{EncodedTransaction, ListingParams};
use crate::execution::tx_builder::{
    compose, decode_with_format, ensure_associated_account, fetch_fresh_proof, UnsignedTransaction,
};
use crate::execution::{FeeMode, FeeStrategy};
use crate::utils::helpers::format_sol;

const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRequest {
    pub asset_id: Pubkey,
    /// Merkle-tree backed asset
    pub compressed: bool,
    pub price_lamports: u64,
    /// Listing lifetime; open-ended when `None`
    pub duration_days: Option<u64>,
}

impl ListingRequest {
    pub fn expire_in_secs(&self) -> Option<u64> {
        self.duration_days.map(|days| days.saturating_mul(SECONDS_PER_DAY))
    }
}

impl TradeOrchestrator {
    /// Lists an NFT. The marketplace may need several transactions; they
    /// are signed and confirmed one at a time, in order.
    pub async fn list_asset(
        &self,
        request: ListingRequest,
        ctx: &CallContext,
    ) -> ExecutionResult<ExecutionReceipt> {
        let mut inv = Invocation::new("list", ctx);
        let span = inv.span();
        let result = self
            .run_listing(&mut inv, &request)
            .instrument(span)
            .await;
        inv.finish(result)
    }

    async fn run_listing(
        &self,
        inv: &mut Invocation<'_>,
        request: &ListingRequest,
    ) -> ExecutionResult<ExecutionReceipt> {
        inv.advance(Stage::Validating, "checking wallet, asset and balance")?;
        let (wallet, provider) = self.connected_wallet()?;
        require_positive(request.price_lamports, "listing price")?;
        if request.compressed && !self.settings.compressed_listing_enabled {
            return Err(ExecutionError::UnsupportedAssetType(
                "compressed NFT listing is disabled".into(),
            ));
        }
        let strategy = self.fee_strategy(FeeMode::Priority, inv.ctx)?;
        let seller = wallet.address();
        self.ensure_sol_balance(&seller, self.fee_reserve(&strategy)).await?;

        inv.advance(
            Stage::Building,
            format!(
                "preparing {} listing of {} at {}",
                if request.compressed { "compressed" } else { "standard" },
                request.asset_id,
                format_sol(request.price_lamports)
            ),
        )?;

        let mut steps = Vec::new();
        if !request.compressed {
            if let Some(setup) = self.token_account_setup(&seller, &request.asset_id, &strategy).await? {
                steps.push(setup);
            }
        }

        let params = ListingParams {
            seller,
            mint: request.asset_id,
            price_lamports: request.price_lamports,
            blockhash: self.latest_blockhash().await?,
            expire_in_secs: request.expire_in_secs(),
        };

        let encoded = if request.compressed {
            let proof = fetch_fresh_proof(self.marketplace.as_ref(), &request.asset_id).await?;
            self.marketplace
                .compressed_listing_transactions(&params, &proof)
                .await
        } else {
            self.marketplace.list_transactions(&params).await
        }
        .map_err(|e| ExecutionError::BuildFailed(diagnostic(&e)))?;

        steps.extend(decode_steps(&encoded, &seller)?);
        debug!("Listing {} needs {} transaction(s)", request.asset_id, steps.len());

        self.sign_and_submit(inv, &provider, &strategy, steps).await
    }

    /// Transaction creating the seller's token account for `mint`, when it
    /// does not exist yet
    async fn token_account_setup(
        &self,
        seller: &Pubkey,
        mint: &Pubkey,
        strategy: &FeeStrategy,
    ) -> ExecutionResult<Option<UnsignedTransaction>> {
        let mut instructions = Vec::new();
        ensure_associated_account(self.rpc.as_ref(), &mut instructions, seller, mint, seller).await?;
        if instructions.is_empty() {
            return Ok(None);
        }

        let instructions = strategy.wrap_instructions(seller, instructions);
        let blockhash = self.latest_blockhash().await?;
        compose(&instructions, seller, blockhash, None).map(Some)
    }
}

/// Decodes each marketplace step along its tagged format and checks it is
/// paid for by the seller
fn decode_steps(encoded: &[EncodedTransaction], seller: &Pubkey) -> ExecutionResult<Vec<UnsignedTransaction>> {
    encoded
        .iter()
        .enumerate()
        .map(|(index, step)| {
            let transaction = decode_with_format(&step.bytes, step.format)?;
            if transaction.fee_payer() != *seller {
                return Err(ExecutionError::BuildFailed(format!(
                    "listing step {} pays fees from {}, expected {}",
                    index + 1,
                    transaction.fee_payer(),
                    seller
                )));
            }
            Ok(transaction)
        })
        .collect()
}

//! Execution Orchestrator
//!
//! Single entry point for every user action. Each call:
//! - resolves the wallet once and validates before touching any venue
//! - walks the stage machine forward, reporting progress best effort
//! - signs, submits and confirms ordered steps one at a time
//!
//! Calls share no mutable state; the orchestrator can be used from any
//! number of tasks at once.

mod curve;
mod listing;
pub mod progress;
pub mod state_machine;
mod swap;

pub use curve::TokenLaunch;
pub use listing::ListingRequest;
pub use progress::{CallContext, ProgressCallback, ProgressEvent};
pub use state_machine::{Stage, StageMachine};
pub use swap::TradeTarget;

use rust_decimal::Decimal;
use solana_sdk::{hash::Hash, instruction::Instruction, pubkey::Pubkey, signature::Signature};
use spl_associated_token_account::get_associated_token_address;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Span};

use crate::config::{AppConfig, ExecutionConfig};
use crate::execution::errors::{diagnostic, ExecutionError, ExecutionResult};
use crate::execution::jito::{JITO_TIP_ACCOUNTS, MAX_BUNDLE_SIZE};
use crate::execution::tx_builder::{compose, decode_opaque, EphemeralSigner, UnsignedTransaction};
use crate::execution::{
    BundleSender, Capability, FeeMode, FeeStrategy, FeeTier, JitoClient, JupiterClient,
    MigrationIndex, NftMarketplace, RaydiumClient, RouteResolver, SigningProvider,
    SwapAggregator, TensorClient, TransactionSubmitter, WalletHandle, WalletSession,
};
use crate::network::ChainRpc;
use crate::telemetry::{
    record_execution_latency, record_stage_latency, record_trade_cancelled, record_trade_failure,
    record_trade_started, record_trade_success,
};
use crate::utils::helpers::generate_id;
use crate::utils::types::{Asset, Quote, MAX_DECIMALS};

/// Whether the submitted transactions are known to have landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalityStatus {
    Confirmed,
    /// Submitted, but confirmation did not arrive in time
    Unknown,
}

/// Outcome of a submitted action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReceipt {
    /// One signature per submitted transaction, in submission order
    pub signatures: Vec<Signature>,
    pub status: FinalityStatus,
    pub bundle_id: Option<String>,
}

impl ExecutionReceipt {
    pub fn is_confirmed(&self) -> bool {
        self.status == FinalityStatus::Confirmed
    }
}

impl AsRef<ExecutionReceipt> for ExecutionReceipt {
    fn as_ref(&self) -> &ExecutionReceipt {
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapReceipt {
    pub receipt: ExecutionReceipt,
    /// Input amount in display units
    pub realized_input: Decimal,
    /// Output amount in display units
    pub realized_output: Decimal,
}

impl AsRef<ExecutionReceipt> for SwapReceipt {
    fn as_ref(&self) -> &ExecutionReceipt {
        &self.receipt
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReceipt {
    pub receipt: ExecutionReceipt,
    pub mint: Pubkey,
}

impl AsRef<ExecutionReceipt> for LaunchReceipt {
    fn as_ref(&self) -> &ExecutionReceipt {
        &self.receipt
    }
}

/// Venue collaborators behind their traits
pub struct Venues {
    pub aggregator: Arc<dyn SwapAggregator>,
    pub general_liquidity: Arc<dyn SwapAggregator>,
    pub migrations: Arc<dyn MigrationIndex>,
    pub marketplace: Arc<dyn NftMarketplace>,
    pub bundles: Arc<dyn BundleSender>,
}

/// Bookkeeping for one orchestrator call
pub(crate) struct Invocation<'a> {
    id: String,
    operation: &'static str,
    ctx: &'a CallContext,
    stages: StageMachine,
    started: Instant,
}

impl<'a> Invocation<'a> {
    fn new(operation: &'static str, ctx: &'a CallContext) -> Self {
        record_trade_started(operation);
        Self {
            id: generate_id(),
            operation,
            ctx,
            stages: StageMachine::new(),
            started: Instant::now(),
        }
    }

    fn span(&self) -> Span {
        info_span!("invocation", id = %self.id, operation = self.operation)
    }

    /// Moves forward to `stage` and reports `message`. When the call is
    /// already at or past `stage` the message is reported where it is.
    /// Cancellation is honoured on every move up to and including Signing.
    pub(crate) fn advance(&mut self, stage: Stage, message: impl Into<String>) -> ExecutionResult<()> {
        if stage > self.stages.current() {
            if stage <= Stage::Signing && self.ctx.is_cancelled() {
                info!("Cancelled before {}", stage);
                return Err(ExecutionError::Cancelled);
            }
            let leaving = self.stages.current();
            let spent = self.stages.time_in_stage();
            if self.stages.transition_to(stage) && leaving != Stage::Idle {
                record_stage_latency(leaving.as_str(), spent.as_secs_f64() * 1000.0);
            }
        }
        self.report(message.into());
        Ok(())
    }

    fn report(&self, message: String) {
        self.ctx.report(&ProgressEvent {
            invocation_id: self.id.clone(),
            operation: self.operation,
            stage: self.stages.current(),
            message,
        });
    }

    fn finish<T: AsRef<ExecutionReceipt>>(mut self, result: ExecutionResult<T>) -> ExecutionResult<T> {
        let elapsed = self.started.elapsed();
        record_execution_latency(self.operation, elapsed.as_secs_f64() * 1000.0);

        match &result {
            Ok(value) => {
                let receipt = value.as_ref();
                let message = if receipt.is_confirmed() {
                    "confirmed"
                } else {
                    "submitted; finality unknown"
                };
                // the terminal move never fails the call
                let _ = self.advance(Stage::Completed, message);
                record_trade_success(self.operation, receipt.is_confirmed());
                info!(
                    "{} finished in {:?} with {} signature(s)",
                    self.operation,
                    elapsed,
                    receipt.signatures.len()
                );
            }
            Err(err) => {
                self.stages
                    .transition_to_with_reason(Stage::Failed, Some(err.to_string()));
                self.report(err.to_string());
                if err.is_cancellation() {
                    record_trade_cancelled(self.operation);
                } else {
                    record_trade_failure(self.operation, err.kind());
                }
                warn!("{} failed after {:?}: {}", self.operation, elapsed, err);
            }
        }
        result
    }
}

/// Trade orchestrator
pub struct TradeOrchestrator {
    rpc: Arc<dyn ChainRpc>,
    wallets: WalletSession,
    router: RouteResolver,
    marketplace: Arc<dyn NftMarketplace>,
    submitter: TransactionSubmitter,
    settings: ExecutionConfig,
    curve_slippage_bps: u16,
}

impl TradeOrchestrator {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        wallets: WalletSession,
        venues: Venues,
        settings: ExecutionConfig,
        curve_slippage_bps: u16,
    ) -> Self {
        let submitter = TransactionSubmitter::new(rpc.clone(), venues.bundles, &settings);
        let router = RouteResolver::new(venues.aggregator, venues.general_liquidity, venues.migrations);

        Self {
            rpc,
            wallets,
            router,
            marketplace: venues.marketplace,
            submitter,
            settings,
            curve_slippage_bps,
        }
    }

    /// Wires the production venue clients from configuration
    pub fn from_config(
        config: &AppConfig,
        rpc: Arc<dyn ChainRpc>,
        wallets: WalletSession,
    ) -> anyhow::Result<Self> {
        let ttl = config.execution.quote_ttl();
        let raydium = Arc::new(RaydiumClient::new(&config.protocols.raydium, ttl)?);
        let venues = Venues {
            aggregator: Arc::new(JupiterClient::new(&config.protocols.jupiter, ttl)?),
            general_liquidity: raydium.clone(),
            migrations: raydium,
            marketplace: Arc::new(TensorClient::new(&config.protocols.tensor)?),
            bundles: Arc::new(JitoClient::new(&config.execution)?),
        };

        Ok(Self::new(
            rpc,
            wallets,
            venues,
            config.execution.clone(),
            config.protocols.pumpfun.slippage_bps,
        ))
    }

    /// Resolves the fee strategy for `mode` at the call's tier, or the
    /// configured default tier
    pub fn fee_strategy(&self, mode: FeeMode, ctx: &CallContext) -> ExecutionResult<FeeStrategy> {
        let tiers: Vec<FeeTier> = self.settings.fee_tiers.iter().map(FeeTier::from).collect();
        let label = ctx
            .fee_tier
            .as_deref()
            .unwrap_or(&self.settings.default_fee_tier);
        FeeStrategy::resolve(
            mode,
            &tiers,
            label,
            self.settings.compute_unit_limit,
            &JITO_TIP_ACCOUNTS,
        )
    }

    /// Lamports reserved for fees on top of the traded amount
    fn fee_reserve(&self, strategy: &FeeStrategy) -> u64 {
        let tip = match strategy {
            FeeStrategy::JitoBundle { tip_lamports, .. } => *tip_lamports,
            FeeStrategy::StandardPriority { .. } => 0,
        };
        self.settings.fee_estimate_lamports.saturating_add(tip)
    }

    /// Wallet, then signing provider. External-app handles stop here.
    fn connected_wallet(&self) -> ExecutionResult<(WalletHandle, SigningProvider)> {
        let wallet = self.wallets.resolve()?;
        let provider = wallet.provider()?;
        Ok((wallet, provider))
    }

    async fn ensure_sol_balance(&self, owner: &Pubkey, required: u64) -> ExecutionResult<()> {
        let available = self
            .rpc
            .get_balance(owner)
            .await
            .map_err(|e| ExecutionError::BuildFailed(format!("balance check failed: {}", diagnostic(&e))))?;

        if available < required {
            return Err(ExecutionError::InsufficientBalance { required, available });
        }
        debug!("Balance {} covers {}", available, required);
        Ok(())
    }

    async fn ensure_token_balance(&self, owner: &Pubkey, mint: &Pubkey, required: u64) -> ExecutionResult<()> {
        let account = get_associated_token_address(owner, mint);
        let available = self
            .rpc
            .token_balance(&account)
            .await
            .map_err(|e| ExecutionError::BuildFailed(format!("balance check failed: {}", diagnostic(&e))))?;

        if available < required {
            return Err(ExecutionError::InsufficientBalance { required, available });
        }
        Ok(())
    }

    async fn latest_blockhash(&self) -> ExecutionResult<Hash> {
        self.rpc
            .latest_blockhash()
            .await
            .map_err(|e| ExecutionError::BuildFailed(diagnostic(&e)))
    }

    /// Has the venue that issued `quote` compose the swap, then decodes it
    async fn build_from_quote(
        &self,
        quote: &Quote,
        payer: &Pubkey,
        strategy: &FeeStrategy,
    ) -> ExecutionResult<Vec<UnsignedTransaction>> {
        if quote.is_expired() {
            return Err(ExecutionError::NoRouteFound(
                "quote expired before the transaction was built".into(),
            ));
        }

        let payload = self
            .router
            .composer_for(quote)
            .build_swap_transaction(quote, payer, strategy.compute_unit_price())
            .await
            .map_err(|e| ExecutionError::BuildFailed(diagnostic(&e)))?;

        let transaction = decode_opaque(&payload)?;
        if transaction.fee_payer() != *payer {
            return Err(ExecutionError::BuildFailed(format!(
                "composed transaction pays fees from {}, expected {}",
                transaction.fee_payer(),
                payer
            )));
        }
        self.with_bundle_tip(strategy, payer, vec![transaction])
    }

    /// Opaque payloads cannot take a tip instruction, so bundles of them get
    /// a separate tip transaction at the end
    fn with_bundle_tip(
        &self,
        strategy: &FeeStrategy,
        payer: &Pubkey,
        mut steps: Vec<UnsignedTransaction>,
    ) -> ExecutionResult<Vec<UnsignedTransaction>> {
        let Some(tip) = strategy.tip_instruction(payer) else {
            return Ok(steps);
        };
        let blockhash = steps
            .first()
            .map(|step| step.recent_blockhash())
            .ok_or_else(|| ExecutionError::BuildFailed("nothing to bundle".into()))?;

        steps.push(compose(&[tip], payer, blockhash, None)?);
        Ok(steps)
    }

    /// Wraps locally built instructions with the fee strategy, compiles them
    /// with a fresh blockhash and submits
    async fn submit_local(
        &self,
        inv: &mut Invocation<'_>,
        provider: &SigningProvider,
        strategy: &FeeStrategy,
        instructions: Vec<Instruction>,
        ephemeral: Option<EphemeralSigner>,
    ) -> ExecutionResult<ExecutionReceipt> {
        let payer = provider.address();
        let instructions = strategy.wrap_instructions(&payer, instructions);
        let blockhash = self.latest_blockhash().await?;
        let transaction = compose(&instructions, &payer, blockhash, ephemeral)?;
        self.sign_and_submit(inv, provider, strategy, vec![transaction]).await
    }

    /// Signs and submits `steps` according to the fee strategy
    async fn sign_and_submit(
        &self,
        inv: &mut Invocation<'_>,
        provider: &SigningProvider,
        strategy: &FeeStrategy,
        steps: Vec<UnsignedTransaction>,
    ) -> ExecutionResult<ExecutionReceipt> {
        if steps.is_empty() {
            return Err(ExecutionError::BuildFailed("no transactions to submit".into()));
        }
        match strategy {
            FeeStrategy::JitoBundle { .. } => self.submit_bundle(inv, provider, steps).await,
            FeeStrategy::StandardPriority { .. } => self.submit_in_sequence(inv, provider, steps).await,
        }
    }

    /// Each step is signed only after the previous one confirmed. A step
    /// that does not confirm in time ends the sequence with unknown finality.
    async fn submit_in_sequence(
        &self,
        inv: &mut Invocation<'_>,
        provider: &SigningProvider,
        steps: Vec<UnsignedTransaction>,
    ) -> ExecutionResult<ExecutionReceipt> {
        let total = steps.len();
        let mut signatures = Vec::with_capacity(total);

        for (index, step) in steps.into_iter().enumerate() {
            let label = format!("step {}/{}", index + 1, total);

            inv.advance(Stage::Signing, format!("awaiting wallet approval ({})", label))?;
            let signature = if provider.can(Capability::SignMessage) {
                let signed = provider.sign_transaction(step).await?;
                inv.advance(Stage::Submitting, format!("sending {}", label))?;
                self.submitter.send(&signed).await?
            } else {
                let signature = provider.sign_and_send(step, self.rpc.as_ref()).await?;
                inv.advance(Stage::Submitting, format!("wallet sent {}", label))?;
                signature
            };
            signatures.push(signature);

            inv.advance(Stage::Confirming, format!("confirming {} ({})", signature, label))?;
            match self.submitter.confirm(&signature).await {
                Ok(()) => {}
                Err(ExecutionError::ConfirmationTimeout { signature }) => {
                    warn!("{} not confirmed in time; stopping after {}", signature, label);
                    return Ok(ExecutionReceipt {
                        signatures,
                        status: FinalityStatus::Unknown,
                        bundle_id: None,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(ExecutionReceipt {
            signatures,
            status: FinalityStatus::Confirmed,
            bundle_id: None,
        })
    }

    /// Signs every transaction, then sends them as one atomic bundle
    async fn submit_bundle(
        &self,
        inv: &mut Invocation<'_>,
        provider: &SigningProvider,
        steps: Vec<UnsignedTransaction>,
    ) -> ExecutionResult<ExecutionReceipt> {
        if steps.len() > MAX_BUNDLE_SIZE {
            return Err(ExecutionError::BuildFailed(format!(
                "{} transactions exceed the bundle limit of {}",
                steps.len(),
                MAX_BUNDLE_SIZE
            )));
        }

        let total = steps.len();
        let mut signed = Vec::with_capacity(total);
        for (index, step) in steps.into_iter().enumerate() {
            inv.advance(
                Stage::Signing,
                format!("awaiting wallet approval ({}/{} bundled)", index + 1, total),
            )?;
            signed.push(provider.sign_transaction(step).await?);
        }

        inv.advance(Stage::Submitting, format!("sending bundle of {}", total))?;
        let bundle_id = self.submitter.send_bundle(&signed).await?;
        let signatures: Vec<Signature> = signed.iter().map(|tx| tx.signature()).collect();

        // bundles land all or nothing, so the first signature stands for all
        let lead = signatures
            .first()
            .copied()
            .ok_or_else(|| ExecutionError::BuildFailed("empty bundle".into()))?;
        inv.advance(Stage::Confirming, format!("confirming bundle {}", bundle_id))?;
        let status = match self.submitter.confirm(&lead).await {
            Ok(()) => FinalityStatus::Confirmed,
            Err(ExecutionError::ConfirmationTimeout { .. }) => FinalityStatus::Unknown,
            Err(e) => return Err(e),
        };

        Ok(ExecutionReceipt {
            signatures,
            status,
            bundle_id: Some(bundle_id),
        })
    }
}

pub(crate) fn require_positive(amount: u64, what: &str) -> ExecutionResult<()> {
    if amount == 0 {
        return Err(ExecutionError::InvalidAmount(format!("{} must be greater than zero", what)));
    }
    Ok(())
}

pub(crate) fn require_representable(asset: &Asset) -> ExecutionResult<()> {
    if !asset.is_representable() {
        return Err(ExecutionError::UnsupportedAssetType(format!(
            "{} uses {} decimals, at most {} are supported",
            asset, asset.decimals, MAX_DECIMALS
        )));
    }
    Ok(())
}

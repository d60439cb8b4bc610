//! Transfers and aggregated swaps

use solana_sdk::{pubkey::Pubkey, system_instruction};
use tracing::Instrument;

use super::{require_positive, require_representable, CallContext, ExecutionReceipt, Invocation, Stage, SwapReceipt, TradeOrchestrator};
use crate::execution::errors::ExecutionResult;
use crate::execution::{FeeMode, FeeStrategy};
use crate::utils::helpers::format_sol;
use crate::utils::types::Asset;

/// What `execute_trade` moves value to
#[derive(Debug, Clone)]
pub enum TradeTarget {
    /// Native transfer of `amount` lamports
    Transfer(Pubkey),
    /// Swap of `amount` input base units through the aggregated router
    Swap { input: Asset, output: Asset },
}

impl TradeOrchestrator {
    /// Transfer or swap under the fee mode's default tier (or the call's tier)
    pub async fn execute_trade(
        &self,
        mode: FeeMode,
        target: TradeTarget,
        amount: u64,
        ctx: &CallContext,
    ) -> ExecutionResult<ExecutionReceipt> {
        let operation = match &target {
            TradeTarget::Transfer(_) => "transfer",
            TradeTarget::Swap { .. } => "swap",
        };
        let mut inv = Invocation::new(operation, ctx);
        let span = inv.span();
        let result = self
            .run_trade(&mut inv, mode, &target, amount, ctx)
            .instrument(span)
            .await;
        inv.finish(result)
    }

    /// Swaps `amount` base units of `input` for `output`
    pub async fn execute_swap(
        &self,
        input: Asset,
        output: Asset,
        amount: u64,
        strategy: FeeStrategy,
        ctx: &CallContext,
    ) -> ExecutionResult<SwapReceipt> {
        let mut inv = Invocation::new("swap", ctx);
        let span = inv.span();
        let result = self
            .run_swap(&mut inv, &input, &output, amount, &strategy)
            .instrument(span)
            .await;
        inv.finish(result)
    }

    /// Resolves the fee tier as part of validation, then dispatches
    async fn run_trade(
        &self,
        inv: &mut Invocation<'_>,
        mode: FeeMode,
        target: &TradeTarget,
        amount: u64,
        ctx: &CallContext,
    ) -> ExecutionResult<ExecutionReceipt> {
        inv.advance(Stage::Validating, format!("resolving {:?} fee tier", mode))?;
        let strategy = self.fee_strategy(mode, ctx)?;
        match target {
            TradeTarget::Transfer(recipient) => self.run_transfer(inv, recipient, amount, &strategy).await,
            TradeTarget::Swap { input, output } => self
                .run_swap(inv, input, output, amount, &strategy)
                .await
                .map(|swap| swap.receipt),
        }
    }

    async fn run_transfer(
        &self,
        inv: &mut Invocation<'_>,
        recipient: &Pubkey,
        lamports: u64,
        strategy: &FeeStrategy,
    ) -> ExecutionResult<ExecutionReceipt> {
        inv.advance(Stage::Validating, "checking wallet and balance")?;
        let (wallet, provider) = self.connected_wallet()?;
        require_positive(lamports, "transfer amount")?;
        let payer = wallet.address();
        self.ensure_sol_balance(&payer, lamports.saturating_add(self.fee_reserve(strategy)))
            .await?;

        inv.advance(
            Stage::Building,
            format!("building transfer of {} to {} ({})", format_sol(lamports), recipient, strategy),
        )?;
        let transfer = system_instruction::transfer(&payer, recipient, lamports);
        self.submit_local(inv, &provider, strategy, vec![transfer], None).await
    }

    async fn run_swap(
        &self,
        inv: &mut Invocation<'_>,
        input: &Asset,
        output: &Asset,
        amount: u64,
        strategy: &FeeStrategy,
    ) -> ExecutionResult<SwapReceipt> {
        inv.advance(Stage::Validating, "checking wallet and balance")?;
        let (wallet, provider) = self.connected_wallet()?;
        require_positive(amount, "swap amount")?;
        require_representable(input)?;
        require_representable(output)?;
        let payer = wallet.address();
        let reserve = self.fee_reserve(strategy);
        if input.is_native() {
            self.ensure_sol_balance(&payer, amount.saturating_add(reserve)).await?;
        } else {
            self.ensure_sol_balance(&payer, reserve).await?;
            self.ensure_token_balance(&payer, &input.mint, amount).await?;
        }

        inv.advance(
            Stage::Quoting,
            format!(
                "quoting {} {} -> {}",
                input.from_base_units(amount),
                input.symbol,
                output.symbol
            ),
        )?;
        let quote = self
            .router
            .resolve_swap(input, output, amount, self.settings.slippage_bps)
            .await?;

        inv.advance(
            Stage::Building,
            format!("composing swap via {} ({})", quote.venue, strategy),
        )?;
        let steps = self.build_from_quote(&quote, &payer, strategy).await?;

        let receipt = self.sign_and_submit(inv, &provider, strategy, steps).await?;
        Ok(SwapReceipt {
            receipt,
            realized_input: quote.realized_input(),
            realized_output: quote.realized_output(),
        })
    }
}

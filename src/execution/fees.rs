//! Fee strategies
//!
//! A strategy is resolved once per operation from caller-supplied tiers and
//! applied to the instruction list before anything is signed.

use solana_sdk::{
    compute_budget::ComputeBudgetInstruction, instruction::Instruction, pubkey::Pubkey,
    system_instruction,
};
use std::fmt;

use super::errors::{ExecutionError, ExecutionResult};
use super::jito::random_tip_account;
use crate::config::FeeTierConfig;

/// How a trade should reach the leader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeMode {
    Priority,
    Jito,
}

impl std::str::FromStr for FeeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "priority" => Ok(FeeMode::Priority),
            "jito" => Ok(FeeMode::Jito),
            other => Err(format!("unknown fee mode {:?}, expected priority or jito", other)),
        }
    }
}

/// Labelled lamport amount selectable by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeTier {
    pub label: String,
    pub lamports: u64,
}

impl From<&FeeTierConfig> for FeeTier {
    fn from(config: &FeeTierConfig) -> Self {
        Self { label: config.label.clone(), lamports: config.lamports }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeeStrategy {
    /// Compute budget instructions priced from the tier's lamport total
    StandardPriority { tier: FeeTier, compute_unit_limit: u32 },
    /// Tip transfer to a block engine tip account
    JitoBundle { tip_lamports: u64, tip_account: Pubkey },
}

impl FeeStrategy {
    /// Looks up `label` among `tiers`. For bundles the tier amount becomes the
    /// tip and the tip account is drawn from `tip_pool`.
    pub fn resolve(
        mode: FeeMode,
        tiers: &[FeeTier],
        label: &str,
        compute_unit_limit: u32,
        tip_pool: &[Pubkey],
    ) -> ExecutionResult<Self> {
        let tier = tiers
            .iter()
            .find(|tier| tier.label == label)
            .ok_or_else(|| ExecutionError::BuildFailed(format!("unknown fee tier {:?}", label)))?;

        match mode {
            FeeMode::Priority => {
                if compute_unit_limit == 0 {
                    return Err(ExecutionError::BuildFailed("compute unit limit is zero".into()));
                }
                Ok(FeeStrategy::StandardPriority { tier: tier.clone(), compute_unit_limit })
            }
            FeeMode::Jito => {
                let tip_account = random_tip_account(tip_pool)
                    .ok_or_else(|| ExecutionError::BuildFailed("tip account pool is empty".into()))?;
                Ok(FeeStrategy::JitoBundle { tip_lamports: tier.lamports, tip_account })
            }
        }
    }

    pub fn mode(&self) -> FeeMode {
        match self {
            FeeStrategy::StandardPriority { .. } => FeeMode::Priority,
            FeeStrategy::JitoBundle { .. } => FeeMode::Jito,
        }
    }

    pub fn is_bundle(&self) -> bool {
        self.mode() == FeeMode::Jito
    }

    /// Price in micro-lamports per compute unit, spreading the tier's
    /// lamports over the compute unit limit
    pub fn compute_unit_price(&self) -> Option<u64> {
        match self {
            FeeStrategy::StandardPriority { tier, compute_unit_limit } => {
                let micro = tier.lamports as u128 * 1_000_000 / *compute_unit_limit as u128;
                Some(micro.min(u64::MAX as u128) as u64)
            }
            FeeStrategy::JitoBundle { .. } => None,
        }
    }

    pub fn tip_instruction(&self, payer: &Pubkey) -> Option<Instruction> {
        match self {
            FeeStrategy::JitoBundle { tip_lamports, tip_account } => {
                Some(system_instruction::transfer(payer, tip_account, *tip_lamports))
            }
            FeeStrategy::StandardPriority { .. } => None,
        }
    }

    /// Applies the strategy to a locally built instruction list: compute
    /// budget instructions go first, a tip transfer goes last
    pub fn wrap_instructions(&self, payer: &Pubkey, instructions: Vec<Instruction>) -> Vec<Instruction> {
        match self {
            FeeStrategy::StandardPriority { compute_unit_limit, .. } => {
                let price = self.compute_unit_price().unwrap_or_default();
                let mut wrapped = Vec::with_capacity(instructions.len() + 2);
                wrapped.push(ComputeBudgetInstruction::set_compute_unit_limit(*compute_unit_limit));
                wrapped.push(ComputeBudgetInstruction::set_compute_unit_price(price));
                wrapped.extend(instructions);
                wrapped
            }
            FeeStrategy::JitoBundle { .. } => {
                let mut wrapped = instructions;
                wrapped.extend(self.tip_instruction(payer));
                wrapped
            }
        }
    }
}

impl fmt::Display for FeeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeeStrategy::StandardPriority { tier, .. } => {
                write!(f, "priority:{} ({} lamports)", tier.label, tier.lamports)
            }
            FeeStrategy::JitoBundle { tip_lamports, tip_account } => {
                write!(f, "jito tip {} lamports to {}", tip_lamports, tip_account)
            }
        }
    }
}

//! Execution Stage Machine
//!
//! Tracks one invocation through the pipeline stages:
//! - Idle: created, nothing checked yet
//! - Validating: wallet, amount, balance and asset checks
//! - Quoting: venue selection and pricing
//! - Building: unsigned transaction assembly
//! - Signing: wallet approval
//! - Submitting: RPC send or bundle send
//! - Confirming: signature status polling
//! - Completed / Failed: terminal
//!
//! Stages only move forward. Skipping ahead is allowed (transfers and
//! listings have no Quoting stage); going back never is.

use std::time::Instant;
use tracing::{debug, warn};

/// Pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Idle,
    Validating,
    Quoting,
    Building,
    Signing,
    Submitting,
    Confirming,
    Completed,
    Failed,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Validating => "validating",
            Stage::Quoting => "quoting",
            Stage::Building => "building",
            Stage::Signing => "signing",
            Stage::Submitting => "submitting",
            Stage::Confirming => "confirming",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stage transition record
#[derive(Debug, Clone)]
pub struct StageTransition {
    pub from: Stage,
    pub to: Stage,
    pub timestamp: i64,
    pub reason: Option<String>,
}

/// Forward-only stage tracker for one invocation
#[derive(Debug)]
pub struct StageMachine {
    current: Stage,
    stage_entered_at: Instant,
    history: Vec<StageTransition>,
}

impl StageMachine {
    pub fn new() -> Self {
        Self {
            current: Stage::Idle,
            stage_entered_at: Instant::now(),
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> Stage {
        self.current
    }

    pub fn time_in_stage(&self) -> std::time::Duration {
        self.stage_entered_at.elapsed()
    }

    /// Any later stage is reachable until a terminal stage is entered.
    /// Failed is reachable from every non-terminal stage.
    pub fn can_transition_to(&self, target: Stage) -> bool {
        if self.current.is_terminal() {
            return false;
        }
        match target {
            Stage::Failed => true,
            Stage::Completed => self.current > Stage::Validating,
            _ => target > self.current,
        }
    }

    pub fn transition_to(&mut self, target: Stage) -> bool {
        self.transition_to_with_reason(target, None)
    }

    pub fn transition_to_with_reason(&mut self, target: Stage, reason: Option<String>) -> bool {
        if !self.can_transition_to(target) {
            warn!("Invalid stage transition: {} -> {}", self.current, target);
            return false;
        }

        debug!(
            "Stage: {} -> {}{}",
            self.current,
            target,
            reason.as_ref().map(|r| format!(" ({})", r)).unwrap_or_default()
        );

        self.history.push(StageTransition {
            from: self.current,
            to: target,
            timestamp: chrono::Utc::now().timestamp_millis(),
            reason,
        });
        self.current = target;
        self.stage_entered_at = Instant::now();
        true
    }

    pub fn history(&self) -> &[StageTransition] {
        &self.history
    }

    /// Stages visited, in order, starting from Idle
    pub fn path(&self) -> Vec<Stage> {
        std::iter::once(Stage::Idle)
            .chain(self.history.iter().map(|t| t.to))
            .collect()
    }
}

impl Default for StageMachine {
    fn default() -> Self {
        Self::new()
    }
}

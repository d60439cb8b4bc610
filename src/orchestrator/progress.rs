//! Progress reporting
//!
//! Callers may observe an invocation through a callback. Delivery is best
//! effort: a panicking callback is logged and ignored, and every event is
//! also emitted as a tracing event.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use super::state_machine::Stage;

/// One progress notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub invocation_id: String,
    pub operation: &'static str,
    pub stage: Stage,
    pub message: String,
}

pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Per-call options: progress observer, cancellation flag and fee tier
#[derive(Clone, Default)]
pub struct CallContext {
    pub progress: Option<ProgressCallback>,
    pub cancel: Option<Arc<AtomicBool>>,
    /// Fee tier label; the configured default when unset
    pub fee_tier: Option<String>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, callback: impl Fn(&ProgressEvent) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn with_fee_tier(mut self, label: impl Into<String>) -> Self {
        self.fee_tier = Some(label.into());
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::SeqCst))
    }

    /// Delivers `event` to the callback, if any. Never fails the caller.
    pub fn report(&self, event: &ProgressEvent) {
        info!(
            invocation = %event.invocation_id,
            stage = %event.stage,
            "{}: {}",
            event.operation,
            event.message
        );

        let Some(callback) = &self.progress else {
            return;
        };
        if panic::catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
            warn!("Progress callback panicked at stage {}; continuing", event.stage);
            crate::telemetry::record_callback_panic();
        }
    }
}

impl std::fmt::Debug for CallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("progress", &self.progress.is_some())
            .field("cancelled", &self.is_cancelled())
            .field("fee_tier", &self.fee_tier)
            .finish()
    }
}

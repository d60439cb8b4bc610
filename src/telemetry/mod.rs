//! Telemetry Module

mod logging;
mod metrics;

pub use logging::init_logging;
pub use metrics::{
    init_metrics, record_callback_panic, record_execution_latency, record_stage_latency,
    record_trade_cancelled, record_trade_failure, record_trade_started, record_trade_success,
};

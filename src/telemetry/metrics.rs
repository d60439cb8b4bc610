//! Prometheus metrics export

use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

pub fn init_metrics(port: u16) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    register_metrics();
    info!("Prometheus metrics server started on {}", addr);
    Ok(())
}

fn register_metrics() {
    // Outcome metrics
    describe_counter!("sol_trade_trades_total", "Total number of pipeline invocations");
    describe_counter!("sol_trade_trades_success", "Invocations that reached a receipt");
    describe_counter!("sol_trade_trades_failed", "Invocations that ended in an error");
    describe_counter!("sol_trade_trades_cancelled", "Invocations cancelled or rejected by the user");
    describe_counter!("sol_trade_finality_unknown", "Receipts returned before confirmation");

    // Latency metrics
    describe_histogram!("sol_trade_stage_latency_ms", "Time spent in each pipeline stage");
    describe_histogram!("sol_trade_execution_latency_ms", "End-to-end invocation latency");

    describe_counter!("sol_trade_callback_panics", "Progress callbacks that panicked");
}

pub fn record_trade_started(operation: &'static str) {
    counter!("sol_trade_trades_total", "operation" => operation).increment(1);
}

pub fn record_trade_success(operation: &'static str, confirmed: bool) {
    counter!("sol_trade_trades_success", "operation" => operation).increment(1);
    if !confirmed {
        counter!("sol_trade_finality_unknown", "operation" => operation).increment(1);
    }
}

pub fn record_trade_failure(operation: &'static str, kind: &'static str) {
    counter!("sol_trade_trades_failed", "operation" => operation, "kind" => kind).increment(1);
}

pub fn record_trade_cancelled(operation: &'static str) {
    counter!("sol_trade_trades_cancelled", "operation" => operation).increment(1);
}

pub fn record_stage_latency(stage: &'static str, latency_ms: f64) {
    histogram!("sol_trade_stage_latency_ms", "stage" => stage).record(latency_ms);
}

pub fn record_execution_latency(operation: &'static str, latency_ms: f64) {
    histogram!("sol_trade_execution_latency_ms", "operation" => operation).record(latency_ms);
}

pub fn record_callback_panic() {
    counter!("sol_trade_callback_panics").increment(1);
}

//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_store_queries_total` (counter): store calls by operation and outcome
//! - `gateway_store_query_duration_seconds` (histogram): store call latency
//! - `gateway_refresh_checks_total` (counter): staleness checks by trigger and outcome
//! - `gateway_handle_constructions_total` (counter): handles built
//! - `gateway_bind_failures_total` (counter): handles that failed to bind
//! - `gateway_stale_retries_total` (counter): stale-triggered retries by outcome
//! - `gateway_active_config_id` (gauge): identifier of the current handle
//! - `gateway_live_handles` (gauge): handles not yet released
//! - `gateway_requests_total` (counter): HTTP requests by route and status
//! - `gateway_request_duration_seconds` (histogram): HTTP latency by route
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so tests need no setup
//! - Request labels use the matched route template, not the raw path

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_store_query(operation: &'static str, outcome: &'static str, start: Instant) {
    counter!("gateway_store_queries_total", "operation" => operation, "outcome" => outcome).increment(1);
    histogram!("gateway_store_query_duration_seconds", "operation" => operation)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_refresh_check(trigger: &'static str, outcome: &'static str) {
    counter!("gateway_refresh_checks_total", "trigger" => trigger, "outcome" => outcome).increment(1);
}

pub fn record_handle_constructed(config_id: u64) {
    counter!("gateway_handle_constructions_total").increment(1);
    tracing::trace!(config_id, "handle construction recorded");
}

pub fn record_bind_failure() {
    counter!("gateway_bind_failures_total").increment(1);
}

pub fn record_stale_retry(outcome: &'static str) {
    counter!("gateway_stale_retries_total", "outcome" => outcome).increment(1);
}

pub fn set_active_config(config_id: u64) {
    gauge!("gateway_active_config_id").set(config_id as f64);
}

pub fn handle_bound() {
    gauge!("gateway_live_handles").increment(1.0);
}

pub fn handle_released() {
    gauge!("gateway_live_handles").decrement(1.0);
}

pub fn record_request(route: String, status: u16, start: Instant) {
    histogram!("gateway_request_duration_seconds", "route" => route.clone()).record(start.elapsed().as_secs_f64());
    counter!("gateway_requests_total", "route" => route, "status" => status.to_string()).increment(1);
}

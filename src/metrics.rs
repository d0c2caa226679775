/// Metrics and telemetry for the verification log client
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - Event log appends and pending backlog
/// - Sync delivery outcomes
/// - DID cache hit/miss rates and evictions
/// - Revocation refreshes
/// - Connectivity state

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // ========== Event Log Metrics ==========

    /// Total verification records appended
    pub static ref LOGS_APPENDED_TOTAL: IntCounter = register_int_counter!(
        "veriflog_logs_appended_total",
        "Total number of verification records appended to the local log"
    )
    .unwrap();

    /// Records not yet accepted by the remote authority
    pub static ref PENDING_LOGS: IntGauge = register_int_gauge!(
        "veriflog_pending_logs",
        "Number of verification records awaiting sync"
    )
    .unwrap();

    // ========== Sync Metrics ==========

    /// Delivery attempts by outcome (accepted, rejected, unreachable)
    pub static ref SYNC_DELIVERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "veriflog_sync_deliveries_total",
        "Total number of log delivery attempts",
        &["outcome"]
    )
    .unwrap();

    // ========== DID Cache Metrics ==========

    /// DID cache lookups by result (hit, miss, error)
    pub static ref DID_CACHE_LOOKUPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "veriflog_did_cache_lookups_total",
        "Total number of DID cache lookups",
        &["result"]
    )
    .unwrap();

    /// Entries evicted by the capacity policy
    pub static ref DID_CACHE_EVICTIONS_TOTAL: IntCounter = register_int_counter!(
        "veriflog_did_cache_evictions_total",
        "Total number of DID cache evictions"
    )
    .unwrap();

    // ========== Revocation Metrics ==========

    /// Revocation refreshes by outcome
    pub static ref REVOCATION_REFRESH_TOTAL: IntCounterVec = register_int_counter_vec!(
        "veriflog_revocation_refresh_total",
        "Total number of revocation list refreshes",
        &["outcome"]
    )
    .unwrap();

    // ========== Connectivity ==========

    /// 1 when the remote authority is believed reachable
    pub static ref ONLINE: IntGauge = register_int_gauge!(
        "veriflog_online",
        "Whether the client currently considers itself online"
    )
    .unwrap();
}

/// Record a delivery attempt outcome
pub fn record_delivery(outcome: &str) {
    SYNC_DELIVERIES_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a DID cache lookup result
pub fn record_cache_lookup(result: &str) {
    DID_CACHE_LOOKUPS_TOTAL.with_label_values(&[result]).inc();
}

/// Record a revocation refresh outcome
pub fn record_revocation_refresh(outcome: &str) {
    REVOCATION_REFRESH_TOTAL.with_label_values(&[outcome]).inc();
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

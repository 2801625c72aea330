//! Metrics definitions for the session relay.
//!
//! All metrics follow Prometheus naming conventions:
//! - `relay_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `event`: bounded by the wire event enums (~20 values)
//! - `result`: granted, denied
//! - `command`: mute-target, remove-target, end-session

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded. Event handling is an
/// in-memory operation, so the latency buckets start well below a
/// millisecond.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("relay_event_latency".to_string()),
            &[
                0.000_05, 0.000_1, 0.000_25, 0.000_5, 0.001, 0.002_5, 0.005, 0.010, 0.025, 0.050,
                0.100,
            ],
        )
        .map_err(|e| format!("Failed to set event latency buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Connection & Session Metrics (Gauges)
// ============================================================================

/// Set the number of registered connections.
///
/// Metric: `relay_connections_active`
pub fn set_connections_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("relay_connections_active").set(count as f64);
}

/// Set the number of live sessions.
///
/// Metric: `relay_sessions_active`
pub fn set_sessions_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("relay_sessions_active").set(count as f64);
}

// ============================================================================
// Event Metrics
// ============================================================================

/// Record an inbound event handled by the coordinator.
///
/// Metrics: `relay_events_total`, `relay_event_latency_seconds`
/// Labels: `event`
pub fn record_event(event: &'static str, duration: Duration) {
    counter!("relay_events_total", "event" => event).increment(1);
    histogram!("relay_event_latency_seconds", "event" => event).record(duration.as_secs_f64());
}

/// Record outbound events discarded because a mailbox was full or closed.
///
/// Metric: `relay_deliveries_dropped_total`
///
/// Non-zero values mean some clients are reading slower than they receive.
pub fn record_deliveries_dropped(count: usize) {
    if count > 0 {
        counter!("relay_deliveries_dropped_total").increment(count as u64);
    }
}

/// Record an authority claim outcome.
///
/// Metric: `relay_authority_claims_total`
/// Labels: `result` (granted, denied)
pub fn record_authority_claim(granted: bool) {
    let result = if granted { "granted" } else { "denied" };
    counter!("relay_authority_claims_total", "result" => result).increment(1);
}

/// Record a moderation command refused by the authority check.
///
/// Metric: `relay_moderation_denied_total`
/// Labels: `command`
pub fn record_moderation_denied(command: &'static str) {
    counter!("relay_moderation_denied_total", "command" => command).increment(1);
}

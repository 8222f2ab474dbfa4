//! Prometheus metrics for the signal relay.
//!
//! All metrics follow Prometheus naming conventions:
//! - `relay_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `actor_type`: 3 values (dispatcher, room, connection)
//! - `message_type`: bounded by room mailbox message kinds (~9 values)
//! - `outcome`: relayed, dropped
//! - `reason`: backpressure, channel_closed
//!
//! Room names and peer ids are never used as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle used to render
/// `/metrics`.
///
/// Must be called before any metrics are recorded; until then every call in
/// this module records to the no-op recorder.
///
/// # Errors
///
/// Returns error if the recorder cannot be installed (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Room mailbox processing is in-memory; most messages take microseconds
        .set_buckets_for_metric(
            Matcher::Prefix("relay_message".to_string()),
            &[
                0.000_05, 0.000_1, 0.000_25, 0.000_5, 0.001, 0.005, 0.010, 0.050, 0.100,
            ],
        )
        .map_err(|e| format!("Failed to set message latency buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Full("relay_actor_mailbox_depth".to_string()),
            &[0.0, 1.0, 5.0, 10.0, 50.0, 100.0, 200.0, 500.0, 1000.0],
        )
        .map_err(|e| format!("Failed to set mailbox depth buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Gauges
// ============================================================================

/// Metric: `relay_rooms_active`
pub fn set_rooms_active(count: u64) {
    // u64 to f64 conversion is safe for realistic room counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("relay_rooms_active").set(count as f64);
}

/// Metric: `relay_connections_active`
pub fn set_connections_active(count: u64) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("relay_connections_active").set(count as f64);
}

// ============================================================================
// Counters
// ============================================================================

/// Metric: `relay_signals_total`
/// Labels: `outcome` (relayed, dropped)
///
/// Dropped signals are normal (unauthorized or departed targets); a sudden
/// rise usually means clients are racing disconnects.
pub fn record_signal(outcome: &str) {
    counter!("relay_signals_total", "outcome" => outcome.to_string()).increment(1);
}

/// Metric: `relay_messages_dropped_total`
/// Labels: `reason` (backpressure, channel_closed)
///
/// Events discarded because a peer's outbound queue was full or gone.
pub fn record_message_dropped(reason: &str) {
    counter!("relay_messages_dropped_total", "reason" => reason.to_string()).increment(1);
}

/// Metric: `relay_actor_panics_total`
/// Labels: `actor_type`
///
/// ALERT: Any non-zero value indicates a bug.
pub fn record_actor_panic(actor_type: &str) {
    counter!("relay_actor_panics_total", "actor_type" => actor_type.to_string()).increment(1);
}

// ============================================================================
// Histograms
// ============================================================================

/// Metric: `relay_message_latency_seconds`
/// Labels: `message_type`
///
/// Metric: `relay_actor_mailbox_depth`
/// Labels: `actor_type` (dispatcher, room, connection)
///
/// Backlog behind each message an actor takes. One histogram covers every
/// instance of a type; high buckets mean some actor is falling behind.
pub fn record_actor_mailbox_depth(actor_type: &str, depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    histogram!("relay_actor_mailbox_depth", "actor_type" => actor_type.to_string())
        .record(depth as f64);
}

/// Time a room actor spends on one mailbox message, policy included.
pub fn record_message_latency(message_type: &str, duration: Duration) {
    histogram!("relay_message_latency_seconds", "message_type" => message_type.to_string())
        .record(duration.as_secs_f64());
}

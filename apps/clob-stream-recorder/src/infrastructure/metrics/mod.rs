//! Prometheus Metrics Module
//!
//! Exposes recorder metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Messages**: Logical messages received, by event type
//! - **Records**: Records appended to the JSONL store
//! - **Connection**: Current connection state and reconnect attempts
//! - **Latency**: Frame processing time
//!
//! # Integration
//!
//! Metrics are rendered at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::streaming::{ConnectionState, EventKind};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder, or return the one already installed.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "clob_recorder_messages_received_total",
        "Logical messages received from the market channel, by event type"
    );
    describe_counter!(
        "clob_recorder_undecodable_frames_total",
        "Messages that were not valid JSON"
    );
    describe_counter!(
        "clob_recorder_records_persisted_total",
        "Records appended to the JSONL store"
    );

    describe_gauge!(
        "clob_recorder_connection_state",
        "1 for the current connection state, 0 otherwise"
    );
    describe_gauge!(
        "clob_recorder_subscriptions",
        "Number of subscribed asset ids"
    );
    describe_counter!(
        "clob_recorder_reconnects_total",
        "Reconnection attempts"
    );
    describe_counter!(
        "clob_recorder_connection_errors_total",
        "Connection failures by kind"
    );

    describe_histogram!(
        "clob_recorder_frame_processing_seconds",
        "Time from frame receipt to records appended"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record one logical message.
pub fn record_message_received(kind: EventKind) {
    counter!(
        "clob_recorder_messages_received_total",
        "event_type" => kind.label()
    )
    .increment(1);

    if matches!(kind, EventKind::Unknown { undecodable: true }) {
        counter!("clob_recorder_undecodable_frames_total").increment(1);
    }
}

/// Record one appended record.
pub fn record_persisted() {
    counter!("clob_recorder_records_persisted_total").increment(1);
}

/// Publish the current connection state.
pub fn set_connection_state(current: ConnectionState) {
    for state in ConnectionState::all() {
        let value = if *state == current { 1.0 } else { 0.0 };
        gauge!("clob_recorder_connection_state", "state" => state.as_str()).set(value);
    }
}

/// Update the subscription count.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscriptions(count: usize) {
    gauge!("clob_recorder_subscriptions").set(count as f64);
}

/// Record a reconnection attempt.
pub fn record_reconnect() {
    counter!("clob_recorder_reconnects_total").increment(1);
}

/// Record a connection failure.
pub fn record_connection_error(kind: &'static str) {
    counter!("clob_recorder_connection_errors_total", "kind" => kind).increment(1);
}

/// Record how long one frame took to process.
pub fn record_frame_duration(duration: Duration) {
    histogram!("clob_recorder_frame_processing_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        record_message_received(EventKind::Book);
        record_message_received(EventKind::Unknown { undecodable: true });
        record_persisted();
        set_connection_state(ConnectionState::Live);
        set_subscriptions(3);
        record_reconnect();
        record_connection_error("transport");
        record_frame_duration(Duration::from_millis(2));
    }

    #[test]
    fn rendered_output_uses_recorder_names() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_message_received(EventKind::PriceChange);
            set_connection_state(ConnectionState::Reconnecting);
        });

        let rendered = handle.render();
        assert!(rendered.contains("clob_recorder_messages_received_total{event_type=\"price_change\"} 1"));
        assert!(rendered.contains("clob_recorder_connection_state{state=\"reconnecting\"} 1"));
        assert!(rendered.contains("clob_recorder_connection_state{state=\"live\"} 0"));
    }
}

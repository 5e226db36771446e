//! Client metrics
//!
//! OpenTelemetry instruments recorded by the client when observability is
//! enabled through `ClientBuilder::with_observability()`. They go nowhere
//! until a meter provider is installed (see `init_observability`).
//!
//! # Metrics Collected
//!
//! - **connection.state**: current `ConnectionState` (gauge)
//! - **requests.total** / **request.duration**: calls by method and status
//! - **errors.total**: errors by type
//! - **notifications.received**: notifications routed to a subscription
//! - **notifications.dropped**: notifications discarded (closed id or lag)
//! - **subscriptions.active**: open subscriptions (up/down counter)
//! - **connect.attempts**: transport connection attempts by outcome

use crate::connection_state::ConnectionState;
use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter, UpDownCounter},
    InstrumentationScope, KeyValue,
};

/// Instruments shared by every clone of a client
pub struct ClientMetrics {
    pub connection_state: Gauge<i64>,
    pub requests_total: Counter<u64>,
    /// Seconds from registration to resolution
    pub request_duration: Histogram<f64>,
    pub errors_total: Counter<u64>,
    pub notifications_received: Counter<u64>,
    pub notifications_dropped: Counter<u64>,
    pub subscriptions_active: UpDownCounter<i64>,
    pub connect_attempts: Counter<u64>,
}

impl ClientMetrics {
    /// Create instruments on the global meter provider
    pub fn new(service_name: impl Into<String>) -> Self {
        let scope = InstrumentationScope::builder(service_name.into())
            .with_version(env!("CARGO_PKG_VERSION"))
            .build();
        let meter = global::meter_with_scope(scope);
        Self::new_with_meter(&meter)
    }

    /// Create instruments on a specific meter
    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            connection_state: meter
                .i64_gauge("web3.client.connection.state")
                .with_description("Connection state (0=disconnected, 1=connecting, 2=open, 3=closing)")
                .build(),
            requests_total: meter
                .u64_counter("web3.client.requests.total")
                .with_description("Total number of calls sent")
                .build(),
            request_duration: meter
                .f64_histogram("web3.client.request.duration")
                .with_description("Call duration in seconds")
                .with_unit("s")
                .build(),
            errors_total: meter
                .u64_counter("web3.client.errors.total")
                .with_description("Total number of errors encountered")
                .build(),
            notifications_received: meter
                .u64_counter("web3.client.notifications.received")
                .with_description("Notifications delivered to a subscription")
                .build(),
            notifications_dropped: meter
                .u64_counter("web3.client.notifications.dropped")
                .with_description("Notifications discarded for closed ids or slow consumers")
                .build(),
            subscriptions_active: meter
                .i64_up_down_counter("web3.client.subscriptions.active")
                .with_description("Open subscriptions")
                .build(),
            connect_attempts: meter
                .u64_counter("web3.client.connect.attempts")
                .with_description("Transport connection attempts")
                .build(),
        }
    }

    pub fn update_connection_state(&self, state: ConnectionState) {
        self.connection_state.record(state.as_i64(), &[]);
    }

    /// Record a finished call
    pub fn record_request(&self, method: &str, status: &str, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("method", method.to_string()),
            KeyValue::new("status", status.to_string()),
        ];
        self.requests_total.add(1, attributes);
        self.request_duration.record(duration_secs, attributes);
    }

    pub fn record_error(&self, error_type: &str) {
        let attributes = &[KeyValue::new("error_type", error_type.to_string())];
        self.errors_total.add(1, attributes);
    }

    pub fn record_notification(&self) {
        self.notifications_received.add(1, &[]);
    }

    /// Record discarded notifications; `reason` is "closed" or "lagged"
    pub fn record_notifications_dropped(&self, count: u64, reason: &str) {
        let attributes = &[KeyValue::new("reason", reason.to_string())];
        self.notifications_dropped.add(count, attributes);
    }

    pub fn subscription_opened(&self) {
        self.subscriptions_active.add(1, &[]);
    }

    pub fn subscriptions_closed(&self, count: usize) {
        self.subscriptions_active.add(-(count as i64), &[]);
    }

    /// Record a transport connection attempt and whether it succeeded
    pub fn record_connect_attempt(&self, transport: &str, success: bool) {
        let attributes = &[
            KeyValue::new("transport", transport.to_string()),
            KeyValue::new("success", success),
        ];
        self.connect_attempts.add(1, attributes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording_without_provider() {
        // The no-op global provider accepts every recording.
        let metrics = ClientMetrics::new("test-client");

        metrics.update_connection_state(ConnectionState::Open);
        metrics.record_request("eth_blockNumber", "success", 0.05);
        metrics.record_request("eth_call", "error", 0.01);
        metrics.record_error("timeout");
        metrics.record_notification();
        metrics.record_notifications_dropped(3, "lagged");
        metrics.subscription_opened();
        metrics.subscriptions_closed(1);
        metrics.record_connect_attempt("websocket", false);
    }

    #[test]
    fn test_every_state_is_recordable() {
        let metrics = ClientMetrics::new("test-client-state");

        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Open,
            ConnectionState::Closing,
        ] {
            metrics.update_connection_state(state);
        }
    }
}

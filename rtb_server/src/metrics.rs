//! Prometheus metrics for lobby traffic.
//!
//! Exported on a separate listener when `METRICS_BIND` is set. Without an
//! installed recorder every helper here is a no-op.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// WebSocket Metrics
// ============================================================================

/// Set number of active WebSocket connections.
pub fn websocket_connections_active(count: usize) {
    metrics::gauge!("websocket_connections_active").set(count as f64);
}

/// Record a WebSocket connection.
pub fn websocket_connections_total() {
    metrics::counter!("websocket_connections_total").increment(1);
}

/// Record a session snapshot pushed to a client.
pub fn websocket_messages_sent() {
    metrics::counter!("websocket_messages_sent_total").increment(1);
}

// ============================================================================
// Lobby Metrics
// ============================================================================

/// Record a lobby operation and whether it succeeded.
pub fn lobby_operations_total(operation: &'static str, success: bool) {
    let outcome = if success { "ok" } else { "rejected" };
    metrics::counter!("lobby_operations_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}

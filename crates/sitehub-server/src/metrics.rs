//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render the `/metrics` endpoint. Call once at
/// startup, before any metric is recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Frames dropped because a member's outbound queue was full (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Rooms with at least one member (gauge).
pub const HUB_ROOMS_ACTIVE: &str = "hub_rooms_active";
/// Inbound envelopes handled (counter, labels: action).
pub const HUB_MESSAGES_TOTAL: &str = "hub_messages_total";
/// Inbound envelopes rejected (counter, labels: code).
pub const HUB_ERRORS_TOTAL: &str = "hub_errors_total";
/// Bulk service call duration seconds (histogram, labels: action).
pub const BULK_OPERATION_DURATION_SECONDS: &str = "bulk_operation_duration_seconds";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_names_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_BROADCAST_DROPS_TOTAL,
            HUB_ROOMS_ACTIVE,
            HUB_MESSAGES_TOTAL,
            HUB_ERRORS_TOTAL,
            BULK_OPERATION_DURATION_SECONDS,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "{name} is not snake_case"
            );
        }
    }
}

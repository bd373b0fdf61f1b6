//! Network, connection, hub and logging sections.

use serde::{Deserialize, Serialize};
use sitehub_core::LogFormat;

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (`0` picks a free port).
    pub port: u16,
    /// Upgrades beyond this many live connections are refused.
    pub max_connections: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 1024,
        }
    }
}

/// Per-connection transport tuning.
///
/// The ping interval must stay below the pong timeout so a healthy peer
/// always has a probe to answer before its read deadline expires.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Capacity of each connection's outbound queue, in frames.
    pub send_queue_capacity: usize,
    /// Largest accepted inbound message, in bytes.
    pub max_message_size: usize,
    /// Period between server pings, in milliseconds.
    pub ping_interval_ms: u64,
    /// Read deadline after the last pong, in milliseconds.
    pub pong_timeout_ms: u64,
    /// Deadline for a single transport write, in milliseconds.
    pub write_timeout_ms: u64,
    /// Upper bound on queued frames written before a flush.
    pub max_coalesce: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            send_queue_capacity: 256,
            max_message_size: 512 * 1024,
            ping_interval_ms: 54_000,
            pong_timeout_ms: 60_000,
            write_timeout_ms: 10_000,
            max_coalesce: 64,
        }
    }
}

/// Hub event loop and bulk dispatch settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Capacity of each hub command channel.
    pub command_buffer: usize,
    /// Deadline for one bulk service call, in milliseconds.
    pub service_timeout_ms: u64,
    /// Entity types served by the bundled in-memory bulk service.
    pub in_memory_entities: Vec<String>,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            command_buffer: 1024,
            service_timeout_ms: 30_000,
            in_memory_entities: Vec::new(),
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_period_is_nine_tenths_of_pong_timeout() {
        let c = ConnectionSettings::default();
        assert_eq!(c.ping_interval_ms * 10, c.pong_timeout_ms * 9);
    }

    #[test]
    fn connection_camel_case_keys() {
        let json = serde_json::to_value(ConnectionSettings::default()).unwrap();
        assert_eq!(json["sendQueueCapacity"], 256);
        assert_eq!(json["maxMessageSize"], 524_288);
        assert_eq!(json["writeTimeoutMs"], 10_000);
    }

    #[test]
    fn partial_hub_section_fills_defaults() {
        let hub: HubSettings =
            serde_json::from_str(r#"{"inMemoryEntities": ["field_device"]}"#).unwrap();
        assert_eq!(hub.in_memory_entities, ["field_device"]);
        assert_eq!(hub.command_buffer, 1024);
        assert_eq!(hub.service_timeout_ms, 30_000);
    }

    #[test]
    fn logging_format_from_json() {
        let logging: LoggingSettings = serde_json::from_str(r#"{"format": "json"}"#).unwrap();
        assert_eq!(logging.format, LogFormat::Json);
        assert_eq!(logging.level, "info");
    }

    #[test]
    fn server_defaults() {
        let s = ServerSettings::default();
        assert_eq!(s.host, "0.0.0.0");
        assert_eq!(s.port, 8080);
        assert_eq!(s.max_connections, 1024);
    }
}

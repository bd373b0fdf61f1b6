//! Server configuration.

use std::time::Duration;

use sitehub_settings::SitehubSettings;

/// Per-connection transport limits and timers.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Capacity of each outbound queue, in frames.
    pub send_queue_capacity: usize,
    /// Largest accepted inbound message, in bytes.
    pub max_message_size: usize,
    /// Period between server pings.
    pub ping_interval: Duration,
    /// Read deadline measured from the last pong.
    pub pong_timeout: Duration,
    /// Deadline for one transport write (including flush).
    pub write_timeout: Duration,
    /// Upper bound on extra queued frames written before a flush.
    pub max_coalesce: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            send_queue_capacity: 256,
            max_message_size: 512 * 1024,
            ping_interval: Duration::from_secs(54),
            pong_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
            max_coalesce: 64,
        }
    }
}

/// Configuration for the sitehub server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Capacity of each hub command channel.
    pub command_buffer: usize,
    /// Deadline for one bulk service call.
    pub service_timeout: Duration,
    /// Transport settings applied to every connection.
    pub connection: ConnectionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 1024,
            command_buffer: 1024,
            service_timeout: Duration::from_secs(30),
            connection: ConnectionConfig::default(),
        }
    }
}

impl From<&SitehubSettings> for ServerConfig {
    fn from(settings: &SitehubSettings) -> Self {
        let c = &settings.connection;
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_connections: settings.server.max_connections,
            command_buffer: settings.hub.command_buffer,
            service_timeout: Duration::from_millis(settings.hub.service_timeout_ms),
            connection: ConnectionConfig {
                send_queue_capacity: c.send_queue_capacity,
                max_message_size: c.max_message_size,
                ping_interval: Duration::from_millis(c.ping_interval_ms),
                pong_timeout: Duration::from_millis(c.pong_timeout_ms),
                write_timeout: Duration::from_millis(c.write_timeout_ms),
                max_coalesce: c.max_coalesce,
            },
        }
    }
}

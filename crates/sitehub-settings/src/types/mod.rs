//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`,
//! so a settings file only needs the keys it changes.

mod server;

pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "connection": { "sendQueueCapacity": 512 },
///   "hub": { "inMemoryEntities": ["field_device"] }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SitehubSettings {
    /// HTTP listener.
    pub server: ServerSettings,
    /// Per-connection transport tuning.
    pub connection: ConnectionSettings,
    /// Hub loop and bulk dispatch.
    pub hub: HubSettings,
    /// Logging.
    pub logging: LoggingSettings,
}

impl SitehubSettings {
    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        let c = &self.connection;
        if c.ping_interval_ms >= c.pong_timeout_ms {
            return Err(SettingsError::InvalidValue {
                field: "connection.pingIntervalMs",
                reason: format!(
                    "{} must be below pongTimeoutMs ({})",
                    c.ping_interval_ms, c.pong_timeout_ms
                ),
            });
        }
        if c.ping_interval_ms == 0 {
            return Err(zero("connection.pingIntervalMs"));
        }
        if c.write_timeout_ms == 0 {
            return Err(zero("connection.writeTimeoutMs"));
        }
        if c.send_queue_capacity == 0 {
            return Err(zero("connection.sendQueueCapacity"));
        }
        if c.max_message_size == 0 {
            return Err(zero("connection.maxMessageSize"));
        }
        if self.hub.command_buffer == 0 {
            return Err(zero("hub.commandBuffer"));
        }
        Ok(())
    }
}

fn zero(field: &'static str) -> SettingsError {
    SettingsError::InvalidValue {
        field,
        reason: "must be greater than zero".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SitehubSettings::default().validate().unwrap();
    }

    #[test]
    fn ping_must_be_below_pong_timeout() {
        let mut s = SitehubSettings::default();
        s.connection.ping_interval_ms = 60_000;
        s.connection.pong_timeout_ms = 60_000;
        let err = s.validate().unwrap_err();
        assert!(matches!(
            err,
            SettingsError::InvalidValue { field: "connection.pingIntervalMs", .. }
        ));
    }

    #[test]
    fn zero_queue_rejected() {
        let mut s = SitehubSettings::default();
        s.connection.send_queue_capacity = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn zero_command_buffer_rejected() {
        let mut s = SitehubSettings::default();
        s.hub.command_buffer = 0;
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("hub.commandBuffer"));
    }

    #[test]
    fn empty_object_deserializes_to_defaults() {
        let s: SitehubSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(s.server.port, 8080);
        assert_eq!(s.connection.send_queue_capacity, 256);
    }
}

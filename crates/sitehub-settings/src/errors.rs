//! Errors raised while loading `settings.json`.

use std::path::PathBuf;

/// Why settings could not be loaded.
///
/// File failures carry the path so the binary can point at the offending
/// file without extra context.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not JSON, or its values have the wrong shape.
    #[error("malformed settings in {}: {source}", path.display())]
    Malformed {
        /// File that failed.
        path: PathBuf,
        /// Decoder error, with line and column when available.
        #[source]
        source: serde_json::Error,
    },

    /// The compiled defaults could not be serialized for merging.
    #[error("settings defaults do not serialize: {0}")]
    Defaults(#[source] serde_json::Error),

    /// A value is outside its allowed range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Dotted settings path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Result alias for settings loading.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn read_error_names_file() {
        let err = SettingsError::Read {
            path: PathBuf::from("/etc/sitehub/settings.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "cannot read /etc/sitehub/settings.json: denied");
        assert!(err.source().is_some());
    }

    #[test]
    fn malformed_error_keeps_position() {
        let source = serde_json::from_str::<serde_json::Value>("{\n  \"port\": }").unwrap_err();
        let err = SettingsError::Malformed {
            path: PathBuf::from("settings.json"),
            source,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("malformed settings in settings.json"));
        assert!(msg.contains("line 2"));
    }

    #[test]
    fn invalid_value_names_field() {
        let err = SettingsError::InvalidValue {
            field: "connection.pingIntervalMs",
            reason: "must be below pongTimeoutMs".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value for connection.pingIntervalMs: must be below pongTimeoutMs"
        );
    }
}

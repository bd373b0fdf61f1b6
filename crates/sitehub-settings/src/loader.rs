//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SitehubSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `SITEHUB_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use sitehub_core::LogFormat;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::SitehubSettings;

/// Resolve the settings file path.
///
/// `SITEHUB_CONFIG` wins; otherwise `~/.sitehub/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(path) = read_env_string("SITEHUB_CONFIG") {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".sitehub").join("settings.json")
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a malformed one is an error. The result
/// is validated before it is returned.
pub fn load_settings_from_path(path: &Path) -> Result<SitehubSettings> {
    let defaults =
        serde_json::to_value(SitehubSettings::default()).map_err(SettingsError::Defaults)?;
    let malformed = |source| SettingsError::Malformed {
        path: path.to_path_buf(),
        source,
    };

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(malformed)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: SitehubSettings = serde_json::from_value(merged).map_err(malformed)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `SITEHUB_*` environment variable overrides.
///
/// Out-of-range or unparsable values are ignored with a warning.
pub fn apply_env_overrides(settings: &mut SitehubSettings) {
    if let Some(v) = read_env_string("SITEHUB_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("SITEHUB_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_usize("SITEHUB_MAX_CONNECTIONS", 1, 1_000_000) {
        settings.server.max_connections = v;
    }

    if let Some(v) = read_env_usize("SITEHUB_SEND_QUEUE", 1, 65_536) {
        settings.connection.send_queue_capacity = v;
    }
    if let Some(v) = read_env_usize("SITEHUB_MAX_MESSAGE_SIZE", 1024, 64 * 1024 * 1024) {
        settings.connection.max_message_size = v;
    }
    if let Some(v) = read_env_u64("SITEHUB_PING_INTERVAL_MS", 100, 3_600_000) {
        settings.connection.ping_interval_ms = v;
    }
    if let Some(v) = read_env_u64("SITEHUB_PONG_TIMEOUT_MS", 100, 3_600_000) {
        settings.connection.pong_timeout_ms = v;
    }
    if let Some(v) = read_env_u64("SITEHUB_WRITE_TIMEOUT_MS", 100, 600_000) {
        settings.connection.write_timeout_ms = v;
    }

    if let Some(v) = read_env_string("SITEHUB_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_string("SITEHUB_LOG_FORMAT") {
        match LogFormat::parse(&v) {
            Some(format) => settings.logging.format = format,
            None => tracing::warn!(key = "SITEHUB_LOG_FORMAT", value = %v, "invalid log format, ignoring"),
        }
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8080, "host": "localhost"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"entities": ["a", "b"]});
        let source = serde_json::json!({"entities": ["c"]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["entities"], serde_json::json!(["c"]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_new_keys_added() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"b": 2}));
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_settings_from_path(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.connection.send_queue_capacity, 256);
        assert_eq!(settings.hub.command_buffer, 1024);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"connection": {"sendQueueCapacity": 16}, "hub": {"inMemoryEntities": ["field_device"]}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.connection.send_queue_capacity, 16);
        assert_eq!(settings.connection.pong_timeout_ms, 60_000);
        assert_eq!(settings.hub.in_memory_entities, ["field_device"]);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(
            result.unwrap_err(),
            SettingsError::Malformed { path: p, .. } if p == path
        ));
    }

    #[test]
    fn load_wrong_type_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": "eighty"}}"#).unwrap();

        let err = load_settings_from_path(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Malformed { .. }));
        assert!(err.to_string().contains("settings.json"));
    }

    #[test]
    fn load_directory_is_read_error() {
        let dir = tempfile::tempdir().unwrap();

        let err = load_settings_from_path(dir.path()).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
    }

    #[test]
    fn load_rejects_ping_not_below_pong() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"connection": {"pingIntervalMs": 70000, "pongTimeoutMs": 60000}}"#,
        )
        .unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::InvalidValue { .. }));
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_u16_in_range() {
        assert_eq!(parse_u16_range("8080", 0, 65535), Some(8080));
        assert_eq!(parse_u16_range("70000", 0, 65535), None);
        assert_eq!(parse_u16_range("abc", 0, 65535), None);
    }

    #[test]
    fn parse_u64_bounds_inclusive() {
        assert_eq!(parse_u64_range("100", 100, 200), Some(100));
        assert_eq!(parse_u64_range("200", 100, 200), Some(200));
        assert_eq!(parse_u64_range("99", 100, 200), None);
    }

    #[test]
    fn parse_usize_rejects_negative() {
        assert_eq!(parse_usize_range("-1", 0, 10), None);
        assert_eq!(parse_usize_range("7", 0, 10), Some(7));
    }
}

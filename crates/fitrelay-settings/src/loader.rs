//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{RelaySettings, WsHosting};

/// Env var naming an explicit settings file.
pub const CONFIG_ENV: &str = "FITRELAY_CONFIG";

/// Resolve the settings file: `FITRELAY_CONFIG`, else `./fitrelay.json`.
pub fn settings_path() -> PathBuf {
    std::env::var(CONFIG_ENV)
        .ok()
        .filter(|v| !v.is_empty())
        .map_or_else(|| PathBuf::from("fitrelay.json"), PathBuf::from)
}

/// Load settings from the resolved path with env var overrides.
pub fn load_settings() -> Result<RelaySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let mut settings = load_file(path)?;
    apply_overrides(&mut settings, |name| std::env::var(name).ok());
    Ok(settings)
}

/// Defaults merged with the file at `path`, without env overrides.
pub fn load_file(path: &Path) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
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

/// Apply overrides read through `lookup` (the process env in production).
///
/// Invalid values are ignored with a warning and the file/default value kept.
pub fn apply_overrides(settings: &mut RelaySettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("PORT") {
        match parse_u16_range(&v, 1, 65535) {
            Some(port) => settings.server.http_port = port,
            None => warn_invalid("PORT", &v),
        }
    }
    if let Some(v) = read("WS_PORT") {
        match parse_u16_range(&v, 1, 65535) {
            Some(port) => settings.server.ws_port = Some(port),
            None => warn_invalid("WS_PORT", &v),
        }
    }
    if let Some(v) = read("FITRELAY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("FITRELAY_WS_HOSTING") {
        match v.parse::<WsHosting>() {
            Ok(mode) => settings.server.ws_hosting = mode,
            Err(_) => warn_invalid("FITRELAY_WS_HOSTING", &v),
        }
    }
    if let Some(v) = read("FITRELAY_STATIC_DIR") {
        settings.server.static_dir = v;
    }
    if let Some(v) = read("FITRELAY_HISTORY_LIMIT") {
        match parse_usize_range(&v, 1, 10_000) {
            Some(n) => settings.server.history_limit = n,
            None => warn_invalid("FITRELAY_HISTORY_LIMIT", &v),
        }
    }
    if let Some(v) = read("DATABASE_URL") {
        settings.database.url = Some(v);
    }
    if let Some(v) = read("FITRELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("FITRELAY_LOG_JSON") {
        match parse_bool(&v) {
            Some(b) => settings.logging.json = b,
            None => warn_invalid("FITRELAY_LOG_JSON", &v),
        }
    }
}

fn warn_invalid(key: &str, value: &str) {
    tracing::warn!(key, value, "invalid env var, ignoring");
}

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub logging: LoggingSettings,
}

/// Where the WebSocket endpoint lives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WsHosting {
    /// Separate listener on `wsPort`; any path upgrades.
    #[default]
    Dedicated,
    /// Same listener as the HTTP API, upgrade at `/ws`.
    Shared,
}

impl std::str::FromStr for WsHosting {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dedicated" => Ok(Self::Dedicated),
            "shared" => Ok(Self::Shared),
            other => Err(format!("unknown ws hosting mode: {other}")),
        }
    }
}

/// Network and HTTP surface settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address for every listener.
    pub host: String,
    /// HTTP API port.
    pub http_port: u16,
    /// WebSocket port for [`WsHosting::Dedicated`]. Defaults to `http_port + 1`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_port: Option<u16>,
    pub ws_hosting: WsHosting,
    /// Directory holding the built web app.
    pub static_dir: String,
    /// Page size for the history endpoint when the caller gives none.
    pub history_limit: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 3000,
            ws_port: None,
            ws_hosting: WsHosting::Dedicated,
            static_dir: "public".to_string(),
            history_limit: 20,
        }
    }
}

impl ServerSettings {
    pub fn resolved_ws_port(&self) -> u16 {
        self.ws_port
            .unwrap_or_else(|| self.http_port.saturating_add(1))
    }
}

/// Relational backend settings. No URL means memory-only mode.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl DatabaseSettings {
    /// SQLite file path from `url`, accepting `sqlite://`, `sqlite:` or a bare path.
    pub fn sqlite_path(&self) -> Option<PathBuf> {
        let url = self.url.as_deref()?.trim();
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        (!path.is_empty()).then(|| PathBuf::from(path))
    }
}

/// Log output settings. `RUST_LOG` still wins over `level`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

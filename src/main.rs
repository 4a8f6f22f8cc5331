//! # fitrelay
//!
//! Relay binary: loads settings, opens the store and serves the WebSocket
//! hub plus the REST API until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use fitrelay_settings::RelaySettings;
use fitrelay_store::{Database, ExerciseStore, SqliteRecordStore};
use fitrelay_telemetry::TelemetryConfig;
use tracing::Level;

/// Fitness telemetry relay.
#[derive(Parser, Debug)]
#[command(name = "fitrelay", about = "WebSocket relay and REST API for exercise telemetry")]
struct Cli {
    /// Settings file (JSON). Defaults to `FITRELAY_CONFIG`, then `./fitrelay.json`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// HTTP port (overrides settings and `PORT`).
    #[arg(long)]
    port: Option<u16>,

    /// WebSocket port for the dedicated listener.
    #[arg(long)]
    ws_port: Option<u16>,

    /// SQLite path or `sqlite://` URL. Without one the relay runs memory-only.
    #[arg(long)]
    database_url: Option<String>,
}

impl Cli {
    fn load_settings(&self) -> Result<RelaySettings> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(fitrelay_settings::settings_path);
        let mut settings = fitrelay_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;

        if let Some(port) = self.port {
            settings.server.http_port = port;
        }
        if let Some(ws_port) = self.ws_port {
            settings.server.ws_port = Some(ws_port);
        }
        if let Some(url) = &self.database_url {
            settings.database.url = Some(url.clone());
        }
        Ok(settings)
    }
}

/// Relational store when configured and openable, memory-only otherwise.
fn open_store(settings: &RelaySettings) -> ExerciseStore {
    let Some(path) = settings.database.sqlite_path() else {
        tracing::warn!("no database configured, records are kept in memory only");
        return ExerciseStore::memory_only();
    };

    match Database::open(&path) {
        Ok(db) => ExerciseStore::with_primary(Arc::new(SqliteRecordStore::new(db))),
        Err(e) => {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "failed to open database, continuing in memory only"
            );
            ExerciseStore::memory_only()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;

    fitrelay_telemetry::init_telemetry(&TelemetryConfig {
        level: settings.logging.level.clone(),
        json: settings.logging.json,
        module_levels: vec![("tower_http".into(), Level::WARN)],
    })
    .context("Failed to initialize logging")?;

    let metrics = match fitrelay_telemetry::metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "metrics disabled");
            None
        }
    };

    let store = Arc::new(open_store(&settings));
    let handle = fitrelay_server::start(settings.server, store, metrics)
        .await
        .context("Failed to bind listeners")?;

    tracing::info!(
        http = %handle.http_addr,
        websocket = %handle.ws_addr,
        "fitrelay ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}

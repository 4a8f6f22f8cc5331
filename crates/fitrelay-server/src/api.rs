//! REST handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use fitrelay_core::Reading;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::ingest::{self, ExerciseSubmission};
use crate::server::AppState;

pub const ENDPOINTS: &[&str] = &[
    "GET /api",
    "POST /api/ejercicio",
    "GET /api/historial?limit=N",
    "GET /api/estadisticas",
    "GET /health",
    "GET /metrics",
];

/// GET /api
pub async fn info(State(state): State<AppState>) -> Json<Value> {
    let store = state.hub.store();
    Json(json!({
        "message": "fitrelay",
        "status": "active",
        "version": env!("CARGO_PKG_VERSION"),
        "database": store.mode(),
        "source": store.source(),
        "http_port": state.ports.http,
        "websocket_port": state.ports.websocket,
        "websocket_hosting": state.settings.ws_hosting,
        "endpoints": ENDPOINTS,
    }))
}

/// POST /api/ejercicio
pub async fn create_exercise(
    State(state): State<AppState>,
    body: Result<Json<ExerciseSubmission>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(submission) = body.map_err(|e| ApiError::InvalidBody(e.body_text()))?;
    let record = ingest::submit(&state.hub, submission).await?;
    Ok(Json(json!({ "success": true, "data": record })))
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<String>,
}

impl HistoryParams {
    /// Lenient like the device fields; zero, negative or junk means default.
    fn resolve(&self, default: usize) -> usize {
        match self.limit.as_deref().map(Reading::parse_lenient) {
            Some(Reading::Value(n)) if n > 0 => usize::try_from(n).unwrap_or(default),
            _ => default,
        }
    }
}

/// GET /api/historial
pub async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Value>, ApiError> {
    let limit = params.resolve(state.settings.history_limit);
    let history = state
        .hub
        .store()
        .history(limit)
        .await
        .map_err(ApiError::internal("Error obteniendo historial"))?;
    Ok(Json(json!({
        "success": true,
        "data": history.records,
        "source": history.source,
    })))
}

/// GET /api/estadisticas
pub async fn statistics(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let stats = state
        .hub
        .store()
        .statistics()
        .await
        .map_err(ApiError::internal("Error obteniendo estadísticas"))?;
    Ok(Json(json!({ "success": true, "data": stats })))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "connections": state.hub.connection_count(),
        "store": state.hub.store().health(),
    }))
}

/// GET /metrics, Prometheus text format. 404 when no recorder is installed.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(limit: Option<&str>) -> HistoryParams {
        HistoryParams {
            limit: limit.map(str::to_string),
        }
    }

    #[test]
    fn history_limit_resolution() {
        assert_eq!(params(None).resolve(20), 20);
        assert_eq!(params(Some("5")).resolve(20), 5);
        assert_eq!(params(Some("7abc")).resolve(20), 7);
        assert_eq!(params(Some("0")).resolve(20), 20);
        assert_eq!(params(Some("-3")).resolve(20), 20);
        assert_eq!(params(Some("many")).resolve(20), 20);
    }
}

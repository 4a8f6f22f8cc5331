use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fitrelay_store::StoreError;
use serde_json::json;
use thiserror::Error;

/// REST failure. Bodies are `{"error": "<message>"}`; messages stay in the
/// browser client's language.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Faltan campos requeridos")]
    MissingFields,

    #[error("Cuerpo de la petición inválido: {0}")]
    InvalidBody(String),

    /// Store failure; `message` goes to the client, `source` only to the log.
    #[error("{message}: {source}")]
    Internal {
        message: &'static str,
        #[source]
        source: StoreError,
    },
}

impl ApiError {
    pub fn internal(message: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::Internal { message, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingFields | Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal { message, source } => {
                tracing::error!(error = %source, "{message}");
                (*message).to_string()
            }
            other => {
                tracing::debug!(error = %other, "rejected request");
                other.to_string()
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

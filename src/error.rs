// ── Gateway Errors ──────────────────────────────────────────────────────────
// Single canonical error enum for the gateway, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain (I/O, JSON, Network, Downstream…).
//   • The `#[from]` attribute wires std/external error conversions automatically.
//   • `GatewayError` implements axum's `IntoResponse` directly so handler code
//     can use `?` and still produce the right status code.
//   • No variant carries secret material (platform password, bearer tokens)
//     in its `Display` output.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP / network failure (reqwest layer). The `Display` impl of
    /// `reqwest::Error` never includes request bodies or headers, so no
    /// secret leakage risk here.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A downstream collaborator (platform, graphiti, arxiv, registry,
    /// matrix, tool-selector) returned a terminal failure for one call.
    /// Sibling calls are unaffected; callers log and proceed.
    #[error("Downstream error: {collaborator}: {message}")]
    Downstream { collaborator: String, message: String },

    /// Request validation failure (missing agent_id or prompt).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Gateway configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catch-all for errors that do not yet have a dedicated variant.
    #[error("{0}")]
    Other(String),
}

impl GatewayError {
    pub fn downstream(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Downstream { collaborator: collaborator.into(), message: message.into() }
    }
}

impl From<String> for GatewayError {
    fn from(s: String) -> Self {
        GatewayError::Other(s)
    }
}

impl From<&str> for GatewayError {
    fn from(s: &str) -> Self {
        GatewayError::Other(s.to_string())
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Downstream { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({ "status": "error", "message": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

//! HTTP error mapping for the daemon.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rebate::error::{ErrorKind, PipelineError};

/// Errors returned by the daemon's HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// A query parameter could not be parsed.
    #[error("invalid query parameter {name}: {reason}")]
    InvalidQuery {
        /// Name of the parameter.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A pipeline operation failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl DaemonError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidQuery { .. } => StatusCode::BAD_REQUEST,
            Self::Pipeline(e) => match e.kind() {
                ErrorKind::Configuration => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::Network => StatusCode::BAD_GATEWAY,
                ErrorKind::Operation => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                ErrorKind::Verification => StatusCode::UNAUTHORIZED,
            },
        }
    }
}

impl IntoResponse for DaemonError {
    fn into_response(self) -> Response {
        let kind = match &self {
            Self::InvalidQuery { .. } => "invalid_request",
            Self::Pipeline(e) => e.kind().as_str(),
        };
        let body = serde_json::json!({ "error": self.to_string(), "kind": kind });
        (self.status(), axum::Json(body)).into_response()
    }
}

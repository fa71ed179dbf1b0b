use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::io;
use thiserror::Error;

use crate::pipeline::ValidationError;

/// Result type for the intake server
pub type ServerResult<T> = std::result::Result<T, ServerError>;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("invalid bind address '{0}'")]
    InvalidAddress(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Io(#[from] io::Error),
}

/// Request-level failures, rendered as `{"status": "failed", "error": ...}`
#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Invalid(#[from] ValidationError),

    #[error("invalid JSON body: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl IntakeError {
    pub fn status(&self) -> StatusCode {
        match self {
            IntakeError::Unauthorized => StatusCode::UNAUTHORIZED,
            IntakeError::Invalid(_) | IntakeError::Malformed(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for IntakeError {
    fn into_response(self) -> Response {
        let body = json!({ "status": "failed", "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

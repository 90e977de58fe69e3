//! Error taxonomy for the identity core and its HTTP translation.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email or wrong password; callers never learn which.
    #[error("email or password is invalid")]
    CredentialMismatch,

    #[error("missing or invalid session")]
    SessionNotFound,

    #[error("schema discovery failed: {0:#}")]
    SchemaDiscovery(anyhow::Error),

    #[error("{0}")]
    InvalidField(String),

    #[error("{0}")]
    Malformed(String),

    #[error("{0}")]
    Conflict(String),

    #[error("user update failed: {0:#}")]
    Update(anyhow::Error),

    #[error("entropy source failed: {0:#}")]
    Entropy(anyhow::Error),

    #[error("credential hashing failed: {0}")]
    Hashing(String),

    #[error("store failure: {0:#}")]
    Store(anyhow::Error),
}

impl AuthError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::CredentialMismatch | Self::SessionNotFound => StatusCode::UNAUTHORIZED,
            Self::InvalidField(_) | Self::Malformed(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::SchemaDiscovery(_)
            | Self::Update(_)
            | Self::Entropy(_)
            | Self::Hashing(_)
            | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        if self.status().is_server_error() {
            "internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

/// Error envelope: `{"errors":{"body":["..."]}}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub errors: ErrorBody,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub body: Vec<String>,
}

impl ErrorResponse {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            errors: ErrorBody {
                body: vec![message.into()],
            },
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{self}");
        }
        (status, Json(ErrorResponse::new(self.public_message()))).into_response()
    }
}

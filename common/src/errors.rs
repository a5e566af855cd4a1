//! Error taxonomy shared by all services.
//!
//! Every failure a handler can report is one of these variants. The status
//! code mapping lives in [`AppError::status_code`] and nowhere else.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::response::ErrorBody;

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Application error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppError {
    /// Missing or malformed input. Never reaches the database.
    #[error("{0}")]
    Validation(String),

    /// The requested connection has no usable connection string.
    #[error("{0}")]
    Configuration(String),

    /// Opening, probing or talking to the server failed at the transport level.
    #[error("{0}")]
    Connection(String),

    /// A database call did not finish before its deadline.
    #[error("{operation} timed out after {}", format_limit(.limit_ms))]
    ConnectionTimeout { operation: String, limit_ms: u64 },

    /// The server rejected an operation on an established connection.
    #[error("{0}")]
    Operation(String),

    /// Unexpected internal failure.
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Error code for log correlation.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Connection(_) => "CONNECTION_ERROR",
            AppError::ConnectionTimeout { .. } => "CONNECTION_TIMEOUT",
            AppError::Operation(_) => "OPERATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for this error. Client errors are 400, everything else 500.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Configuration(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this is a connection failure (timeouts included).
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            AppError::Connection(_) | AppError::ConnectionTimeout { .. }
        )
    }

    /// Reclassifies an operation failure as a connection failure.
    ///
    /// Used while a handle is being established: any failure at that stage
    /// means the handle is unusable.
    pub fn into_connection_error(self) -> Self {
        match self {
            AppError::Operation(msg) | AppError::Internal(msg) => AppError::Connection(msg),
            other => other,
        }
    }

    fn log(&self) {
        if self.status_code().is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::warn!(code = self.code(), error = %self, "request rejected");
        }
    }
}

/// Whole seconds print as `30s`, anything finer as `250ms`.
fn format_limit(limit_ms: &u64) -> String {
    if *limit_ms >= 1000 && limit_ms % 1000 == 0 {
        format!("{}s", limit_ms / 1000)
    } else {
        format!("{}ms", limit_ms)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();
        let status = self.status_code();
        (status, Json(ErrorBody::new(self.to_string()))).into_response()
    }
}

//! API response wrapper types.
//!
//! Two shapes are in use. Query-style endpoints answer with the payload
//! itself and fail with a bare [`ErrorBody`]. Command-style endpoints answer
//! with a [`StatusResponse`] in both cases.

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::AppError;

/// Bare error body: `{"error": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ErrorBody {
    /// Human-readable error message.
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Success flag with an optional error message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct StatusResponse {
    /// Whether the command succeeded.
    pub success: bool,

    /// Error message (present on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusResponse {
    /// `{"success": true}`.
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    /// `{"success": false, "error": "..."}`.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Renders an [`AppError`] as a failed [`StatusResponse`] instead of a bare
/// error body. The status code is still taken from the error.
#[derive(Debug)]
pub struct Enveloped(pub AppError);

impl From<AppError> for Enveloped {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for Enveloped {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        tracing::warn!(code = self.0.code(), error = %self.0, "command failed");
        (status, Json(StatusResponse::failed(self.0.to_string()))).into_response()
    }
}

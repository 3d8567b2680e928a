use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::monitor::ExportError;

/// Error response body for the operator endpoints.
#[derive(Debug, Serialize)]
pub struct OpsErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug)]
pub struct OpsError {
    status: StatusCode,
    error: String,
    details: Option<String>,
}

impl OpsError {
    pub fn new(status: StatusCode, error: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status,
            error: error.into(),
            details,
        }
    }

    pub fn bad_request(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error, Some(details.into()))
    }

    pub fn not_found(error: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, error, None)
    }

    pub fn internal(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error, Some(details.into()))
    }
}

impl From<ExportError> for OpsError {
    fn from(err: ExportError) -> Self {
        OpsError::internal("Failed to export metrics", err.to_string())
    }
}

impl IntoResponse for OpsError {
    fn into_response(self) -> Response {
        let body = OpsErrorBody {
            error: self.error,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

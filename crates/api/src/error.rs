//! Mapping of engine errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use engine::EngineError;

/// Handler error. Wraps an [`EngineError`] and renders it as JSON.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    violations: Vec<String>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            e if e.is_validation() => StatusCode::UNPROCESSABLE_ENTITY,
            e if e.is_conflict() => StatusCode::CONFLICT,
            e if e.is_not_found() => StatusCode::NOT_FOUND,
            EngineError::Directory(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }

        let violations = match &self.0 {
            EngineError::GraphValidation(report) => {
                report.violations.iter().map(ToString::to_string).collect()
            }
            _ => Vec::new(),
        };
        let body = ErrorBody {
            error: self.0.to_string(),
            violations,
        };
        (status, Json(body)).into_response()
    }
}

use std::fmt;

use axum::{Json, http::StatusCode, response::IntoResponse};
use deepresearch_core::DeepResearchError;
use serde::Serialize;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    detail: Option<String>,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let payload = ErrorResponse {
            error: self.message,
            detail: self.detail,
        };
        (self.status, Json(payload)).into_response()
    }
}

impl From<DeepResearchError> for AppError {
    fn from(error: DeepResearchError) -> Self {
        match error {
            DeepResearchError::InvalidTask(reason) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid research request").with_detail(reason)
            }
            other => Self::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {detail}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_task_maps_to_bad_request() {
        let error = AppError::from(DeepResearchError::InvalidTask("too short".into()));
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error.to_string(), "invalid research request: too short");
    }

    #[test]
    fn other_failures_map_to_internal_error() {
        let error = AppError::from(DeepResearchError::InvalidConfiguration("bad".into()));
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

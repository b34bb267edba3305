use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use sync_common::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Canvas,
    Notion,
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Service::Canvas => f.write_str("canvas"),
            Service::Notion => f.write_str("notion"),
        }
    }
}

/// Errors that stop a run (or the service) outright. Per-course and per-item failures are
/// not errors at this level; they are collected into the run report.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("{service} authentication failed: {source}")]
    Authentication {
        service: Service,
        #[source]
        source: ClientError,
    },

    #[error("canvas error: {0}")]
    Canvas(#[source] ClientError),

    #[error("notion error: {0}")]
    Notion(#[source] ClientError),

    #[error("a sync run is already in progress")]
    Busy,

    #[error("unauthorized")]
    Unauthorized,
}

impl AppError {
    /// Classify a failure from one of the remote services, separating credential problems.
    pub fn from_client(service: Service, source: ClientError) -> Self {
        if source.is_auth() {
            return AppError::Authentication { service, source };
        }
        match service {
            Service::Canvas => AppError::Canvas(source),
            Service::Notion => AppError::Notion(source),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Authentication { .. } | AppError::Canvas(_) | AppError::Notion(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Busy => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.status_code();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (code, Json(body)).into_response()
    }
}

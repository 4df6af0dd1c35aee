//! API Gateway error types.
//!
//! Every client-facing error is rendered as
//!
//! ```json
//! {"errors": [{"id": "invalid_signature", "message": "Invalid Dgas-Signature"}]}
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use request_auth::AuthError;
use serde::Serialize;
use task_queue::TaskError;
use thiserror::Error;

/// Error ids used by the gateway itself.
pub mod ids {
    pub const BAD_ARGUMENTS: &str = "bad_arguments";
    pub const UNKNOWN_TASK: &str = "unknown_task";
    pub const TASK_FAILED: &str = "task_failed";
    pub const TASK_TIMEOUT: &str = "task_timeout";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// Client-facing message of a failed task outside debug mode.
const TASK_FAILED_MESSAGE: &str = "Task could not be completed";

/// One entry of the `errors` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    pub id: String,
    pub message: String,
}

/// Error response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub errors: Vec<ErrorEntry>,
    /// Formatted exception, only in debug mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exc_info: Option<Vec<String>>,
}

/// An error answered to the HTTP client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub id: String,
    pub message: String,
    pub exc_info: Option<Vec<String>>,
}

impl ApiError {
    pub fn new(status: StatusCode, id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            id: id.into(),
            message: message.into(),
            exc_info: None,
        }
    }

    /// 400 `bad_arguments`
    pub fn bad_arguments(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ids::BAD_ARGUMENTS, message)
    }

    /// 404 for a function that is not callable over HTTP
    pub fn unknown_task(function: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            ids::UNKNOWN_TASK,
            format!("Unknown task: {function}"),
        )
    }

    /// 504 when a task call outlives its deadline
    pub fn task_timeout(function: &str) -> Self {
        Self::new(
            StatusCode::GATEWAY_TIMEOUT,
            ids::TASK_TIMEOUT,
            format!("Task {function} did not complete in time"),
        )
    }

    /// 500
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, ids::INTERNAL_ERROR, message)
    }

    /// Attach exception details, kept only when `debug` is set.
    pub fn with_exc_info(mut self, debug: bool, lines: impl FnOnce() -> Vec<String>) -> Self {
        if debug {
            self.exc_info = Some(lines());
        }
        self
    }

    /// Map a failed task call.
    ///
    /// The remote exception only reaches the client in debug mode, as the
    /// message and the `exc_info` traceback.
    pub fn from_task_error(error: &TaskError, debug: bool) -> Self {
        match error {
            TaskError::Remote(remote) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ids::TASK_FAILED,
                if debug {
                    remote.format_exception(false)
                } else {
                    TASK_FAILED_MESSAGE.to_string()
                },
            )
            .with_exc_info(debug, || {
                remote
                    .format_exception(true)
                    .lines()
                    .map(str::to_string)
                    .collect()
            }),
            other => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ids::TASK_FAILED,
                TASK_FAILED_MESSAGE,
            )
            .with_exc_info(debug, || vec![other.to_string()]),
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            errors: vec![ErrorEntry {
                id: self.id.clone(),
                message: self.message.clone(),
            }],
            exc_info: self.exc_info.clone(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.status.as_u16(), self.id, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error.id(), error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = self.body();
        (self.status, Json(body)).into_response()
    }
}

/// Gateway lifecycle errors
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] crate::domain::config::ConfigError),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(std::io::Error),

    /// The server stopped with an error
    #[error("server error: {0}")]
    Serve(std::io::Error),
}

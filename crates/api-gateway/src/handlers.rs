//! Route handlers.

use crate::domain::error::ApiError;
use crate::extract::JsonBody;
use crate::middleware::VerifiedAddress;
use crate::router::AppState;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use request_auth::unix_now;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampResponse {
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoAmIResponse {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResultResponse {
    pub result: Value,
}

/// `GET /v1/timestamp`: the server clock, for clients to sign against.
pub async fn timestamp() -> Json<TimestampResponse> {
    Json(TimestampResponse {
        timestamp: unix_now(),
    })
}

/// `GET /v1/whoami`: the address that signed the request.
pub async fn whoami(Extension(VerifiedAddress(address)): Extension<VerifiedAddress>) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse {
        address: address.to_string(),
    })
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `POST /v1/tasks/{function}`: call an allow-listed task and wait for it.
///
/// Body: `{"args": [...]}`, `args` optional.
pub async fn call_task(
    State(state): State<AppState>,
    Path(function): Path<String>,
    Extension(VerifiedAddress(caller)): Extension<VerifiedAddress>,
    body: JsonBody,
) -> Result<Json<TaskResultResponse>, ApiError> {
    if !state.config.is_callable(&function) {
        debug!(function = %function, caller = %caller, "Task not callable over HTTP");
        return Err(ApiError::unknown_task(&function));
    }

    let args: Vec<Value> = body.get_or("args", Vec::new())?;
    let mut handle = state.dispatcher.call_task(&function, args);
    debug!(function = %function, caller = %caller, task_id = %handle.task_id(), "Task called over HTTP");

    match tokio::time::timeout(state.config.task_timeout(), &mut handle).await {
        Ok(Ok(result)) => Ok(Json(TaskResultResponse { result })),
        Ok(Err(e)) => {
            warn!(function = %function, task_id = %handle.task_id(), error = %e, "Task call failed");
            Err(ApiError::from_task_error(&e, state.config.debug))
        }
        Err(_) => {
            handle.cancel();
            warn!(function = %function, task_id = %handle.task_id(), "Task call timed out");
            Err(ApiError::task_timeout(&function))
        }
    }
}

//! Built-in task handlers.

use request_auth::unix_now;
use std::sync::Arc;
use task_queue::{TaskContext, TaskFailure, TaskHandler, TaskRoute};
use tracing::debug;

/// `ping` and `server_time`, so a fresh deployment can exercise the queue.
pub struct SystemTaskHandler {
    ctx: TaskContext,
}

impl TaskHandler for SystemTaskHandler {
    type Options = ();

    fn new(ctx: TaskContext, _options: &()) -> Self {
        Self { ctx }
    }

    fn routes() -> Vec<TaskRoute<Self>> {
        vec![
            TaskRoute::new("ping", |handler: Arc<Self>, _args| async move {
                debug!(task_id = %handler.ctx.task_id(), "ping");
                Ok::<_, TaskFailure>("pong")
            }),
            TaskRoute::new("server_time", |_handler: Arc<Self>, _args| async move {
                Ok::<_, TaskFailure>(unix_now())
            }),
        ]
    }
}

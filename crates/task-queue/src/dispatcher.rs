//! # Task Dispatcher
//!
//! Caller side of the queue: publishes `call` envelopes and hands back a
//! [`TaskHandle`] that resolves when the matching `result` or `exception`
//! comes back on the channel.
//!
//! The dispatcher never reads the channel itself. Outcomes reach its pending
//! table through a [`TaskListener`](crate::listener::TaskListener) sharing
//! the same dispatcher, so a process that calls tasks must run a listener.

use crate::correlation::TaskId;
use crate::envelope::{TaskEnvelope, TaskMessage};
use crate::errors::{RemoteTaskError, TaskError};
use crate::pending::{PendingTaskTable, TaskOutcome};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared_bus::{BusError, PubSubConnection};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Publishes task calls and correlates their outcomes.
///
/// Cheap to clone; clones share the connection and the pending table.
#[derive(Clone)]
pub struct TaskDispatcher {
    connection: Arc<dyn PubSubConnection>,
    channel: Arc<str>,
    pending: Arc<PendingTaskTable>,
}

impl TaskDispatcher {
    /// Create a dispatcher publishing on `channel`.
    pub fn new(connection: Arc<dyn PubSubConnection>, channel: impl Into<String>) -> Self {
        Self {
            connection,
            channel: Arc::from(channel.into()),
            pending: Arc::new(PendingTaskTable::new()),
        }
    }

    /// The channel calls are published on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// The shared connection.
    pub fn connection(&self) -> &Arc<dyn PubSubConnection> {
        &self.connection
    }

    /// The pending table.
    pub fn pending(&self) -> &Arc<PendingTaskTable> {
        &self.pending
    }

    /// Call `function` with positional `args`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn call_task(&self, function: &str, args: Vec<Value>) -> TaskHandle {
        self.call_task_delayed(function, args, None)
    }

    /// Call `function`, publishing after `delay` if given.
    ///
    /// The call is registered before publication is scheduled, so a fast
    /// outcome can never arrive ahead of its pending entry.
    pub fn call_task_delayed(
        &self,
        function: &str,
        args: Vec<Value>,
        delay: Option<Duration>,
    ) -> TaskHandle {
        let task_id = TaskId::new();
        let receiver = self.pending.register(task_id.clone(), function);
        let envelope = TaskEnvelope::call(task_id.clone(), function, args);

        let dispatcher = self.clone();
        let publisher = tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let result = match envelope.encode() {
                Ok(payload) => dispatcher.publish(payload).await.map_err(TaskError::from),
                Err(e) => Err(TaskError::from(e)),
            };

            if let Err(e) = result {
                warn!(task_id = %envelope.task_id, error = %e, "Failed to publish task call");
                dispatcher.pending.resolve(&envelope.task_id, Err(e));
            }
        });

        TaskHandle {
            task_id,
            receiver,
            publisher: Some(publisher),
            pending: Arc::clone(&self.pending),
        }
    }

    /// Publish a raw payload on the task channel.
    pub async fn publish(&self, payload: Bytes) -> Result<usize, BusError> {
        self.connection.publish(&self.channel, payload).await
    }

    /// Route a `result` or `exception` envelope to its waiting caller.
    ///
    /// Returns false for calls, unknown task IDs and outcomes that already
    /// arrived.
    pub fn handle_response(&self, envelope: TaskEnvelope) -> bool {
        let outcome: TaskOutcome = match envelope.message {
            TaskMessage::Result { value } => Ok(value.unwrap_or(Value::Null)),
            TaskMessage::Exception {
                type_name,
                message,
                traceback,
            } => Err(TaskError::Remote(RemoteTaskError {
                exc_type_name: type_name,
                exc_message: message,
                formatted_traceback: traceback,
            })),
            TaskMessage::Call { .. } => return false,
        };

        self.pending.resolve(&envelope.task_id, outcome)
    }
}

/// A call in flight. Await it for the outcome.
///
/// Dropping the handle abandons the call; the pending entry is removed but a
/// call that was already published still runs remotely.
pub struct TaskHandle {
    task_id: TaskId,
    receiver: oneshot::Receiver<TaskOutcome>,
    publisher: Option<JoinHandle<()>>,
    pending: Arc<PendingTaskTable>,
}

impl TaskHandle {
    /// The call's task ID.
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Cancel the call.
    ///
    /// Aborts publication if it has not happened yet and removes the pending
    /// entry, so awaiting the handle yields [`TaskError::Cancelled`]. A call
    /// already published is not retracted.
    pub fn cancel(&mut self) -> bool {
        if let Some(publisher) = self.publisher.take() {
            publisher.abort();
        }
        let was_pending = self.pending.cancel(&self.task_id);
        if was_pending {
            debug!(task_id = %self.task_id, "Task cancelled by caller");
        }
        was_pending
    }

    /// Await the outcome and deserialize the value into `T`.
    pub async fn into_result<T: DeserializeOwned>(self) -> Result<T, TaskError> {
        let value = self.await?;
        serde_json::from_value(value).map_err(|e| TaskError::Decode(e.to_string()))
    }
}

impl Future for TaskHandle {
    type Output = Result<Value, TaskError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(TaskError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.pending.cancel(&self.task_id);
    }
}

//! Task queue error types.

use crate::correlation::TaskId;
use shared_bus::BusError;
use thiserror::Error;

/// Errors encoding or decoding a task envelope.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The payload is not a serialized array.
    #[error("cannot decode envelope: {0}")]
    Decode(String),

    /// The array is missing required elements or they have the wrong type.
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// The action is not `call`, `result` or `exception`.
    #[error("unknown action {action:?} for task {task_id}")]
    UnknownAction { task_id: TaskId, action: String },

    /// The envelope could not be serialized.
    #[error("cannot encode envelope: {0}")]
    Encode(String),
}

/// An exception raised by a remote task handler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{exc_type_name}: {exc_message}")]
pub struct RemoteTaskError {
    /// Type name of the remote failure.
    pub exc_type_name: String,
    /// Failure message.
    pub exc_message: String,
    /// Formatted remote trace.
    pub formatted_traceback: String,
}

impl RemoteTaskError {
    /// `"{type}: {message}"`, followed by the traceback on a new line when
    /// `with_traceback` is set.
    pub fn format_exception(&self, with_traceback: bool) -> String {
        if with_traceback {
            format!(
                "{}: {}\n{}",
                self.exc_type_name, self.exc_message, self.formatted_traceback
            )
        } else {
            format!("{}: {}", self.exc_type_name, self.exc_message)
        }
    }
}

/// Why awaiting a task did not produce a value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    /// The handler failed.
    #[error("remote task failed: {0}")]
    Remote(#[from] RemoteTaskError),

    /// The call was cancelled locally.
    #[error("task cancelled")]
    Cancelled,

    /// The call could not be published.
    #[error("cannot publish task: {0}")]
    Publish(#[from] BusError),

    /// The call could not be encoded.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// The result did not deserialize into the requested type.
    #[error("cannot decode task result: {0}")]
    Decode(String),
}

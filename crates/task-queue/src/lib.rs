//! # Task Queue - RPC over a shared pub/sub channel
//!
//! Callers publish `call` envelopes and await a correlated `result` or
//! `exception`; listeners run registered handlers and publish the outcome
//! back on the same channel.
//!
//! ```text
//!  caller process                             worker process
//! ┌────────────────┐   [id, "call", f, ..]   ┌──────────────────┐
//! │ TaskDispatcher │ ──────────────────────→ │   TaskListener   │
//! │  pending table │                         │  HandlerRegistry │
//! │       ↑        │   [id, "result", v]     │        │         │
//! │  TaskListener  │ ←────────────────────── │   handler task   │
//! └────────────────┘                         └──────────────────┘
//! ```
//!
//! Every subscriber sees every message. A process that calls tasks must run
//! a [`TaskListener`] too: its dispatch loop is what hands outcomes to the
//! dispatcher's pending table. Outcomes for unknown task IDs are ignored.
//!
//! ## Usage
//!
//! ```ignore
//! let listener = TaskListener::new(connection, &TaskQueueConfig::default());
//! listener.add_task_handler::<MathHandler>(());
//! listener.start().await;
//!
//! let sum: i64 = listener.call_task("add", vec![json!(1), json!(2)]).into_result().await?;
//!
//! listener.stop(true).await;
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod correlation;
pub mod dispatcher;
pub mod envelope;
pub mod errors;
pub mod handler;
pub mod listener;
pub mod pending;

pub use config::{TaskQueueConfig, DEFAULT_CHANNEL};
pub use correlation::TaskId;
pub use dispatcher::{TaskDispatcher, TaskHandle};
pub use envelope::{TaskEnvelope, TaskMessage, ACTION_CALL, ACTION_EXCEPTION, ACTION_RESULT};
pub use errors::{EnvelopeError, RemoteTaskError, TaskError};
pub use handler::{
    HandlerRegistry, TaskArgs, TaskContext, TaskFailure, TaskFuture, TaskHandler, TaskRoute,
    PANIC_TYPE_NAME, TYPE_ERROR,
};
pub use listener::{ListenerState, TaskListener, RETRY_BACKOFF};
pub use pending::{PendingStats, PendingTaskTable, TaskOutcome};

//! Pending Task Table - the caller-side half of call/result correlation.
//!
//! Maps task IDs to callers waiting for a `result` or `exception`.

use crate::correlation::TaskId;
use crate::errors::TaskError;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::debug;

/// Outcome delivered to a waiting caller.
pub type TaskOutcome = Result<Value, TaskError>;

/// A call waiting for its outcome
struct PendingTask {
    /// Channel to send the outcome
    sender: oneshot::Sender<TaskOutcome>,
    /// When the call was registered
    created_at: Instant,
    /// Function name (for logging)
    function: String,
}

/// Statistics for the pending table
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total calls registered
    pub total_registered: AtomicU64,
    /// Total calls resolved with a result or exception
    pub total_completed: AtomicU64,
    /// Total calls cancelled or abandoned by their caller
    pub total_cancelled: AtomicU64,
}

/// Pending-task table.
///
/// Flow:
/// 1. Dispatcher generates a TaskId
/// 2. Dispatcher calls `register()` BEFORE publishing the call
/// 3. The listener's dispatch loop sees the `result`/`exception` and calls `resolve()`
/// 4. The caller's handle receives the outcome
///
/// Resolution is first-write-wins: the entry is removed on the first
/// `resolve()`, so duplicate deliveries find nothing and are ignored.
/// There are no timeouts; callers race the handle against their own timer
/// and cancel it.
#[derive(Default)]
pub struct PendingTaskTable {
    /// Map of task ID to waiting caller
    pending: DashMap<TaskId, PendingTask>,
    /// Statistics
    stats: PendingStats,
}

impl PendingTaskTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call and get a receiver for its outcome.
    pub fn register(&self, task_id: TaskId, function: &str) -> oneshot::Receiver<TaskOutcome> {
        let (tx, rx) = oneshot::channel();

        debug!(task_id = %task_id, function, "Registered pending task");

        self.pending.insert(
            task_id,
            PendingTask {
                sender: tx,
                created_at: Instant::now(),
                function: function.to_string(),
            },
        );
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);

        rx
    }

    /// Deliver an outcome.
    ///
    /// Returns true if the task was pending and its caller received the
    /// outcome, false if unknown, already resolved or abandoned.
    pub fn resolve(&self, task_id: &TaskId, outcome: TaskOutcome) -> bool {
        let Some((_, pending)) = self.pending.remove(task_id) else {
            debug!(task_id = %task_id, "Outcome for unknown or already resolved task");
            return false;
        };

        let elapsed = pending.created_at.elapsed();
        match pending.sender.send(outcome) {
            Ok(()) => {
                self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    task_id = %task_id,
                    function = %pending.function,
                    elapsed_ms = elapsed.as_millis(),
                    "Resolved pending task"
                );
                true
            }
            Err(_) => {
                // Receiver was dropped (caller gave up)
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(
                    task_id = %task_id,
                    function = %pending.function,
                    "Pending task receiver dropped"
                );
                false
            }
        }
    }

    /// Get number of currently pending tasks
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Get statistics
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }

    /// Check if a task is pending
    pub fn is_pending(&self, task_id: &TaskId) -> bool {
        self.pending.contains_key(task_id)
    }

    /// Cancel a pending task. Its receiver then yields an error.
    pub fn cancel(&self, task_id: &TaskId) -> bool {
        if self.pending.remove(task_id).is_some() {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }
}

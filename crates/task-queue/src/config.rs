//! Task queue configuration.

use serde::{Deserialize, Serialize};

/// Channel used when none is configured.
pub const DEFAULT_CHANNEL: &str = "task-queue";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskQueueConfig {
    /// Pub/sub channel carrying calls and their outcomes.
    pub channel: String,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
        }
    }
}

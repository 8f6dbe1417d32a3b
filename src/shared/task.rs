//! Task State Types
//!
//! Defines the client-side view of a single board task. Task state is owned
//! exclusively by the `OptimisticStateStore`; consumers (view layer,
//! reconciler) look a task up by id and receive a clone, never a reference
//! into the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Board column a task can occupy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Backlog column
    Todo,
    /// In-progress column
    Doing,
    /// Review column
    Review,
    /// Completed column
    Done,
}

impl TaskStatus {
    /// Stable string form used for column ids and wire payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::Doing => "doing",
            TaskStatus::Review => "review",
            TaskStatus::Done => "done",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-side state of one task
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TaskState {
    /// Task id
    pub id: Uuid,
    /// Current (possibly optimistic) column
    pub status: TaskStatus,
    /// Ordinal within the current column
    pub position: u32,
    /// Column key as reported by the server
    pub column_id: String,
    /// Whether an unconfirmed local change is applied to this task
    pub pending: bool,
    /// Last server-confirmed status, the rollback target of record
    pub previous_status: TaskStatus,
}

impl TaskState {
    /// Create a task in a confirmed (non-pending) state
    pub fn new(id: Uuid, status: TaskStatus, position: u32) -> Self {
        Self {
            id,
            status,
            position,
            column_id: status.as_str().to_string(),
            pending: false,
            previous_status: status,
        }
    }
}

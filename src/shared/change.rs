//! Change Descriptors
//!
//! A `Change` represents one user-intended mutation (a status move). It lives
//! in the store's pending ledger from the moment it is applied optimistically
//! until the server confirms it or it is rolled back.

use crate::shared::task::TaskStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One user-intended mutation awaiting server confirmation
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Change {
    /// Unique id of this change
    pub change_id: Uuid,
    /// Task the change applies to
    pub task_id: Uuid,
    /// Status the task held when the change was applied
    pub from_status: TaskStatus,
    /// Status the user moved the task to
    pub to_status: TaskStatus,
    /// When the change was applied locally
    pub timestamp: DateTime<Utc>,
    /// Set when the change was applied as part of a batch
    pub batch_id: Option<Uuid>,
    /// Server attempts beyond the first for this change
    pub retry_count: u32,
}

impl Change {
    /// Create a change with a fresh id and the current timestamp
    pub fn new(task_id: Uuid, from_status: TaskStatus, to_status: TaskStatus) -> Self {
        Self {
            change_id: Uuid::new_v4(),
            task_id,
            from_status,
            to_status,
            timestamp: Utc::now(),
            batch_id: None,
            retry_count: 0,
        }
    }

    /// Tag the change with a batch id
    pub fn with_batch(mut self, batch_id: Uuid) -> Self {
        self.batch_id = Some(batch_id);
        self
    }
}

/// Input descriptor for an optimistic update
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRequest {
    /// Task to move
    pub task_id: Uuid,
    /// Target column
    pub to_status: TaskStatus,
    /// Explicit change id; a fresh one is generated when absent
    pub change_id: Option<Uuid>,
}

impl ChangeRequest {
    /// Request moving a task to a new status
    pub fn new(task_id: Uuid, to_status: TaskStatus) -> Self {
        Self {
            task_id,
            to_status,
            change_id: None,
        }
    }

    /// Use an explicit change id instead of a generated one
    pub fn with_change_id(mut self, change_id: Uuid) -> Self {
        self.change_id = Some(change_id);
        self
    }
}

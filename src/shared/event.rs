//! Store Event System
//!
//! Typed events emitted by the `OptimisticStateStore` for the view layer and
//! the reconciler. Subscribers receive events through a
//! `tokio::sync::broadcast` receiver obtained from
//! `OptimisticStateStore::subscribe`; dropping the receiver unsubscribes.

use uuid::Uuid;

/// Lifecycle events emitted by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// An optimistic change was applied locally
    Change {
        /// Affected task
        task_id: Uuid,
        /// Id of the applied change
        change_id: Uuid,
    },
    /// A pending change was rolled back
    Rollback {
        /// Affected task
        task_id: Uuid,
        /// Id of the reverted change
        change_id: Uuid,
        /// False when the pre-change snapshot had been evicted and the
        /// confirmed baseline was restored instead
        exact: bool,
    },
    /// A pending change was confirmed by the server
    Confirm {
        /// Affected task
        task_id: Uuid,
        /// Id of the confirmed change
        change_id: Uuid,
    },
    /// Remote state (full sync or delta) was merged into the store
    RemoteMerge {
        /// Tasks whose state changed
        task_ids: Vec<Uuid>,
    },
    /// Batched view refresh: tasks whose visible state changed since the
    /// previous scheduler tick
    ViewRefresh {
        /// Tasks to re-render
        task_ids: Vec<Uuid>,
    },
}

impl StoreEvent {
    /// Task ids touched by this event
    pub fn task_ids(&self) -> Vec<Uuid> {
        match self {
            StoreEvent::Change { task_id, .. }
            | StoreEvent::Rollback { task_id, .. }
            | StoreEvent::Confirm { task_id, .. } => vec![*task_id],
            StoreEvent::RemoteMerge { task_ids } | StoreEvent::ViewRefresh { task_ids } => {
                task_ids.clone()
            }
        }
    }
}

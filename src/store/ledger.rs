//! Pending-Change Ledger
//!
//! The ordered set of changes applied locally but not yet confirmed or
//! rolled back. Entries keep the sequence number of the history snapshot
//! captured immediately before their change was applied; rollback uses it to
//! restore exactly the pre-change state. Confirmed changes are removed, so
//! the ledger never contains a change that cannot be rolled back.

use crate::shared::change::Change;
use uuid::Uuid;

/// A pending change plus the snapshot it can be rolled back to
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    /// The pending change
    pub change: Change,
    /// Sequence of the snapshot taken right before the change was applied
    pub snapshot_seq: u64,
}

/// Pending changes in application order
#[derive(Debug, Default)]
pub struct PendingLedger {
    entries: Vec<LedgerEntry>,
}

impl PendingLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a change in application order
    pub fn push(&mut self, change: Change, snapshot_seq: u64) {
        self.entries.push(LedgerEntry {
            change,
            snapshot_seq,
        });
    }

    /// Remove and return the entry for a change id
    pub fn remove(&mut self, change_id: Uuid) -> Option<LedgerEntry> {
        let index = self
            .entries
            .iter()
            .position(|e| e.change.change_id == change_id)?;
        Some(self.entries.remove(index))
    }

    /// Look up the entry for a change id
    pub fn get(&self, change_id: Uuid) -> Option<&LedgerEntry> {
        self.entries
            .iter()
            .find(|e| e.change.change_id == change_id)
    }

    /// Whether a change id is pending
    pub fn contains(&self, change_id: Uuid) -> bool {
        self.get(change_id).is_some()
    }

    /// Whether any pending change targets the task
    pub fn has_pending(&self, task_id: Uuid) -> bool {
        self.entries.iter().any(|e| e.change.task_id == task_id)
    }

    /// Change ids sharing a batch id, in application order
    pub fn batch(&self, batch_id: Uuid) -> Vec<Uuid> {
        self.entries
            .iter()
            .filter(|e| e.change.batch_id == Some(batch_id))
            .map(|e| e.change.change_id)
            .collect()
    }

    /// Pending changes in application order
    pub fn changes(&self) -> Vec<Change> {
        self.entries.iter().map(|e| e.change.clone()).collect()
    }

    /// Pending changes targeting one task, in application order
    pub fn changes_for_task(&self, task_id: Uuid) -> Vec<Change> {
        self.entries
            .iter()
            .filter(|e| e.change.task_id == task_id)
            .map(|e| e.change.clone())
            .collect()
    }

    /// Number of pending changes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

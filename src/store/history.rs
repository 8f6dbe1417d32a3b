//! Snapshot History Ring Buffer
//!
//! Keeps a bounded history of full task-map snapshots, one taken before
//! every optimistic mutation. Each snapshot carries a monotonically
//! increasing sequence number so a rollback can ask for exactly the snapshot
//! captured before its change, not merely the most recent one. When the
//! buffer is full the oldest snapshot is evicted first.

use crate::shared::task::TaskState;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// One saved copy of the task map
#[derive(Debug, Clone)]
pub struct HistorySnapshot {
    /// Monotonic sequence number
    pub seq: u64,
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
    /// Full task map at that moment
    pub tasks: HashMap<Uuid, TaskState>,
}

/// Bounded ring buffer of snapshots, oldest evicted first
#[derive(Debug)]
pub struct HistoryBuffer {
    entries: VecDeque<HistorySnapshot>,
    capacity: usize,
    next_seq: u64,
}

impl HistoryBuffer {
    /// Create a buffer holding at most `capacity` snapshots
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            next_seq: 0,
        }
    }

    /// Record a snapshot of the given task map, returning its sequence number
    pub fn push(&mut self, tasks: &HashMap<Uuid, TaskState>) -> u64 {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_back(HistorySnapshot {
            seq,
            timestamp: Utc::now(),
            tasks: tasks.clone(),
        });
        seq
    }

    /// Look up a snapshot by sequence number; `None` if it was evicted
    pub fn get(&self, seq: u64) -> Option<&HistorySnapshot> {
        let front = self.entries.front()?.seq;
        if seq < front {
            return None;
        }
        self.entries.get((seq - front) as usize)
    }

    /// Number of retained snapshots
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sequence number of the oldest retained snapshot
    pub fn oldest_seq(&self) -> Option<u64> {
        self.entries.front().map(|s| s.seq)
    }
}

//! # Optimistic State Store
//!
//! Holds the client's working view of task state, a bounded history of prior
//! snapshots, and the ledger of changes not yet confirmed by the server.
//!
//! ## Features
//!
//! - **Immediate Updates**: mutations apply synchronously, before any server
//!   round trip
//! - **Exact Rollback**: every pending change can be reverted to the snapshot
//!   taken right before it was applied
//! - **Confirmation**: server acknowledgements clear the pending ledger
//! - **Local-Wins Merging**: server pushes never clobber a pending local change
//!
//! ## Usage
//!
//! ```rust,no_run
//! use xfboard::shared::{ChangeRequest, StoreConfig, TaskStatus};
//! use xfboard::store::OptimisticStateStore;
//!
//! # async fn example() {
//! let store = OptimisticStateStore::new(StoreConfig::default());
//! let _events = store.subscribe();
//!
//! let task_id = uuid::Uuid::new_v4();
//! let change = store
//!     .apply_optimistic_update(ChangeRequest::new(task_id, TaskStatus::Doing))
//!     .await;
//!
//! // ... later, once the server acknowledged the mutation:
//! store.confirm_change(change.change_id).await;
//! # }
//! ```

pub mod history;
pub mod ledger;
pub mod scheduler;

pub use history::{HistoryBuffer, HistorySnapshot};
pub use ledger::{LedgerEntry, PendingLedger};
pub use scheduler::{ManualScheduler, TickScheduler, TokioScheduler};

use crate::shared::change::{Change, ChangeRequest};
use crate::shared::config::StoreConfig;
use crate::shared::error::StoreError;
use crate::shared::event::StoreEvent;
use crate::shared::protocol::RemoteTask;
use crate::shared::task::TaskState;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// How a rollback was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// The pre-change snapshot was found and restored exactly
    Exact,
    /// The snapshot had been evicted from the ring buffer; the task was
    /// reset to its confirmed baseline instead
    BestEffort,
}

/// Store size counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Tasks currently tracked
    pub tracked_tasks: usize,
    /// Changes in the pending ledger
    pub pending_changes: usize,
    /// Snapshots retained in the history buffer
    pub history_depth: usize,
}

#[derive(Debug)]
struct StoreInner {
    /// Working view, optimistic changes included
    tasks: HashMap<Uuid, TaskState>,
    /// Last server-confirmed state per task
    confirmed: HashMap<Uuid, TaskState>,
    history: HistoryBuffer,
    ledger: PendingLedger,
}

#[derive(Default)]
struct RefreshState {
    dirty: Vec<Uuid>,
    scheduled: bool,
}

/// The client's working view of task state
pub struct OptimisticStateStore {
    inner: RwLock<StoreInner>,
    refresh: Arc<Mutex<RefreshState>>,
    events: broadcast::Sender<StoreEvent>,
    scheduler: Arc<dyn TickScheduler>,
    config: StoreConfig,
}

impl OptimisticStateStore {
    /// Create a store that batches view refreshes onto the Tokio runtime
    pub fn new(config: StoreConfig) -> Self {
        Self::with_scheduler(config, Arc::new(TokioScheduler))
    }

    /// Create a store with an explicit tick source (tests use
    /// [`ManualScheduler`])
    pub fn with_scheduler(config: StoreConfig, scheduler: Arc<dyn TickScheduler>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: RwLock::new(StoreInner {
                tasks: HashMap::new(),
                confirmed: HashMap::new(),
                history: HistoryBuffer::new(config.history_capacity),
                ledger: PendingLedger::new(),
            }),
            refresh: Arc::new(Mutex::new(RefreshState::default())),
            events,
            scheduler,
            config,
        }
    }

    /// Subscribe to store events; dropping the receiver unsubscribes
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Current state of one task
    pub async fn task(&self, task_id: Uuid) -> Option<TaskState> {
        self.inner.read().await.tasks.get(&task_id).cloned()
    }

    /// Every tracked task
    pub async fn tasks(&self) -> Vec<TaskState> {
        self.inner.read().await.tasks.values().cloned().collect()
    }

    /// Pending changes in application order
    pub async fn pending_changes(&self) -> Vec<Change> {
        self.inner.read().await.ledger.changes()
    }

    /// Whether a change is still unconfirmed
    pub async fn is_pending(&self, change_id: Uuid) -> bool {
        self.inner.read().await.ledger.contains(change_id)
    }

    /// Size counters
    pub async fn stats(&self) -> StoreStats {
        let inner = self.inner.read().await;
        StoreStats {
            tracked_tasks: inner.tasks.len(),
            pending_changes: inner.ledger.len(),
            history_depth: inner.history.len(),
        }
    }

    /// Apply one user-intended mutation immediately.
    ///
    /// Pushes a history snapshot, mutates the task in place (creating it for
    /// a local optimistic insert), appends the change to the pending ledger
    /// and schedules a batched view refresh. The whole mutation happens in a
    /// single critical section; exceeding the configured latency budget is
    /// logged, never silent.
    pub async fn apply_optimistic_update(&self, request: ChangeRequest) -> Change {
        let started = Instant::now();
        let change = {
            let mut guard = self.inner.write().await;
            let inner = &mut *guard;
            let seq = inner.history.push(&inner.tasks);
            Self::apply_locked(inner, &request, seq, None)
        };
        let _ = self.events.send(StoreEvent::Change {
            task_id: change.task_id,
            change_id: change.change_id,
        });
        self.mark_dirty(&[change.task_id]);
        self.check_budget(started, "apply_optimistic_update");
        change
    }

    /// Apply several changes under one batch id, snapshotting state once.
    ///
    /// Each change is still confirmed or rolled back individually; only
    /// [`confirm_batch`](Self::confirm_batch) and
    /// [`rollback_batch`](Self::rollback_batch) operate on the group.
    pub async fn apply_batch_update(&self, requests: Vec<ChangeRequest>) -> Vec<Change> {
        if requests.is_empty() {
            return Vec::new();
        }
        let started = Instant::now();
        let batch_id = Uuid::new_v4();
        let changes = {
            let mut guard = self.inner.write().await;
            let inner = &mut *guard;
            let seq = inner.history.push(&inner.tasks);
            requests
                .iter()
                .map(|request| Self::apply_locked(inner, request, seq, Some(batch_id)))
                .collect::<Vec<_>>()
        };
        let mut task_ids = Vec::new();
        for change in &changes {
            let _ = self.events.send(StoreEvent::Change {
                task_id: change.task_id,
                change_id: change.change_id,
            });
            task_ids.push(change.task_id);
        }
        self.mark_dirty(&task_ids);
        self.check_budget(started, "apply_batch_update");
        changes
    }

    /// Revert a pending change to the snapshot taken right before it.
    ///
    /// If the ring buffer has already evicted that snapshot the task is reset
    /// to its confirmed baseline instead and the degradation is reported as
    /// [`RollbackOutcome::BestEffort`]. Confirmed changes are never in the
    /// ledger, so rolling one back yields [`StoreError::UnknownChange`].
    pub async fn rollback(&self, change_id: Uuid) -> Result<RollbackOutcome, StoreError> {
        let (change, outcome) = {
            let mut guard = self.inner.write().await;
            Self::rollback_locked(&mut guard, change_id)?
        };
        let _ = self.events.send(StoreEvent::Rollback {
            task_id: change.task_id,
            change_id,
            exact: outcome == RollbackOutcome::Exact,
        });
        self.mark_dirty(&[change.task_id]);
        Ok(outcome)
    }

    /// Roll back every pending change of a batch, newest first, so no
    /// intermediate combination is ever observable
    pub async fn rollback_batch(
        &self,
        batch_id: Uuid,
    ) -> Result<Vec<(Uuid, RollbackOutcome)>, StoreError> {
        let rolled_back = {
            let mut guard = self.inner.write().await;
            let change_ids = guard.ledger.batch(batch_id);
            if change_ids.is_empty() {
                return Err(StoreError::UnknownBatch(batch_id));
            }
            let mut rolled_back = Vec::with_capacity(change_ids.len());
            for change_id in change_ids.into_iter().rev() {
                let (change, outcome) = Self::rollback_locked(&mut guard, change_id)?;
                rolled_back.push((change, outcome));
            }
            rolled_back
        };
        let mut results = Vec::with_capacity(rolled_back.len());
        let mut task_ids = Vec::new();
        for (change, outcome) in rolled_back {
            let _ = self.events.send(StoreEvent::Rollback {
                task_id: change.task_id,
                change_id: change.change_id,
                exact: outcome == RollbackOutcome::Exact,
            });
            task_ids.push(change.task_id);
            results.push((change.change_id, outcome));
        }
        self.mark_dirty(&task_ids);
        Ok(results)
    }

    /// Mark a pending change as server-confirmed.
    ///
    /// Returns `false` (and emits nothing) when the change id is unknown or
    /// already confirmed, so repeated confirmation is a no-op.
    pub async fn confirm_change(&self, change_id: Uuid) -> bool {
        let confirmed = {
            let mut guard = self.inner.write().await;
            Self::confirm_locked(&mut guard, change_id)
        };
        match confirmed {
            Some(change) => {
                let _ = self.events.send(StoreEvent::Confirm {
                    task_id: change.task_id,
                    change_id,
                });
                self.mark_dirty(&[change.task_id]);
                true
            }
            None => false,
        }
    }

    /// Confirm every pending change of a batch, returning how many were
    /// still pending
    pub async fn confirm_batch(&self, batch_id: Uuid) -> usize {
        let confirmed = {
            let mut guard = self.inner.write().await;
            let change_ids = guard.ledger.batch(batch_id);
            change_ids
                .into_iter()
                .filter_map(|change_id| Self::confirm_locked(&mut guard, change_id))
                .collect::<Vec<_>>()
        };
        let mut task_ids = Vec::new();
        for change in &confirmed {
            let _ = self.events.send(StoreEvent::Confirm {
                task_id: change.task_id,
                change_id: change.change_id,
            });
            task_ids.push(change.task_id);
        }
        self.mark_dirty(&task_ids);
        confirmed.len()
    }

    /// Replace all non-pending local state with an authoritative snapshot.
    ///
    /// Tasks with a pending local change keep their local value until the
    /// change resolves; tasks absent from the snapshot are dropped unless
    /// pending. Returns the ids whose state changed.
    pub async fn sync_all(&self, remote_tasks: Vec<RemoteTask>) -> Vec<Uuid> {
        let merged = {
            let mut guard = self.inner.write().await;
            let inner = &mut *guard;
            let incoming: HashSet<Uuid> = remote_tasks.iter().map(|t| t.id).collect();
            let stale: Vec<Uuid> = inner
                .tasks
                .keys()
                .filter(|id| !incoming.contains(*id) && !inner.ledger.has_pending(**id))
                .copied()
                .collect();
            let mut merged = Vec::new();
            for id in stale {
                inner.tasks.remove(&id);
                inner.confirmed.remove(&id);
                merged.push(id);
            }
            for remote in remote_tasks {
                if inner.ledger.has_pending(remote.id) {
                    debug!(task_id = %remote.id, "full sync: keeping pending local value");
                    continue;
                }
                let state = Self::task_from_remote(&remote);
                let changed = inner.tasks.get(&remote.id) != Some(&state);
                inner.confirmed.insert(remote.id, state.clone());
                inner.tasks.insert(remote.id, state);
                if changed {
                    merged.push(remote.id);
                }
            }
            merged
        };
        if !merged.is_empty() {
            let _ = self.events.send(StoreEvent::RemoteMerge {
                task_ids: merged.clone(),
            });
            self.mark_dirty(&merged);
        }
        merged
    }

    /// Merge one server-pushed task, unless a pending local change wins.
    /// Returns whether the push was applied.
    pub async fn apply_remote(&self, remote: RemoteTask) -> bool {
        let applied = {
            let mut guard = self.inner.write().await;
            let inner = &mut *guard;
            if inner.ledger.has_pending(remote.id) {
                debug!(task_id = %remote.id, "remote update suppressed by pending local change");
                false
            } else {
                let state = Self::task_from_remote(&remote);
                inner.confirmed.insert(remote.id, state.clone());
                inner.tasks.insert(remote.id, state);
                true
            }
        };
        if applied {
            let _ = self.events.send(StoreEvent::RemoteMerge {
                task_ids: vec![remote.id],
            });
            self.mark_dirty(&[remote.id]);
        }
        applied
    }

    /// Drop a server-deleted task, unless a pending local change wins.
    /// Returns whether anything was removed.
    pub async fn remove_remote(&self, task_id: Uuid) -> bool {
        let removed = {
            let mut guard = self.inner.write().await;
            let inner = &mut *guard;
            if inner.ledger.has_pending(task_id) {
                debug!(task_id = %task_id, "remote delete suppressed by pending local change");
                false
            } else {
                inner.confirmed.remove(&task_id);
                inner.tasks.remove(&task_id).is_some()
            }
        };
        if removed {
            let _ = self.events.send(StoreEvent::RemoteMerge {
                task_ids: vec![task_id],
            });
            self.mark_dirty(&[task_id]);
        }
        removed
    }

    /// Resolve pending changes older than `max_age` by rolling them back,
    /// newest first. A stuck change is resolved, never abandoned, so no task
    /// stays marked pending indefinitely. Returns the resolved change ids.
    pub async fn resolve_stale_pending(&self, max_age: chrono::Duration) -> Vec<Uuid> {
        let cutoff = chrono::Utc::now() - max_age;
        let stale: Vec<Uuid> = {
            let guard = self.inner.read().await;
            guard
                .ledger
                .changes()
                .iter()
                .filter(|change| change.timestamp < cutoff)
                .map(|change| change.change_id)
                .collect()
        };
        let mut resolved = Vec::new();
        for change_id in stale.into_iter().rev() {
            if self.rollback(change_id).await.is_ok() {
                warn!(change_id = %change_id, "rolled back stale pending change");
                resolved.push(change_id);
            }
        }
        resolved
    }

    fn apply_locked(
        inner: &mut StoreInner,
        request: &ChangeRequest,
        snapshot_seq: u64,
        batch_id: Option<Uuid>,
    ) -> Change {
        let target_position = inner
            .tasks
            .values()
            .filter(|t| t.status == request.to_status && t.id != request.task_id)
            .count() as u32;
        let from_status = match inner.tasks.get_mut(&request.task_id) {
            Some(task) => {
                let from = task.status;
                task.status = request.to_status;
                task.column_id = request.to_status.as_str().to_string();
                task.position = target_position;
                task.pending = true;
                from
            }
            None => {
                // local optimistic insert: the task exists only client-side
                // until the server confirms it
                let mut task = TaskState::new(request.task_id, request.to_status, target_position);
                task.pending = true;
                inner.tasks.insert(request.task_id, task);
                request.to_status
            }
        };
        let mut change = Change::new(request.task_id, from_status, request.to_status);
        if let Some(change_id) = request.change_id {
            change.change_id = change_id;
        }
        if let Some(batch_id) = batch_id {
            change.batch_id = Some(batch_id);
        }
        inner.ledger.push(change.clone(), snapshot_seq);
        change
    }

    fn rollback_locked(
        inner: &mut StoreInner,
        change_id: Uuid,
    ) -> Result<(Change, RollbackOutcome), StoreError> {
        let entry = inner
            .ledger
            .remove(change_id)
            .ok_or(StoreError::UnknownChange(change_id))?;
        let change = entry.change;
        let task_id = change.task_id;
        let still_pending = inner.ledger.has_pending(task_id);

        let previous = match inner.history.get(entry.snapshot_seq) {
            Some(snapshot) => Some((snapshot.tasks.get(&task_id).cloned(), RollbackOutcome::Exact)),
            None => None,
        };
        let (restore_target, outcome) = match previous {
            Some((target, outcome)) => (target, outcome),
            None => {
                warn!(
                    change_id = %change_id,
                    task_id = %task_id,
                    "rollback snapshot evicted, restoring confirmed baseline"
                );
                (
                    inner.confirmed.get(&task_id).cloned(),
                    RollbackOutcome::BestEffort,
                )
            }
        };
        match restore_target {
            Some(target) => {
                if let Some(task) = inner.tasks.get_mut(&task_id) {
                    task.status = target.status;
                    task.position = target.position;
                    task.column_id = target.column_id;
                    task.pending = still_pending;
                }
            }
            None => {
                // the change had created the task locally; undo the insert
                inner.tasks.remove(&task_id);
            }
        }
        Ok((change, outcome))
    }

    fn confirm_locked(inner: &mut StoreInner, change_id: Uuid) -> Option<Change> {
        let entry = inner.ledger.remove(change_id)?;
        let change = entry.change;
        let task_id = change.task_id;
        let still_pending = inner.ledger.has_pending(task_id);
        if let Some(task) = inner.tasks.get_mut(&task_id) {
            task.pending = still_pending;
            task.previous_status = change.to_status;
            let mut confirmed = task.clone();
            confirmed.pending = false;
            confirmed.status = change.to_status;
            confirmed.column_id = change.to_status.as_str().to_string();
            inner.confirmed.insert(task_id, confirmed);
        }
        Some(change)
    }

    fn task_from_remote(remote: &RemoteTask) -> TaskState {
        TaskState {
            id: remote.id,
            status: remote.status,
            position: remote.position,
            column_id: remote.column_id.clone(),
            pending: false,
            previous_status: remote.status,
        }
    }

    fn mark_dirty(&self, task_ids: &[Uuid]) {
        if task_ids.is_empty() {
            return;
        }
        let mut refresh = self.refresh.lock().unwrap();
        for task_id in task_ids {
            if !refresh.dirty.contains(task_id) {
                refresh.dirty.push(*task_id);
            }
        }
        if !refresh.scheduled {
            refresh.scheduled = true;
            let refresh_handle = Arc::clone(&self.refresh);
            let events = self.events.clone();
            self.scheduler.schedule(Box::new(move || {
                let task_ids: Vec<Uuid> = {
                    let mut refresh = refresh_handle.lock().unwrap();
                    refresh.scheduled = false;
                    refresh.dirty.drain(..).collect()
                };
                if !task_ids.is_empty() {
                    let _ = events.send(StoreEvent::ViewRefresh { task_ids });
                }
            }));
        }
    }

    fn check_budget(&self, started: Instant, operation: &str) {
        let elapsed = started.elapsed();
        if elapsed > self.config.latency_budget {
            warn!(
                operation,
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = self.config.latency_budget.as_millis() as u64,
                "optimistic mutation exceeded latency budget"
            );
        }
    }
}

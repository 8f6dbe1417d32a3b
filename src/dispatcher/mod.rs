//! # Change Dispatcher
//!
//! Serializes outbound status mutations toward the server. Requests are
//! processed from a single FIFO queue with one request in flight at a time,
//! so the server observes mutations in the order the user issued them.
//!
//! ## Features
//!
//! - **Coalescing**: identical requests inside the debounce window share one
//!   network call and one result
//! - **Retry with Backoff**: network, server and timeout failures retry with
//!   exponential backoff; client errors propagate immediately
//! - **Cancellation**: queued requests are rejected outright, in-flight ones
//!   aborted best-effort through a cancellation token
//! - **Counters**: request totals exposed for diagnostics
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use xfboard::dispatcher::{ChangeDispatcher, HttpTaskTransport};
//! use xfboard::shared::{DispatchConfig, TaskStatus};
//!
//! # async fn example() {
//! let transport = Arc::new(HttpTaskTransport::new("http://127.0.0.1:3000"));
//! let dispatcher = ChangeDispatcher::new(transport, DispatchConfig::default());
//!
//! let task_id = uuid::Uuid::new_v4();
//! match dispatcher.enqueue(task_id, TaskStatus::Doing).await {
//!     Ok(updated) => println!("server confirmed {updated:?}"),
//!     Err(err) => eprintln!("mutation failed: {err}"),
//! }
//! # }
//! ```

pub mod backoff;
pub mod transport;

pub use backoff::RetryPolicy;
pub use transport::{HttpTaskTransport, TaskTransport};

use crate::shared::config::DispatchConfig;
use crate::shared::error::SyncError;
use crate::shared::protocol::RemoteTask;
use crate::shared::task::TaskStatus;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Snapshot of the dispatcher counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatcherStats {
    /// Logical requests accepted (coalesced callers share one)
    pub total_requests: u64,
    /// Requests that resolved successfully
    pub successful_requests: u64,
    /// Requests that resolved with a terminal failure (cancellation included)
    pub failed_requests: u64,
    /// Individual retry attempts across all requests
    pub retried_requests: u64,
    /// Requests accepted but not yet started
    pub queued_requests: u64,
}

#[derive(Default)]
struct DispatchCounters {
    total: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    queued: AtomicU64,
}

struct RequestSlot {
    task_id: Uuid,
    status: TaskStatus,
    enqueued_at: tokio::time::Instant,
    waiters: Vec<oneshot::Sender<Result<RemoteTask, SyncError>>>,
    cancel: CancellationToken,
    in_flight: bool,
}

#[derive(Default)]
struct RequestTable {
    slots: HashMap<Uuid, RequestSlot>,
    dedup: HashMap<(Uuid, TaskStatus), Uuid>,
}

struct DispatchShared {
    transport: Arc<dyn TaskTransport>,
    config: DispatchConfig,
    policy: RetryPolicy,
    table: Mutex<RequestTable>,
    counters: DispatchCounters,
    queue_tx: mpsc::UnboundedSender<Uuid>,
}

/// FIFO dispatcher for server-bound status mutations.
///
/// Must be created inside a Tokio runtime; the worker task is spawned on
/// construction and aborted on drop.
pub struct ChangeDispatcher {
    shared: Arc<DispatchShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ChangeDispatcher {
    /// Create a dispatcher over the given transport
    pub fn new(transport: Arc<dyn TaskTransport>, config: DispatchConfig) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(DispatchShared {
            transport,
            policy: RetryPolicy::from_config(&config),
            config,
            table: Mutex::new(RequestTable::default()),
            counters: DispatchCounters::default(),
            queue_tx,
        });
        let worker = tokio::spawn(Self::run(Arc::clone(&shared), queue_rx));
        Self {
            shared,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Submit a status mutation and wait for its terminal result.
    ///
    /// An equivalent request (same task and status) registered within the
    /// debounce window and not yet resolved absorbs this call: no second
    /// network request is made and both callers receive the same result.
    pub async fn enqueue(&self, task_id: Uuid, status: TaskStatus) -> Result<RemoteTask, SyncError> {
        let rx = self.register(task_id, status);
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Cancelled),
        }
    }

    /// Cancel every request for a task. Queued requests are rejected with
    /// [`SyncError::Cancelled`]; an in-flight one is aborted best-effort via
    /// its cancellation token. Returns how many requests were affected.
    pub fn cancel(&self, task_id: Uuid) -> usize {
        let mut table = self.shared.table.lock().unwrap();
        let ids: Vec<Uuid> = table
            .slots
            .iter()
            .filter(|(_, slot)| slot.task_id == task_id)
            .map(|(id, _)| *id)
            .collect();
        let mut cancelled = 0;
        for id in ids {
            let in_flight = table
                .slots
                .get(&id)
                .map(|slot| slot.in_flight)
                .unwrap_or(false);
            if in_flight {
                if let Some(slot) = table.slots.get(&id) {
                    slot.cancel.cancel();
                    cancelled += 1;
                }
            } else if let Some(slot) = table.slots.remove(&id) {
                let key = (slot.task_id, slot.status);
                if table.dedup.get(&key) == Some(&id) {
                    table.dedup.remove(&key);
                }
                for waiter in slot.waiters {
                    let _ = waiter.send(Err(SyncError::Cancelled));
                }
                self.shared.counters.queued.fetch_sub(1, Ordering::Relaxed);
                self.shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Snapshot of the request counters
    pub fn stats(&self) -> DispatcherStats {
        let counters = &self.shared.counters;
        DispatcherStats {
            total_requests: counters.total.load(Ordering::Relaxed),
            successful_requests: counters.success.load(Ordering::Relaxed),
            failed_requests: counters.failed.load(Ordering::Relaxed),
            retried_requests: counters.retried.load(Ordering::Relaxed),
            queued_requests: counters.queued.load(Ordering::Relaxed),
        }
    }

    /// Stop the worker and reject every outstanding request
    pub fn shutdown(&self) {
        if let Some(handle) = self.worker.lock().unwrap().take() {
            handle.abort();
        }
        let slots: Vec<RequestSlot> = {
            let mut table = self.shared.table.lock().unwrap();
            table.dedup.clear();
            table.slots.drain().map(|(_, slot)| slot).collect()
        };
        for slot in slots {
            slot.cancel.cancel();
            for waiter in slot.waiters {
                let _ = waiter.send(Err(SyncError::Cancelled));
            }
        }
    }

    fn register(
        &self,
        task_id: Uuid,
        status: TaskStatus,
    ) -> oneshot::Receiver<Result<RemoteTask, SyncError>> {
        let (tx, rx) = oneshot::channel();
        let mut table = self.shared.table.lock().unwrap();
        let key = (task_id, status);
        if let Some(&existing) = table.dedup.get(&key) {
            if let Some(slot) = table.slots.get_mut(&existing) {
                if slot.enqueued_at.elapsed() <= self.shared.config.debounce_window {
                    debug!(%task_id, %status, "coalescing onto pending request");
                    slot.waiters.push(tx);
                    return rx;
                }
            }
        }
        let request_id = Uuid::new_v4();
        table.slots.insert(
            request_id,
            RequestSlot {
                task_id,
                status,
                enqueued_at: tokio::time::Instant::now(),
                waiters: vec![tx],
                cancel: CancellationToken::new(),
                in_flight: false,
            },
        );
        table.dedup.insert(key, request_id);
        self.shared.counters.total.fetch_add(1, Ordering::Relaxed);
        self.shared.counters.queued.fetch_add(1, Ordering::Relaxed);
        if self.shared.queue_tx.send(request_id).is_err() {
            // worker already shut down; reject instead of hanging
            if let Some(slot) = table.slots.remove(&request_id) {
                table.dedup.remove(&key);
                for waiter in slot.waiters {
                    let _ = waiter.send(Err(SyncError::Cancelled));
                }
            }
        }
        rx
    }

    async fn run(shared: Arc<DispatchShared>, mut queue_rx: mpsc::UnboundedReceiver<Uuid>) {
        while let Some(request_id) = queue_rx.recv().await {
            let Some((task_id, status, cancel)) = shared.begin(request_id) else {
                continue;
            };
            let result = Self::execute(&shared, task_id, status, &cancel).await;
            shared.finish(request_id, result);
        }
    }

    async fn execute(
        shared: &DispatchShared,
        task_id: Uuid,
        status: TaskStatus,
        cancel: &CancellationToken,
    ) -> Result<RemoteTask, SyncError> {
        let mut attempt: u32 = 0;
        loop {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                attempt_result = tokio::time::timeout(
                    shared.config.request_timeout,
                    shared.transport.update_status(task_id, status),
                ) => match attempt_result {
                    Ok(result) => result,
                    Err(_) => Err(SyncError::Timeout),
                },
            };
            match outcome {
                Ok(task) => return Ok(task),
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(err) if shared.policy.should_retry(&err, attempt) => {
                    let delay = shared.policy.delay(attempt);
                    attempt += 1;
                    shared.counters.retried.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        %task_id,
                        %status,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying status mutation"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) if err.is_retryable() => {
                    return Err(SyncError::exhausted(attempt + 1, err));
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl DispatchShared {
    fn begin(&self, request_id: Uuid) -> Option<(Uuid, TaskStatus, CancellationToken)> {
        let mut table = self.table.lock().unwrap();
        let slot = table.slots.get_mut(&request_id)?;
        slot.in_flight = true;
        self.counters.queued.fetch_sub(1, Ordering::Relaxed);
        Some((slot.task_id, slot.status, slot.cancel.clone()))
    }

    fn finish(&self, request_id: Uuid, result: Result<RemoteTask, SyncError>) {
        let slot = {
            let mut table = self.table.lock().unwrap();
            let slot = table.slots.remove(&request_id);
            if let Some(ref slot) = slot {
                let key = (slot.task_id, slot.status);
                if table.dedup.get(&key) == Some(&request_id) {
                    table.dedup.remove(&key);
                }
            }
            slot
        };
        let Some(slot) = slot else { return };
        match &result {
            Ok(_) => self.counters.success.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.counters.failed.fetch_add(1, Ordering::Relaxed),
        };
        for waiter in slot.waiters {
            let _ = waiter.send(result.clone());
        }
    }
}

impl Drop for ChangeDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

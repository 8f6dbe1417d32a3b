//! # Reconciler
//!
//! Binds the optimistic store, the change dispatcher and the realtime
//! channel together:
//!
//! - a dispatcher success confirms the corresponding change in the store
//! - a terminal dispatcher failure rolls the change back and surfaces the
//!   error for user-visible notification
//! - inbound pushes from other clients merge into the store, with pending
//!   local changes taking precedence until they resolve (local-wins)
//!
//! No path leaves a task marked pending: every submitted change eventually
//! resolves through a confirm or a rollback.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use xfboard::dispatcher::{ChangeDispatcher, HttpTaskTransport};
//! use xfboard::realtime::RealtimeChannel;
//! use xfboard::reconciler::Reconciler;
//! use xfboard::shared::{ClientConfig, TaskStatus};
//! use xfboard::store::OptimisticStateStore;
//!
//! # async fn example() {
//! let config = ClientConfig::default();
//! let store = Arc::new(OptimisticStateStore::new(config.store.clone()));
//! let transport = Arc::new(HttpTaskTransport::new(config.server_url.clone()));
//! let dispatcher = Arc::new(ChangeDispatcher::new(transport, config.dispatch.clone()));
//! let (channel, inbound) = RealtimeChannel::from_config(&config);
//!
//! let reconciler = Reconciler::new(store, dispatcher);
//! reconciler.bind_channel(inbound);
//! channel.connect();
//!
//! let task_id = uuid::Uuid::new_v4();
//! let change = reconciler.submit(task_id, TaskStatus::Doing).await;
//! println!("applied {}", change.change_id);
//! # }
//! ```

use crate::dispatcher::ChangeDispatcher;
use crate::shared::change::{Change, ChangeRequest};
use crate::shared::error::SyncError;
use crate::shared::protocol::{ServerMessage, TaskDelta};
use crate::shared::task::TaskStatus;
use crate::store::OptimisticStateStore;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Outcomes surfaced to the application (user notifications, status bar)
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcilerEvent {
    /// The server acknowledged a local change
    Confirmed {
        /// Affected task
        task_id: Uuid,
        /// The acknowledged change
        change_id: Uuid,
    },
    /// A local change failed terminally and was rolled back
    RolledBack {
        /// Affected task
        task_id: Uuid,
        /// The reverted change
        change_id: Uuid,
        /// Terminal failure, for user-visible notification
        error: SyncError,
    },
    /// Remote state was merged into the store
    RemoteApplied {
        /// Number of tasks that changed
        tasks: usize,
    },
    /// The server signalled a bulk change; a full sync should be requested
    ResyncRequired,
    /// The number of connected participants changed
    Participants {
        /// Current participant count
        count: u32,
    },
}

/// Integration logic between store, dispatcher and channel
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<OptimisticStateStore>,
    dispatcher: Arc<ChangeDispatcher>,
    events: broadcast::Sender<ReconcilerEvent>,
}

impl Reconciler {
    /// Create a reconciler over an existing store and dispatcher
    pub fn new(store: Arc<OptimisticStateStore>, dispatcher: Arc<ChangeDispatcher>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            store,
            dispatcher,
            events,
        }
    }

    /// Subscribe to reconciliation outcomes; dropping the receiver
    /// unsubscribes
    pub fn subscribe(&self) -> broadcast::Receiver<ReconcilerEvent> {
        self.events.subscribe()
    }

    /// Apply a status move optimistically and drive it to a server-confirmed
    /// or rolled-back end state in the background
    pub async fn submit(&self, task_id: Uuid, to_status: TaskStatus) -> Change {
        let change = self
            .store
            .apply_optimistic_update(ChangeRequest::new(task_id, to_status))
            .await;
        self.spawn_dispatch(change.clone());
        change
    }

    /// Apply several moves under one batch id; each is dispatched and
    /// resolved independently, in submission order
    pub async fn submit_batch(&self, moves: Vec<(Uuid, TaskStatus)>) -> Vec<Change> {
        let requests = moves
            .into_iter()
            .map(|(task_id, to_status)| ChangeRequest::new(task_id, to_status))
            .collect();
        let changes = self.store.apply_batch_update(requests).await;
        for change in &changes {
            self.spawn_dispatch(change.clone());
        }
        changes
    }

    /// Cancel outstanding dispatcher requests for a task. The dispatch tasks
    /// observe the cancellation and roll the affected changes back.
    pub fn cancel_request(&self, task_id: Uuid) -> usize {
        self.dispatcher.cancel(task_id)
    }

    /// Consume inbound server messages until the channel closes
    pub fn bind_channel(&self, mut inbound: mpsc::UnboundedReceiver<ServerMessage>) -> JoinHandle<()> {
        let reconciler = self.clone();
        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                reconciler.handle_server_message(message).await;
            }
        })
    }

    /// Merge one inbound server message into local state
    pub async fn handle_server_message(&self, message: ServerMessage) {
        match message {
            ServerMessage::ConnectionSuccess { client_id } => {
                debug!(%client_id, "push channel established");
            }
            ServerMessage::StateSync { tasks } => {
                let merged = self.store.sync_all(tasks).await;
                let _ = self.events.send(ReconcilerEvent::RemoteApplied {
                    tasks: merged.len(),
                });
            }
            ServerMessage::TasksUpdated { changes } => {
                let mut applied = 0;
                for delta in changes {
                    match delta {
                        TaskDelta::BulkUpdate => {
                            let _ = self.events.send(ReconcilerEvent::ResyncRequired);
                        }
                        TaskDelta::TaskCreated { task } | TaskDelta::TaskUpdated { task } => {
                            if self.store.apply_remote(task).await {
                                applied += 1;
                            }
                        }
                        TaskDelta::TaskDeleted { task_id } => {
                            if self.store.remove_remote(task_id).await {
                                applied += 1;
                            }
                        }
                    }
                }
                let _ = self
                    .events
                    .send(ReconcilerEvent::RemoteApplied { tasks: applied });
            }
            ServerMessage::ClientCountUpdated { count } => {
                let _ = self.events.send(ReconcilerEvent::Participants { count });
            }
            ServerMessage::Error { message } => {
                warn!(%message, "server reported push-channel error");
            }
            ServerMessage::Pong => {}
        }
    }

    fn spawn_dispatch(&self, change: Change) {
        let store = Arc::clone(&self.store);
        let dispatcher = Arc::clone(&self.dispatcher);
        let events = self.events.clone();
        tokio::spawn(async move {
            match dispatcher.enqueue(change.task_id, change.to_status).await {
                Ok(remote) => {
                    store.confirm_change(change.change_id).await;
                    // adopt the server's canonical position unless a newer
                    // local change is still pending on the task
                    store.apply_remote(remote).await;
                    let _ = events.send(ReconcilerEvent::Confirmed {
                        task_id: change.task_id,
                        change_id: change.change_id,
                    });
                }
                Err(error) => {
                    match store.rollback(change.change_id).await {
                        Ok(_) => {}
                        Err(rollback_err) => {
                            // already rolled back elsewhere (e.g. batch)
                            debug!(
                                change_id = %change.change_id,
                                error = %rollback_err,
                                "rollback skipped"
                            );
                        }
                    }
                    warn!(
                        task_id = %change.task_id,
                        change_id = %change.change_id,
                        error = %error,
                        "status mutation failed, rolled back"
                    );
                    let _ = events.send(ReconcilerEvent::RolledBack {
                        task_id: change.task_id,
                        change_id: change.change_id,
                        error,
                    });
                }
            }
        });
    }
}

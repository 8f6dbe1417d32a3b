//! XFBoard - Main Library
//!
//! XFBoard is the client-side synchronization engine for a collaborative
//! task board. Users move tasks between columns and expect the board to
//! respond instantly; the authoritative record lives on a remote server that
//! is also being edited by other clients. This crate owns the gap between
//! the two: it applies changes optimistically, pushes them to the server
//! with retries, merges pushes from other clients, and rolls back cleanly
//! when the server says no.
//!
//! # Module Structure
//!
//! The library is organized into five modules:
//!
//! - **`shared`** - Types used across the engine
//!   - Task state, change descriptors, store events
//!   - Wire protocol frames, error taxonomy, configuration
//!
//! - **`store`** - The optimistic state store
//!   - Working task map, snapshot ring buffer, pending ledger
//!   - Apply / rollback / confirm operations and event subscriptions
//!
//! - **`dispatcher`** - Server-bound mutation queue
//!   - Strict FIFO, one request in flight, request coalescing
//!   - Exponential-backoff retry, per-attempt timeouts, cancellation
//!
//! - **`realtime`** - The push channel
//!   - Reconnect state machine with capped backoff
//!   - Subscribe handshake, heartbeat, offline outbound queue
//!
//! - **`reconciler`** - Integration logic
//!   - Routes dispatcher outcomes into store confirms/rollbacks
//!   - Merges server pushes with a local-wins policy
//!
//! # Usage
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
//! let config = ClientConfig::from_env();
//!
//! let store = Arc::new(OptimisticStateStore::new(config.store.clone()));
//! let transport = Arc::new(HttpTaskTransport::new(config.server_url.clone()));
//! let dispatcher = Arc::new(ChangeDispatcher::new(transport, config.dispatch.clone()));
//! let (channel, inbound) = RealtimeChannel::from_config(&config);
//!
//! let reconciler = Reconciler::new(Arc::clone(&store), dispatcher);
//! reconciler.bind_channel(inbound);
//! channel.connect();
//!
//! // a drag gesture lands a task in the "doing" column
//! let task_id = uuid::Uuid::new_v4();
//! let change = reconciler.submit(task_id, TaskStatus::Doing).await;
//! println!("optimistically applied {}", change.change_id);
//! # }
//! ```
//!
//! # Concurrency Model
//!
//! Cooperative Tokio async throughout. Every mutation of the task map, the
//! pending ledger and the snapshot history completes inside one lock-guard
//! scope with no I/O await inside it; suspension points are confined to
//! network I/O and timer waits. The dispatcher preserves submission order
//! for server-bound writes, the realtime channel preserves FIFO order for
//! queued outbound messages and inbound delivery.
//!
//! # Error Handling
//!
//! The library uses Rust's standard error handling:
//!
//! - `Result<T, E>` for fallible operations
//! - Custom error types in `shared::error` (`SyncError`, `StoreError`)
//! - Retryable failures (network, 5xx, timeout) are distinguished from
//!   terminal ones (4xx, cancellation) by classification, not by message

/// Shared types and data structures
pub mod shared;

/// Optimistic state store
pub mod store;

/// Server-bound mutation dispatcher
pub mod dispatcher;

/// Realtime push channel
pub mod realtime;

/// Store / dispatcher / channel integration
pub mod reconciler;

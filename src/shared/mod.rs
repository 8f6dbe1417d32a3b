//! Shared Module
//!
//! Types shared by the store, the dispatcher, the realtime channel and the
//! reconciler: task state, change descriptors, store events, the wire
//! protocol, the error taxonomy and client configuration.

/// Task state types
pub mod task;

/// Change descriptors
pub mod change;

/// Store event system
pub mod event;

/// Push-channel wire protocol
pub mod protocol;

/// Error taxonomy
pub mod error;

/// Client configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use change::{Change, ChangeRequest};
pub use config::{ClientConfig, ClientConfigBuilder, ConfigError, DispatchConfig, RealtimeConfig, StoreConfig};
pub use error::{StoreError, SyncError};
pub use event::StoreEvent;
pub use protocol::{ClientMessage, RemoteTask, ServerMessage, TaskDelta};
pub use task::{TaskState, TaskStatus};

//! Error Types
//!
//! Defines the failure taxonomy shared by the dispatcher, the realtime
//! channel, and the store.
//!
//! # Error Categories
//!
//! - `Network` - transport failure before an HTTP status was received
//! - `Server` - server-side failure (HTTP 5xx), retryable
//! - `Client` - request rejected (HTTP 4xx except 408), never retried
//! - `Timeout` - HTTP 408 or a local per-attempt deadline, retryable
//! - `Cancelled` - request cancelled before completion
//! - `Connection` - push-channel level failure
//! - `Exhausted` - a retryable failure persisted through every allowed attempt
//!
//! All variants are `Clone` so that callers coalesced onto a single in-flight
//! request can each receive the same terminal result.

use thiserror::Error;
use uuid::Uuid;

/// Failures raised by server-bound mutations and the push channel
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    /// Transport-level failure before an HTTP status was received
    #[error("network error: {message}")]
    Network {
        /// Human-readable description
        message: String,
    },

    /// Server-side failure (HTTP 5xx)
    #[error("server error (HTTP {status})")]
    Server {
        /// HTTP status code
        status: u16,
    },

    /// Request rejected by the server (HTTP 4xx other than 408)
    #[error("client error (HTTP {status}): {message}")]
    Client {
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// HTTP 408 or the local per-attempt deadline elapsed
    #[error("request timed out")]
    Timeout,

    /// Cancelled before completion
    #[error("request cancelled")]
    Cancelled,

    /// Push-channel failure
    #[error("connection error: {message}")]
    Connection {
        /// Human-readable description
        message: String,
    },

    /// A retryable failure persisted through every allowed attempt
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Total attempts made, including the first
        attempts: u32,
        /// The failure observed on the final attempt
        last: Box<SyncError>,
    },
}

impl SyncError {
    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a push-channel error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Wrap the final failure of a retry sequence with its attempt count
    pub fn exhausted(attempts: u32, last: SyncError) -> Self {
        Self::Exhausted {
            attempts,
            last: Box::new(last),
        }
    }

    /// Map an HTTP response status into the taxonomy
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            408 => Self::Timeout,
            500..=599 => Self::Server { status },
            400..=499 => Self::Client {
                status,
                message: message.into(),
            },
            _ => Self::Network {
                message: format!("unexpected HTTP status {status}"),
            },
        }
    }

    /// Whether the dispatcher may retry after this failure
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Server { .. } | Self::Timeout
        )
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::network(format!("JSON error: {err}"))
    }
}

/// Failures raised by store operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The change id is not in the pending ledger (unknown, already
    /// confirmed, or already rolled back)
    #[error("unknown change {0}")]
    UnknownChange(Uuid),

    /// No pending change shares the batch id
    #[error("unknown batch {0}")]
    UnknownBatch(Uuid),
}

//! Push-Channel Wire Protocol
//!
//! JSON text frames exchanged over the persistent socket. Client frames are
//! `SUBSCRIBE`, `PING` and `REQUEST_SYNC`; server frames carry connection
//! acknowledgements, full state syncs, task deltas, participant counts,
//! errors and heartbeat responses.

use crate::shared::task::TaskStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server representation of a task as carried on the wire
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteTask {
    /// Task id
    pub id: Uuid,
    /// Authoritative column
    pub status: TaskStatus,
    /// Authoritative ordinal within the column
    pub position: u32,
    /// Column key
    pub column_id: String,
}

impl RemoteTask {
    /// Build a wire task
    pub fn new(id: Uuid, status: TaskStatus, position: u32) -> Self {
        Self {
            id,
            status,
            position,
            column_id: status.as_str().to_string(),
        }
    }
}

/// Client → server frames
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Handshake sent after every successful connect
    Subscribe {
        /// Board to receive pushes for
        board_id: String,
    },
    /// Heartbeat keepalive
    Ping,
    /// Request a full authoritative snapshot
    RequestSync,
}

/// Server → client frames
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Connection acknowledged
    ConnectionSuccess {
        /// Server-assigned client id
        client_id: String,
    },
    /// Full authoritative task list
    StateSync {
        /// Every task on the board
        tasks: Vec<RemoteTask>,
    },
    /// Incremental updates from other clients
    TasksUpdated {
        /// Individual change entries
        changes: Vec<TaskDelta>,
    },
    /// Number of connected participants changed
    ClientCountUpdated {
        /// Current participant count
        count: u32,
    },
    /// Server-side error report
    Error {
        /// Human-readable description
        message: String,
    },
    /// Heartbeat response
    Pong,
}

/// One entry in a `TASKS_UPDATED` frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskDelta {
    /// Too many changes to enumerate; the client should request a full sync
    BulkUpdate,
    /// A task was created
    TaskCreated {
        /// The new task
        task: RemoteTask,
    },
    /// A task was updated
    TaskUpdated {
        /// The updated task
        task: RemoteTask,
    },
    /// A task was deleted
    TaskDeleted {
        /// Id of the removed task
        task_id: Uuid,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_tags() {
        let json = serde_json::to_string(&ClientMessage::Ping).unwrap();
        assert_eq!(json, r#"{"type":"PING"}"#);

        let json = serde_json::to_string(&ClientMessage::RequestSync).unwrap();
        assert_eq!(json, r#"{"type":"REQUEST_SYNC"}"#);

        let json = serde_json::to_string(&ClientMessage::Subscribe {
            board_id: "main".to_string(),
        })
        .unwrap();
        assert!(json.contains(r#""type":"SUBSCRIBE""#));
        assert!(json.contains(r#""board_id":"main""#));
    }

    #[test]
    fn test_server_message_parse() {
        let frame = r#"{"type":"CLIENT_COUNT_UPDATED","count":7}"#;
        let msg: ServerMessage = serde_json::from_str(frame).unwrap();
        assert_eq!(msg, ServerMessage::ClientCountUpdated { count: 7 });

        let frame = r#"{"type":"PONG"}"#;
        let msg: ServerMessage = serde_json::from_str(frame).unwrap();
        assert_eq!(msg, ServerMessage::Pong);
    }

    #[test]
    fn test_state_sync_parse() {
        let id = Uuid::new_v4();
        let frame = format!(
            r#"{{"type":"STATE_SYNC","tasks":[{{"id":"{id}","status":"doing","position":2,"column_id":"doing"}}]}}"#
        );
        let msg: ServerMessage = serde_json::from_str(&frame).unwrap();
        match msg {
            ServerMessage::StateSync { tasks } => {
                assert_eq!(tasks.len(), 1);
                assert_eq!(tasks[0].id, id);
                assert_eq!(tasks[0].status, TaskStatus::Doing);
                assert_eq!(tasks[0].position, 2);
            }
            other => panic!("expected STATE_SYNC, got {other:?}"),
        }
    }

    #[test]
    fn test_delta_tags() {
        let id = Uuid::new_v4();
        let delta = TaskDelta::TaskDeleted { task_id: id };
        let json = serde_json::to_string(&delta).unwrap();
        assert!(json.contains(r#""kind":"TASK_DELETED""#));

        let bulk: TaskDelta = serde_json::from_str(r#"{"kind":"BULK_UPDATE"}"#).unwrap();
        assert_eq!(bulk, TaskDelta::BulkUpdate);
    }
}

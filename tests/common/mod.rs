//! Shared test fixtures
//!
//! Scripted transports and sockets used by the integration tests to stand in
//! for the HTTP server and the push connection.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;
use xfboard::dispatcher::TaskTransport;
use xfboard::realtime::{ChannelSocket, Connector, SocketEvent};
use xfboard::shared::{ClientMessage, RemoteTask, SyncError, TaskStatus};

/// Transport whose responses follow a script; once the script is exhausted
/// every call succeeds with the server echoing the requested status
pub struct RecordingTransport {
    script: Mutex<VecDeque<Result<RemoteTask, SyncError>>>,
    calls: Mutex<Vec<(Uuid, TaskStatus)>>,
    delay: Duration,
}

impl RecordingTransport {
    pub fn ok() -> Self {
        Self::scripted(Vec::new())
    }

    pub fn scripted(script: Vec<Result<RemoteTask, SyncError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(Uuid, TaskStatus)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskTransport for RecordingTransport {
    async fn update_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
    ) -> Result<RemoteTask, SyncError> {
        self.calls.lock().unwrap().push((task_id, status));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(RemoteTask::new(task_id, status, 0)))
    }
}

/// In-memory push socket scripted from the test body
pub struct FakeSocket {
    sent: Arc<Mutex<Vec<ClientMessage>>>,
    events: mpsc::UnboundedReceiver<SocketEvent>,
    closed: Arc<AtomicBool>,
}

/// Test-side handle for a [`FakeSocket`]
#[derive(Clone)]
pub struct FakeSocketHandle {
    sent: Arc<Mutex<Vec<ClientMessage>>>,
    events_tx: mpsc::UnboundedSender<SocketEvent>,
    closed: Arc<AtomicBool>,
}

impl FakeSocketHandle {
    pub fn sent(&self) -> Vec<ClientMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn push(&self, event: SocketEvent) {
        let _ = self.events_tx.send(event);
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub fn fake_socket() -> (FakeSocket, FakeSocketHandle) {
    let (events_tx, events) = mpsc::unbounded_channel();
    let sent = Arc::new(Mutex::new(Vec::new()));
    let closed = Arc::new(AtomicBool::new(false));
    (
        FakeSocket {
            sent: Arc::clone(&sent),
            events,
            closed: Arc::clone(&closed),
        },
        FakeSocketHandle {
            sent,
            events_tx,
            closed,
        },
    )
}

#[async_trait]
impl ChannelSocket for FakeSocket {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), SyncError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn next_event(&mut self) -> Option<SocketEvent> {
        self.events.recv().await
    }

    async fn close(&mut self) -> Result<(), SyncError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector handing out prepared sockets, then refusing further connects
pub struct FakeConnector {
    sockets: Mutex<VecDeque<FakeSocket>>,
}

impl FakeConnector {
    pub fn with_sockets(sockets: Vec<FakeSocket>) -> Self {
        Self {
            sockets: Mutex::new(sockets.into()),
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn ChannelSocket>, SyncError> {
        match self.sockets.lock().unwrap().pop_front() {
            Some(socket) => Ok(Box::new(socket)),
            None => Err(SyncError::connection("connection refused")),
        }
    }
}

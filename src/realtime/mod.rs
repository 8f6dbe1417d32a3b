//! # Realtime Channel
//!
//! Maintains the persistent push connection to the server and owns its
//! lifecycle: `Disconnected → Connecting → Connected → Reconnecting →
//! {Connected | Failed}`. `Failed` is terminal until an explicit
//! [`RealtimeChannel::reconnect`].
//!
//! ## Features
//!
//! - **Subscribe Handshake**: every successful connect starts with a
//!   `SUBSCRIBE` frame
//! - **Outbound Queue**: messages sent while disconnected are retained (cap
//!   applies, oldest dropped) and flushed FIFO right after the handshake
//! - **Heartbeat**: periodic `PING` keepalive, reset by any inbound frame
//! - **Capped Reconnect Backoff**: abnormal closes schedule reconnects with
//!   exponential backoff; after the configured number of consecutive
//!   failures the channel turns `Failed` and stops retrying
//!
//! ## Usage
//!
//! ```rust,no_run
//! use xfboard::realtime::RealtimeChannel;
//! use xfboard::shared::ClientConfig;
//!
//! # async fn example() {
//! let config = ClientConfig::default();
//! let (channel, mut inbound) = RealtimeChannel::from_config(&config);
//! channel.connect();
//!
//! while let Some(message) = inbound.recv().await {
//!     println!("server push: {message:?}");
//! }
//! # }
//! ```

pub mod socket;

pub use socket::{ChannelSocket, Connector, SocketEvent, WsConnector, WsSocket};

use crate::shared::config::{ClientConfig, RealtimeConfig};
use crate::shared::error::SyncError;
use crate::shared::protocol::{ClientMessage, ServerMessage};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// No connection and none wanted
    Disconnected,
    /// First connection attempt in progress
    Connecting,
    /// Live connection, handshake sent, queue flushed
    Connected,
    /// Connection lost abnormally; a reconnect is scheduled or running
    Reconnecting,
    /// Reconnect attempts exhausted; waiting for a manual reconnect
    Failed,
}

#[derive(Debug)]
enum Command {
    Send(ClientMessage),
    Disconnect,
}

enum SessionEnd {
    /// `disconnect()` was called
    Manual,
    /// Peer closed with a normal close code
    NormalClose,
    /// Connection lost; reconnect applies
    Abnormal,
}

struct ChannelShared {
    connector: Arc<dyn Connector>,
    url: String,
    board_id: String,
    config: RealtimeConfig,
    status_tx: watch::Sender<ChannelStatus>,
    client_count_tx: watch::Sender<u32>,
    outbound: Mutex<VecDeque<ClientMessage>>,
    cmd_tx: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    inbound_tx: mpsc::UnboundedSender<ServerMessage>,
}

/// Persistent push connection to the task-board server
pub struct RealtimeChannel {
    shared: Arc<ChannelShared>,
    runner: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeChannel {
    /// Create a channel over an explicit connector. Returns the channel and
    /// the receiver on which inbound server messages are delivered in FIFO
    /// order.
    pub fn new(
        connector: Arc<dyn Connector>,
        url: impl Into<String>,
        board_id: impl Into<String>,
        config: RealtimeConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(ChannelStatus::Disconnected);
        let (client_count_tx, _) = watch::channel(0);
        let channel = Self {
            shared: Arc::new(ChannelShared {
                connector,
                url: url.into(),
                board_id: board_id.into(),
                config,
                status_tx,
                client_count_tx,
                outbound: Mutex::new(VecDeque::new()),
                cmd_tx: Mutex::new(None),
                inbound_tx,
            }),
            runner: Mutex::new(None),
        };
        (channel, inbound_rx)
    }

    /// Create a channel over the production WebSocket connector
    pub fn from_config(config: &ClientConfig) -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        Self::new(
            Arc::new(WsConnector),
            config.realtime_url(),
            config.board_id.clone(),
            config.realtime.clone(),
        )
    }

    /// Start the connection loop. A no-op while the loop is already running.
    /// Must be called inside a Tokio runtime.
    pub fn connect(&self) {
        let mut runner = self.runner.lock().unwrap();
        if let Some(handle) = runner.as_ref() {
            if !handle.is_finished() {
                return;
            }
        }
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        *self.shared.cmd_tx.lock().unwrap() = Some(cmd_tx);
        let shared = Arc::clone(&self.shared);
        *runner = Some(tokio::spawn(async move {
            ChannelShared::run(shared, cmd_rx).await;
        }));
    }

    /// Restart the connection loop after `Failed` or `Disconnected`
    pub fn reconnect(&self) {
        self.connect();
    }

    /// Close the socket with a normal close code and cancel the heartbeat
    /// and any scheduled reconnect
    pub fn disconnect(&self) {
        let cmd_tx = self.shared.cmd_tx.lock().unwrap().clone();
        match cmd_tx {
            Some(tx) => {
                if tx.send(Command::Disconnect).is_err() {
                    self.shared.status_tx.send_replace(ChannelStatus::Disconnected);
                }
            }
            None => {
                self.shared.status_tx.send_replace(ChannelStatus::Disconnected);
            }
        }
    }

    /// Send a frame now if connected, otherwise queue it for the next flush
    pub fn send(&self, message: ClientMessage) {
        if self.status() == ChannelStatus::Connected {
            let cmd_tx = self.shared.cmd_tx.lock().unwrap().clone();
            if let Some(tx) = cmd_tx {
                if let Err(err) = tx.send(Command::Send(message)) {
                    if let Command::Send(message) = err.0 {
                        self.shared.queue_outbound(message);
                    }
                }
                return;
            }
        }
        self.shared.queue_outbound(message);
    }

    /// Ask the server for a full authoritative snapshot
    pub fn request_sync(&self) {
        self.send(ClientMessage::RequestSync);
    }

    /// Current lifecycle state
    pub fn status(&self) -> ChannelStatus {
        *self.shared.status_tx.borrow()
    }

    /// Observe lifecycle transitions
    pub fn watch_status(&self) -> watch::Receiver<ChannelStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Whether the channel is currently connected
    pub fn is_connected(&self) -> bool {
        self.status() == ChannelStatus::Connected
    }

    /// Last reported participant count
    pub fn client_count(&self) -> u32 {
        *self.shared.client_count_tx.borrow()
    }

    /// Observe participant-count updates
    pub fn watch_client_count(&self) -> watch::Receiver<u32> {
        self.shared.client_count_tx.subscribe()
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        if let Some(handle) = self.runner.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl ChannelShared {
    async fn run(shared: Arc<ChannelShared>, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        let mut failures: u32 = 0;
        loop {
            shared.status_tx.send_replace(if failures == 0 {
                ChannelStatus::Connecting
            } else {
                ChannelStatus::Reconnecting
            });
            match shared.connector.connect(&shared.url).await {
                Ok(mut socket) => {
                    if shared.handshake(&mut socket).await.is_ok() {
                        shared.status_tx.send_replace(ChannelStatus::Connected);
                        failures = 0;
                        match shared.session(&mut socket, &mut cmd_rx).await {
                            SessionEnd::Manual => {
                                let _ = socket.close().await;
                                shared.status_tx.send_replace(ChannelStatus::Disconnected);
                                return;
                            }
                            SessionEnd::NormalClose => {
                                shared.status_tx.send_replace(ChannelStatus::Disconnected);
                                return;
                            }
                            SessionEnd::Abnormal => {
                                warn!("push connection lost, scheduling reconnect");
                                failures += 1;
                            }
                        }
                    } else {
                        failures += 1;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "push channel connect failed");
                    failures += 1;
                }
            }

            if failures >= shared.max_attempts() {
                warn!(attempts = failures, "push channel giving up after repeated failures");
                shared.status_tx.send_replace(ChannelStatus::Failed);
                return;
            }
            shared.status_tx.send_replace(ChannelStatus::Reconnecting);
            let delay = shared.reconnect_delay(failures);
            debug!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
            let deadline = tokio::time::Instant::now() + delay;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => break,
                    cmd = cmd_rx.recv() => match cmd {
                        Some(Command::Send(message)) => shared.queue_outbound(message),
                        Some(Command::Disconnect) | None => {
                            shared.status_tx.send_replace(ChannelStatus::Disconnected);
                            return;
                        }
                    },
                }
            }
        }
    }

    /// Subscribe handshake plus FIFO flush of the offline queue
    async fn handshake(&self, socket: &mut Box<dyn ChannelSocket>) -> Result<(), SyncError> {
        socket
            .send(&ClientMessage::Subscribe {
                board_id: self.board_id.clone(),
            })
            .await?;
        loop {
            let next = self.outbound.lock().unwrap().pop_front();
            let Some(message) = next else {
                return Ok(());
            };
            if let Err(err) = socket.send(&message).await {
                // keep the unsent message at the head for the next connect
                self.outbound.lock().unwrap().push_front(message);
                return Err(err);
            }
        }
    }

    async fn session(
        &self,
        socket: &mut Box<dyn ChannelSocket>,
        cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    ) -> SessionEnd {
        enum Activity {
            Heartbeat,
            Command(Option<Command>),
            Socket(Option<SocketEvent>),
        }

        let mut heartbeat = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.heartbeat_interval,
            self.config.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let activity = tokio::select! {
                _ = heartbeat.tick() => Activity::Heartbeat,
                cmd = cmd_rx.recv() => Activity::Command(cmd),
                event = socket.next_event() => Activity::Socket(event),
            };
            match activity {
                Activity::Heartbeat => {
                    if socket.send(&ClientMessage::Ping).await.is_err() {
                        return SessionEnd::Abnormal;
                    }
                }
                Activity::Command(Some(Command::Send(message))) => {
                    if socket.send(&message).await.is_err() {
                        self.queue_outbound(message);
                        return SessionEnd::Abnormal;
                    }
                }
                Activity::Command(Some(Command::Disconnect)) | Activity::Command(None) => {
                    return SessionEnd::Manual;
                }
                Activity::Socket(Some(SocketEvent::Message(message))) => {
                    // any inbound traffic proves liveness
                    heartbeat.reset();
                    if let ServerMessage::ClientCountUpdated { count } = &message {
                        self.client_count_tx.send_replace(*count);
                    }
                    if !matches!(message, ServerMessage::Pong) {
                        let _ = self.inbound_tx.send(message);
                    }
                }
                Activity::Socket(Some(SocketEvent::Closed { normal: true })) => {
                    return SessionEnd::NormalClose;
                }
                Activity::Socket(Some(SocketEvent::Closed { normal: false }))
                | Activity::Socket(None) => {
                    return SessionEnd::Abnormal;
                }
            }
        }
    }

    fn queue_outbound(&self, message: ClientMessage) {
        let mut queue = self.outbound.lock().unwrap();
        if queue.len() >= self.config.outbound_queue_cap {
            queue.pop_front();
            warn!("outbound queue full, dropping oldest message");
        }
        queue.push_back(message);
    }

    /// Delay before the `failures`-th consecutive reconnect
    fn reconnect_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        let factor = self.config.reconnect_factor.powi(exponent as i32);
        let millis = (self.config.reconnect_base.as_millis() as f64 * factor) as u64;
        let mut delay = Duration::from_millis(millis);
        if self.config.reconnect_jitter {
            let jitter = (delay.as_millis() as f64 * 0.25 * rand::random::<f64>()) as u64;
            delay += Duration::from_millis(jitter);
        }
        delay.min(self.config.reconnect_cap)
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_reconnect_attempts.max(1)
    }
}

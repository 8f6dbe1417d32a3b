//! Socket Abstraction for the Push Channel
//!
//! The channel state machine drives a socket through the [`ChannelSocket`]
//! seam so tests can inject a scripted connection. The production
//! implementation speaks JSON text frames over tokio-tungstenite.

use crate::shared::error::SyncError;
use crate::shared::protocol::{ClientMessage, ServerMessage};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::warn;

/// Inbound socket activity as seen by the channel loop
#[derive(Debug)]
pub enum SocketEvent {
    /// A decoded server frame
    Message(ServerMessage),
    /// The peer closed the connection; `normal` when the close code was
    /// normal closure or going-away
    Closed {
        /// Whether the close was graceful
        normal: bool,
    },
}

/// One live push connection
#[async_trait]
pub trait ChannelSocket: Send {
    /// Send a client frame
    async fn send(&mut self, message: &ClientMessage) -> Result<(), SyncError>;

    /// Next inbound event; `None` when the connection dropped without a
    /// close frame
    async fn next_event(&mut self) -> Option<SocketEvent>;

    /// Close gracefully with a normal close code
    async fn close(&mut self) -> Result<(), SyncError>;
}

/// Factory for push connections
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to the server
    async fn connect(&self, url: &str) -> Result<Box<dyn ChannelSocket>, SyncError>;
}

/// Production connector over tokio-tungstenite
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn ChannelSocket>, SyncError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|err| SyncError::connection(err.to_string()))?;
        Ok(Box::new(WsSocket { inner: stream }))
    }
}

/// WebSocket-backed [`ChannelSocket`]
pub struct WsSocket {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl ChannelSocket for WsSocket {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), SyncError> {
        let frame = serde_json::to_string(message)
            .map_err(|err| SyncError::connection(format!("cannot encode frame: {err}")))?;
        self.inner
            .send(Message::Text(frame))
            .await
            .map_err(|err| SyncError::connection(err.to_string()))
    }

    async fn next_event(&mut self) -> Option<SocketEvent> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerMessage>(&text)
                {
                    Ok(message) => return Some(SocketEvent::Message(message)),
                    Err(err) => {
                        warn!(error = %err, "ignoring malformed server frame");
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    let normal = frame
                        .map(|f| matches!(f.code, CloseCode::Normal | CloseCode::Away))
                        .unwrap_or(false);
                    return Some(SocketEvent::Closed { normal });
                }
                // transport-level ping/pong and binary frames are not part of
                // the protocol
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(error = %err, "push connection errored");
                    return Some(SocketEvent::Closed { normal: false });
                }
                None => return None,
            }
        }
    }

    async fn close(&mut self) -> Result<(), SyncError> {
        self.inner
            .close(None)
            .await
            .map_err(|err| SyncError::connection(err.to_string()))
    }
}

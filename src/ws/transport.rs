//! Transport seam between the connection manager and the network.
//!
//! The manager only needs to open a message stream for a URL, write
//! messages to it and read messages from it. [`WebSocketTransport`] does
//! that over `tokio-tungstenite`; tests plug in an in-memory transport.

use std::future::Future;
use std::pin::Pin;

use futures_util::{Sink, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use url::Url;

use crate::error::Result;

/// Outbound half of an open connection.
pub type WireSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// Inbound half of an open connection.
pub type WireStream = Pin<Box<dyn Stream<Item = std::result::Result<Message, WsError>> + Send>>;

/// An open, authenticated connection split into its two halves.
pub struct Connection {
    pub sink: WireSink,
    pub stream: WireStream,
}

impl Connection {
    pub fn new(sink: WireSink, stream: WireStream) -> Self {
        Self { sink, stream }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Opens connections for the connection manager.
///
/// `connect` resolves once the remote end has accepted the connection
/// (websocket upgrade done). The session credential travels in `url`.
pub trait Transport: Send + Sync + 'static {
    fn connect(&self, url: &Url) -> impl Future<Output = Result<Connection>> + Send;
}

/// Production transport: a websocket over TLS via `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl Transport for WebSocketTransport {
    async fn connect(&self, url: &Url) -> Result<Connection> {
        let (ws, resp) = connect_async(url.as_str()).await?;
        tracing::debug!(status = %resp.status(), "WebSocket handshake complete");

        let (write, read) = ws.split();
        Ok(Connection::new(Box::pin(write), Box::pin(read)))
    }
}

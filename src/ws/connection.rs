//! Connection manager: the ticker's connection state machine.
//!
//! ```text
//!                 Serve            HandshakeSucceeded
//!  Disconnected ─────────▶ Connecting ───────────▶ Connected
//!                            ▲   │                   │
//!                   RetryDue │   │ HandshakeFailed   │ ConnectionLost
//!                            │   ▼                   │
//!                          Reconnecting ◀────────────┘
//!                               │
//!                               │ Exhausted            (Stop from any state)
//!                               ▼
//!                             Closed
//! ```
//!
//! The manager owns the single active connection. On every successful
//! handshake it installs the outbound [`Link`], fires the connect callback,
//! and replays the [`SubscriptionRegistry`] snapshot. The read loop decodes
//! frames and hands them to the [`Dispatcher`]. Any read/write failure,
//! close frame, or silence beyond the read timeout moves to `Reconnecting`,
//! where the [`ReconnectPolicy`] decides how long to wait (cancellable by
//! stop) or whether to give up.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::constants::close_codes;
use crate::error::{Result, TickerError};
use crate::types::ConnectionState;
use crate::ws::backoff::{BackoffConfig, ReconnectPolicy};
use crate::ws::codec::{self, FrameCodec};
use crate::ws::dispatch::Dispatcher;
use crate::ws::registry::{Snapshot, SubscriptionRegistry};
use crate::ws::transport::{Connection, Transport, WireSink, WireStream};

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Inputs to the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    /// `serve` was called.
    Serve,
    /// The transport accepted the connection.
    HandshakeSucceeded,
    /// Connecting failed or timed out.
    HandshakeFailed,
    /// Read/write failure, close frame, or read timeout.
    ConnectionLost,
    /// The backoff delay elapsed.
    RetryDue,
    /// Reconnecting is disabled or attempts ran out.
    Exhausted,
    /// `stop` was called.
    Stop,
}

impl ConnectionState {
    /// The state reached from `self` on `event`, or `None` if the event is
    /// not valid in this state.
    pub fn next(self, event: StateEvent) -> Option<ConnectionState> {
        use ConnectionState::*;
        use StateEvent::*;

        match (self, event) {
            (_, Stop) => Some(Closed),
            (Disconnected | Closed, Serve) => Some(Connecting),
            (Connecting, HandshakeSucceeded) => Some(Connected),
            (Connecting, HandshakeFailed) => Some(Reconnecting),
            (Connected, ConnectionLost) => Some(Reconnecting),
            (Reconnecting, RetryDue) => Some(Connecting),
            (Reconnecting, Exhausted) => Some(Closed),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Outbound half of the open connection plus its loss signal.
///
/// Every write is bounded by `write_timeout`. A failed or expired write
/// cancels `lost`, which ends the read loop.
pub(crate) struct Link {
    sink: WireSink,
    lost: CancellationToken,
    write_timeout: Duration,
}

impl Link {
    async fn send(&mut self, msg: Message) -> Result<()> {
        let err = match tokio::time::timeout(self.write_timeout, self.sink.send(msg)).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => TickerError::from(e),
            Err(_) => TickerError::WriteTimeout(self.write_timeout),
        };
        self.lost.cancel();
        Err(err)
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        self.send(Message::Text(text.into())).await
    }

    /// Best-effort close handshake on stop.
    async fn shutdown(mut self) {
        if self.send(Message::Close(None)).await.is_ok() {
            let _ = tokio::time::timeout(self.write_timeout, self.sink.close()).await;
        }
    }
}

/// State shared between the manager and every [`TickerHandle`].
///
/// [`TickerHandle`]: crate::ws::ticker::TickerHandle
pub(crate) struct Shared {
    pub(crate) registry: parking_lot::Mutex<SubscriptionRegistry>,
    link: Mutex<Option<Link>>,
    pub(crate) state: watch::Sender<ConnectionState>,
    pub(crate) stop: CancellationToken,
}

impl Shared {
    pub(crate) fn new() -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Arc::new(Self {
            registry: parking_lot::Mutex::new(SubscriptionRegistry::new()),
            link: Mutex::new(None),
            state,
            stop: CancellationToken::new(),
        })
    }

    /// Apply a registry change and send the control messages it returns.
    ///
    /// The link lock is taken before the registry is touched, so changes
    /// reach the wire in the order they were applied and never interleave
    /// with a replay. Returns `false` when nothing was sent; the replay on
    /// the next connect covers the change. A failed write drops the link and
    /// makes the read loop reconnect.
    pub(crate) async fn update<F>(&self, change: F) -> Result<bool>
    where
        F: FnOnce(&mut SubscriptionRegistry) -> Result<Vec<String>>,
    {
        let mut guard = self.link.lock().await;
        let messages = change(&mut self.registry.lock())?;

        let Some(link) = guard.as_mut() else {
            tracing::debug!("Not connected, deferring control message to next replay");
            return Ok(false);
        };
        for text in messages {
            if let Err(e) = link.send_text(text).await {
                tracing::warn!(error = %e, "Control message write failed");
                *guard = None;
                return Ok(false);
            }
        }
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Connection parameters read by the manager.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionSettings {
    pub(crate) url: Url,
    pub(crate) connect_timeout: Duration,
    pub(crate) read_timeout: Duration,
    pub(crate) write_timeout: Duration,
    pub(crate) auto_reconnect: bool,
    pub(crate) backoff: BackoffConfig,
}

enum Opened {
    Connection(Connection),
    Failed(TickerError),
    Stopped,
}

enum SessionEnd {
    Stopped,
    Lost { code: u16, reason: String },
}

/// One read from the stream, bounded by the read timeout.
type NextFrame = std::result::Result<
    Option<std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>,
    tokio::time::error::Elapsed,
>;

enum ReadOutcome {
    Stop,
    WriteFailed,
    Frame(NextFrame),
}

pub(crate) struct ConnectionManager<T: Transport> {
    transport: T,
    settings: ConnectionSettings,
    codec: FrameCodec,
    pub(crate) dispatcher: Dispatcher,
    policy: ReconnectPolicy,
    shared: Arc<Shared>,
}

impl<T: Transport> ConnectionManager<T> {
    pub(crate) fn new(
        transport: T,
        settings: ConnectionSettings,
        codec: FrameCodec,
        shared: Arc<Shared>,
    ) -> Self {
        let policy = ReconnectPolicy::new(settings.backoff.clone());
        Self {
            transport,
            settings,
            codec,
            dispatcher: Dispatcher::default(),
            policy,
            shared,
        }
    }

    pub(crate) fn url(&self) -> &Url {
        &self.settings.url
    }

    /// Drive the state machine until stopped or exhausted.
    pub(crate) async fn run(&mut self) -> Result<()> {
        if self.shared.stop.is_cancelled() {
            self.transition(StateEvent::Stop);
            return Ok(());
        }

        self.policy.reset();
        self.transition(StateEvent::Serve);
        let mut opened: Option<Connection> = None;

        loop {
            let state = *self.shared.state.borrow();
            if self.shared.stop.is_cancelled() && state != ConnectionState::Closed {
                self.transition(StateEvent::Stop);
                continue;
            }

            match state {
                ConnectionState::Disconnected => self.transition(StateEvent::Serve),

                ConnectionState::Connecting => {
                    let outcome = open(&self.transport, &self.settings, &self.shared.stop).await;
                    match outcome {
                        Opened::Connection(conn) => {
                            opened = Some(conn);
                            self.transition(StateEvent::HandshakeSucceeded);
                        }
                        Opened::Failed(e) => {
                            tracing::warn!(error = %e, "Ticker connection failed");
                            self.dispatcher.error(&e);
                            self.transition(StateEvent::HandshakeFailed);
                        }
                        Opened::Stopped => self.transition(StateEvent::Stop),
                    }
                }

                ConnectionState::Connected => {
                    let Some(conn) = opened.take() else {
                        self.transition(StateEvent::ConnectionLost);
                        continue;
                    };
                    match self.session(conn).await {
                        SessionEnd::Stopped => self.transition(StateEvent::Stop),
                        SessionEnd::Lost { code, reason } => {
                            tracing::info!(code, %reason, "Ticker connection closed");
                            self.dispatcher.close(code, &reason);
                            self.transition(StateEvent::ConnectionLost);
                        }
                    }
                }

                ConnectionState::Reconnecting => {
                    let attempt = if self.settings.auto_reconnect {
                        self.policy.next_attempt()
                    } else {
                        None
                    };
                    let Some(attempt) = attempt else {
                        let attempts = self.policy.attempt_count();
                        tracing::warn!(attempts, "Reconnect attempts exhausted");
                        self.transition(StateEvent::Exhausted);
                        self.dispatcher.no_reconnect(attempts);
                        return Err(TickerError::ReconnectExhausted { attempts });
                    };

                    tracing::info!(
                        attempt = attempt.number,
                        delay_ms = attempt.delay.as_millis() as u64,
                        "Reconnecting..."
                    );
                    self.dispatcher.reconnect(attempt.number, attempt.delay);

                    let stop = self.shared.stop.clone();
                    tokio::select! {
                        _ = stop.cancelled() => self.transition(StateEvent::Stop),
                        _ = tokio::time::sleep(attempt.delay) => self.transition(StateEvent::RetryDue),
                    }
                }

                ConnectionState::Closed => {
                    tracing::info!("Ticker stopped");
                    return Ok(());
                }
            }
        }
    }

    fn transition(&self, event: StateEvent) {
        let current = *self.shared.state.borrow();
        match current.next(event) {
            Some(next) => {
                tracing::debug!(from = %current, to = %next, ?event, "Connection state");
                self.shared.state.send_replace(next);
            }
            None => {
                tracing::debug!(state = %current, ?event, "Ignoring event in this state");
            }
        }
    }

    /// Run one connected session: install the link, replay, then read.
    async fn session(&mut self, conn: Connection) -> SessionEnd {
        let Connection { sink, mut stream } = conn;
        let lost = CancellationToken::new();

        let stop = self.shared.stop.clone();
        let installed = tokio::select! {
            biased;
            _ = stop.cancelled() => None,
            res = self.install(sink, lost.clone()) => Some(res),
        };

        let end = match installed {
            None => SessionEnd::Stopped,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Subscription replay failed");
                self.dispatcher.error(&e);
                SessionEnd::Lost {
                    code: close_codes::ABNORMAL,
                    reason: e.to_string(),
                }
            }
            Some(Ok(())) => self.read_loop(&mut stream, &lost).await,
        };

        // Handle writes hold the lock for at most one write timeout each.
        let link = self.shared.link.lock().await.take();
        if let SessionEnd::Stopped = end {
            if let Some(link) = link {
                link.shutdown().await;
            }
            self.dispatcher.close(close_codes::NORMAL, "client stopped");
        }
        end
    }

    /// Install the link, fire connect, replay the registry.
    ///
    /// The link lock is held throughout, so control messages sent concurrently
    /// through a handle queue up behind the replay.
    async fn install(&mut self, sink: WireSink, lost: CancellationToken) -> Result<()> {
        let mut guard = self.shared.link.lock().await;
        let link = guard.insert(Link {
            sink,
            lost,
            write_timeout: self.settings.write_timeout,
        });

        tracing::info!("Connected to ticker WebSocket");
        self.policy.reset();
        self.dispatcher.connect();

        let snapshot = self.shared.registry.lock().snapshot();
        replay(link, &snapshot).await
    }

    async fn read_loop(&mut self, stream: &mut WireStream, lost: &CancellationToken) -> SessionEnd {
        let read_timeout = self.settings.read_timeout;

        loop {
            let outcome = tokio::select! {
                biased;
                _ = self.shared.stop.cancelled() => ReadOutcome::Stop,
                _ = lost.cancelled() => ReadOutcome::WriteFailed,
                next = tokio::time::timeout(read_timeout, stream.next()) => ReadOutcome::Frame(next),
            };

            let frame = match outcome {
                ReadOutcome::Stop => return SessionEnd::Stopped,
                ReadOutcome::WriteFailed => {
                    return SessionEnd::Lost {
                        code: close_codes::ABNORMAL,
                        reason: "write failed".to_owned(),
                    };
                }
                ReadOutcome::Frame(frame) => frame,
            };

            let msg = match frame {
                Err(_) => {
                    let e = TickerError::ReadTimeout(read_timeout);
                    tracing::warn!(error = %e, "Ticker heartbeat missed");
                    self.dispatcher.error(&e);
                    return SessionEnd::Lost {
                        code: close_codes::ABNORMAL,
                        reason: e.to_string(),
                    };
                }
                Ok(None) => {
                    return SessionEnd::Lost {
                        code: close_codes::ABNORMAL,
                        reason: "connection closed".to_owned(),
                    };
                }
                Ok(Some(Err(e))) => {
                    let e = TickerError::from(e);
                    tracing::error!(error = %e, "Ticker read failed");
                    self.dispatcher.error(&e);
                    return SessionEnd::Lost {
                        code: close_codes::ABNORMAL,
                        reason: e.to_string(),
                    };
                }
                Ok(Some(Ok(msg))) => msg,
            };

            match msg {
                Message::Binary(data) => self.deliver(&data),
                Message::Text(text) => {
                    if let Some(decoded) = self.codec.decode_text(text.as_str().as_bytes()) {
                        self.dispatcher.dispatch(decoded);
                    }
                }
                Message::Close(frame) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                        .unwrap_or((close_codes::NO_STATUS, String::new()));
                    return SessionEnd::Lost { code, reason };
                }
                // tungstenite answers pings itself; either counts as liveness.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    fn deliver(&mut self, data: &[u8]) {
        for decoded in self.codec.decode_frame(data) {
            self.dispatcher.dispatch(decoded);
        }
    }
}

/// Open the transport, bounded by the connect timeout and stop.
async fn open<T: Transport>(
    transport: &T,
    settings: &ConnectionSettings,
    stop: &CancellationToken,
) -> Opened {
    let timeout = settings.connect_timeout;
    let attempt = tokio::time::timeout(timeout, transport.connect(&settings.url));
    tokio::select! {
        biased;
        _ = stop.cancelled() => Opened::Stopped,
        res = attempt => match res {
            Ok(Ok(conn)) => Opened::Connection(conn),
            Ok(Err(e)) => Opened::Failed(e),
            Err(_) => Opened::Failed(TickerError::ConnectTimeout(timeout)),
        },
    }
}

/// Send one subscribe and one mode message per mode group.
async fn replay(link: &mut Link, snapshot: &Snapshot) -> Result<()> {
    for (&mode, tokens) in snapshot {
        link.send_text(codec::encode_subscribe(tokens)?).await?;
        link.send_text(codec::encode_set_mode(mode, tokens)?).await?;
        tracing::debug!(%mode, count = tokens.len(), "Resubscribed instruments");
    }
    Ok(())
}

//! In-memory transport and frame builders shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use kite_ticker::Result;
use kite_ticker::TickerError;
use kite_ticker::ws::transport::{Connection, Transport};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use url::Url;

pub const INFY: u32 = 408065;
pub const RELIANCE: u32 = 738561;
pub const TCS: u32 = 2953217;

/// What the next `connect` call does.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Accept,
    Refuse,
    /// Never resolves; exercises the connect timeout.
    Hang,
    /// Accepts, but no client write ever completes.
    Stall,
}

/// Scripted transport. Once the script runs out every connect is refused.
pub struct MockTransport {
    script: Mutex<VecDeque<Step>>,
    connects: Arc<Mutex<Vec<(Instant, Url)>>>,
    servers: mpsc::UnboundedSender<ServerSide>,
}

/// Test-side view of a [`MockTransport`].
pub struct Listener {
    servers: mpsc::UnboundedReceiver<ServerSide>,
    connects: Arc<Mutex<Vec<(Instant, Url)>>>,
}

pub fn mock(steps: impl IntoIterator<Item = Step>) -> (MockTransport, Listener) {
    let (tx, rx) = mpsc::unbounded_channel();
    let connects = Arc::new(Mutex::new(Vec::new()));
    let transport = MockTransport {
        script: Mutex::new(steps.into_iter().collect()),
        connects: connects.clone(),
        servers: tx,
    };
    (transport, Listener { servers: rx, connects })
}

impl Transport for MockTransport {
    async fn connect(&self, url: &Url) -> Result<Connection> {
        self.connects
            .lock()
            .unwrap()
            .push((Instant::now(), url.clone()));
        let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Refuse);

        match step {
            Step::Refuse => Err(TickerError::WebSocket(WsError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            )))),
            Step::Hang => std::future::pending().await,
            Step::Accept | Step::Stall => {
                let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                let stalled = Arc::new(AtomicBool::new(matches!(step, Step::Stall)));

                let gate = stalled.clone();
                let sink = futures_util::sink::unfold(
                    outbound_tx,
                    move |tx: mpsc::UnboundedSender<Message>, msg: Message| {
                        let gate = gate.clone();
                        async move {
                            if gate.load(Ordering::SeqCst) {
                                std::future::pending::<()>().await;
                            }
                            tx.send(msg).map_err(|_| WsError::ConnectionClosed)?;
                            Ok::<_, WsError>(tx)
                        }
                    },
                );
                let stream = futures_util::stream::unfold(
                    inbound_rx,
                    |mut rx: mpsc::UnboundedReceiver<std::result::Result<Message, WsError>>| async move {
                        rx.recv().await.map(|item| (item, rx))
                    },
                );

                let _ = self.servers.send(ServerSide {
                    inbound: inbound_tx,
                    outbound: outbound_rx,
                    stalled,
                });
                Ok(Connection::new(Box::pin(sink), Box::pin(stream)))
            }
        }
    }
}

impl Listener {
    /// Wait for the client to open the next accepted connection.
    pub async fn accept(&mut self) -> ServerSide {
        tokio::time::timeout(Duration::from_secs(120), self.servers.recv())
            .await
            .expect("client did not connect")
            .expect("transport dropped")
    }

    pub fn connect_times(&self) -> Vec<Instant> {
        self.connects.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    pub fn urls(&self) -> Vec<Url> {
        self.connects.lock().unwrap().iter().map(|(_, u)| u.clone()).collect()
    }
}

/// Server end of one accepted connection. Dropping it ends the client's
/// read stream.
pub struct ServerSide {
    inbound: mpsc::UnboundedSender<std::result::Result<Message, WsError>>,
    outbound: mpsc::UnboundedReceiver<Message>,
    stalled: Arc<AtomicBool>,
}

impl ServerSide {
    pub fn send_binary(&self, frame: Vec<u8>) {
        let _ = self.inbound.send(Ok(Message::Binary(frame.into())));
    }

    pub fn send_text(&self, text: &str) {
        let _ = self.inbound.send(Ok(Message::Text(text.into())));
    }

    pub fn send_close(&self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        };
        let _ = self.inbound.send(Ok(Message::Close(Some(frame))));
    }

    /// Make every further client write fail.
    pub fn refuse_writes(&mut self) {
        self.outbound.close();
    }

    /// Make every further client write hang.
    pub fn stall_writes(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    /// Every text the client writes until it drops the connection.
    pub async fn texts_until_closed(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(msg) = self.next_message().await {
            if let Message::Text(text) = msg {
                out.push(text.as_str().to_owned());
            }
        }
        out
    }

    /// Next message written by the client, or `None` once its sink is gone.
    pub async fn next_message(&mut self) -> Option<Message> {
        tokio::time::timeout(Duration::from_secs(120), self.outbound.recv())
            .await
            .expect("client wrote nothing")
    }

    /// Next text message written by the client.
    pub async fn next_text(&mut self) -> String {
        match self.next_message().await {
            Some(Message::Text(text)) => text.as_str().to_owned(),
            other => panic!("expected a text message, got {other:?}"),
        }
    }

    pub async fn texts(&mut self, n: usize) -> Vec<String> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.next_text().await);
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Frame builders
// ---------------------------------------------------------------------------

/// Wrap packets into a binary frame: count, then length-prefixed packets.
pub fn frame(packets: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u16(packets.len() as u16);
    for p in packets {
        buf.put_u16(p.len() as u16);
        buf.put_slice(p);
    }
    buf.to_vec()
}

/// 8-byte LTP packet; `raw_price` is in paise.
pub fn ltp_packet(token: u32, raw_price: u32) -> Vec<u8> {
    let mut p = BytesMut::with_capacity(8);
    p.put_u32(token);
    p.put_u32(raw_price);
    p.to_vec()
}

pub fn heartbeat() -> Vec<u8> {
    vec![0]
}

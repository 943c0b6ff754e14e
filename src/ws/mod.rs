//! Ticker websocket client.
//!
//! The Kite ticker streams market data as **binary frames** and order
//! postbacks as **JSON text frames** over one websocket.
//!
//! ## Layers
//!
//! - [`codec`]: frame/packet decoding and control message encoding
//! - [`registry`]: the desired `token → mode` subscriptions
//! - [`backoff`]: reconnect delays
//! - [`transport`]: the network seam ([`transport::WebSocketTransport`])
//! - [`connection`]: the connection state machine, replay and read loop
//! - [`dispatch`]: callback delivery with panic isolation
//! - [`ticker`]: the public facade: [`ticker::Ticker`] and its handle
//!
//! ## Modes
//!
//! - **LTP**: last traded price only (8 bytes)
//! - **Quote**: price, volumes and OHLC (44 bytes; 28 for indices)
//! - **Full**: quote plus OI, timestamps and 5-level depth (184 bytes; 32
//!   for indices)
//!
//! ## Limits
//!
//! - Up to 3,000 instruments per connection
//! - Up to 3 connections per API key

pub mod backoff;
pub mod codec;
pub mod connection;
pub mod dispatch;
pub mod registry;
pub mod ticker;
pub mod transport;

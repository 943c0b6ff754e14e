//! # kite-ticker
//!
//! A streaming client for the Kite Connect ticker websocket
//! (`wss://ws.kite.trade`).
//!
//! The client decodes the binary tick feed into [`Tick`]s and the JSON
//! order postbacks into [`OrderUpdate`]s. It keeps the desired subscriptions
//! and replays them after every reconnect. Reconnects use exponential backoff
//! with jitter.
//!
//! ## Quick Start
//!
//! ```no_run
//! use kite_ticker::{Mode, TickerBuilder};
//!
//! #[tokio::main]
//! async fn main() -> kite_ticker::Result<()> {
//!     let mut ticker = TickerBuilder::new("your-access-token")
//!         .api_key("your-api-key")
//!         .build()?;
//!
//!     ticker.on_tick(|tick| println!("{tick:?}"));
//!     ticker.on_error(|err| eprintln!("ticker error: {err}"));
//!     ticker.set_mode(Mode::Full, &[408065]).await?;
//!
//!     ticker.serve().await
//! }
//! ```

pub mod constants;
pub mod error;
pub mod types;
pub mod ws;

/// Re-export the error type and Result alias.
pub use error::{DecodeError, Result, TickerError};
pub use types::{ConnectionState, InstrumentToken, Mode, OrderUpdate, Tick};
/// Re-export the client types at crate root for convenience.
pub use ws::ticker::{Ticker, TickerBuilder, TickerConfig, TickerHandle};

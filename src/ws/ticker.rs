//! Streaming client facade.
//!
//! # Example
//!
//! ```no_run
//! use kite_ticker::{Mode, TickerBuilder};
//!
//! # #[tokio::main]
//! # async fn main() -> kite_ticker::Result<()> {
//! let mut ticker = TickerBuilder::new("access_token")
//!     .api_key("api_key")
//!     .build()?;
//!
//! ticker.on_tick(|tick| println!("{} {}", tick.instrument_token, tick.last_price));
//! ticker.on_close(|code, reason| eprintln!("closed: {code} {reason}"));
//!
//! ticker.subscribe(&[408065]).await?;
//! ticker.set_mode(Mode::Full, &[408065]).await?;
//!
//! let handle = ticker.handle();
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     handle.stop();
//! });
//!
//! ticker.serve().await
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use url::Url;

use crate::constants::limits::MAX_TOKENS_PER_CONNECTION;
use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT, DEFAULT_WRITE_TIMEOUT, WS_TICKER_URL,
};
use crate::error::{Result, TickerError};
use crate::types::{ConnectionState, InstrumentToken, Mode, OrderUpdate, Tick};
use crate::ws::backoff::BackoffConfig;
use crate::ws::codec::{self, FrameCodec};
use crate::ws::connection::{ConnectionManager, ConnectionSettings, Shared};
use crate::ws::registry::Snapshot;
use crate::ws::transport::{Transport, WebSocketTransport};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for a [`Ticker`].
#[derive(Debug, Clone)]
pub struct TickerConfig {
    /// Websocket endpoint, without credentials.
    pub url: String,
    /// Whether to reconnect after the connection drops.
    pub auto_reconnect: bool,
    /// Maximum time to wait for the handshake.
    pub connect_timeout: Duration,
    /// Maximum silence on the read side before the connection is dropped.
    pub read_timeout: Duration,
    /// Maximum time a single outbound write may take.
    pub write_timeout: Duration,
    /// Reconnect backoff.
    pub backoff: BackoffConfig,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            url: WS_TICKER_URL.to_owned(),
            auto_reconnect: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            backoff: BackoffConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for a [`Ticker`].
///
/// ```no_run
/// use std::time::Duration;
/// use kite_ticker::TickerBuilder;
///
/// let ticker = TickerBuilder::new("access_token")
///     .api_key("api_key")
///     .reconnect_max_attempts(Some(50))
///     .read_timeout(Duration::from_secs(10))
///     .build()
///     .unwrap();
/// ```
pub struct TickerBuilder {
    api_key: Option<String>,
    access_token: String,
    config: TickerConfig,
    codec: FrameCodec,
}

impl TickerBuilder {
    /// Create a builder for the given session credential.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            api_key: None,
            access_token: access_token.into(),
            config: TickerConfig::default(),
            codec: FrameCodec::default(),
        }
    }

    /// Set the Kite Connect API key sent with the credential.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Override the websocket endpoint. Default: `wss://ws.kite.trade`.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    /// Enable or disable reconnecting. Default: true.
    pub fn auto_reconnect(mut self, enable: bool) -> Self {
        self.config.auto_reconnect = enable;
        self
    }

    /// Attempts before giving up (`None` = retry forever). Default: 300.
    pub fn reconnect_max_attempts(mut self, attempts: Option<u32>) -> Self {
        self.config.backoff.max_attempts = attempts;
        self
    }

    /// Delay before the first reconnect attempt. Default: 2 s.
    pub fn reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.config.backoff.base_delay = delay;
        self
    }

    /// Ceiling for any reconnect delay. Default: 60 s.
    pub fn reconnect_max_delay(mut self, delay: Duration) -> Self {
        self.config.backoff.max_delay = delay;
        self
    }

    /// Jitter as a fraction of the delay, clamped to `0.0..=1.0`. Default: 0.1.
    pub fn reconnect_jitter(mut self, jitter: f64) -> Self {
        self.config.backoff.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Handshake timeout. Default: 7 s.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Read timeout. Default: 5 s.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Write timeout. A write that does not finish in time drops the
    /// connection. Default: 5 s.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Replace the frame codec, e.g. to register extra packet layouts.
    pub fn codec(mut self, codec: FrameCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Build a [`Ticker`] over the websocket transport.
    pub fn build(self) -> Result<Ticker> {
        self.build_with_transport(WebSocketTransport)
    }

    /// Build a [`Ticker`] over a custom transport.
    pub fn build_with_transport<T: Transport>(self, transport: T) -> Result<Ticker<T>> {
        if self.access_token.is_empty() {
            return Err(TickerError::InvalidArgument(
                "access token must not be empty".to_owned(),
            ));
        }

        let mut url = Url::parse(&self.config.url)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(api_key) = &self.api_key {
                query.append_pair("api_key", api_key);
            }
            query.append_pair("access_token", &self.access_token);
        }

        let settings = ConnectionSettings {
            url,
            connect_timeout: self.config.connect_timeout,
            read_timeout: self.config.read_timeout,
            write_timeout: self.config.write_timeout,
            auto_reconnect: self.config.auto_reconnect,
            backoff: self.config.backoff.clone(),
        };

        let shared = Shared::new();
        let manager = ConnectionManager::new(transport, settings, self.codec, shared.clone());

        Ok(Ticker {
            manager,
            handle: TickerHandle { shared },
            config: self.config,
        })
    }
}

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// Streaming client for the Kite ticker.
///
/// Owns the callbacks and the connection. [`serve`](Self::serve) drives the
/// connection until [`stop`](Self::stop) or reconnect exhaustion; use a
/// [`TickerHandle`] from [`handle`](Self::handle) to control subscriptions
/// from other tasks while it runs.
pub struct Ticker<T: Transport = WebSocketTransport> {
    manager: ConnectionManager<T>,
    handle: TickerHandle,
    config: TickerConfig,
}

impl<T: Transport> Ticker<T> {
    /// Connect and deliver events until stopped.
    ///
    /// Returns `Ok(())` after [`stop`](Self::stop) and
    /// [`TickerError::ReconnectExhausted`] once reconnecting gives up. A
    /// ticker that gave up can be served again; one that was stopped cannot.
    pub async fn serve(&mut self) -> Result<()> {
        self.manager.run().await
    }

    /// Stop the ticker. Idempotent.
    pub fn stop(&self) {
        self.handle.stop();
    }

    /// A cloneable handle for use from other tasks.
    pub fn handle(&self) -> TickerHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &TickerConfig {
        &self.config
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.handle.state()
    }

    /// Subscribe tokens at the default mode. See [`TickerHandle::subscribe`].
    pub async fn subscribe(&self, tokens: &[InstrumentToken]) -> Result<()> {
        self.handle.subscribe(tokens).await
    }

    /// See [`TickerHandle::unsubscribe`].
    pub async fn unsubscribe(&self, tokens: &[InstrumentToken]) -> Result<()> {
        self.handle.unsubscribe(tokens).await
    }

    /// See [`TickerHandle::set_mode`].
    pub async fn set_mode(&self, mode: Mode, tokens: &[InstrumentToken]) -> Result<()> {
        self.handle.set_mode(mode, tokens).await
    }

    /// Called for every error: transport, decode, server, callback panic.
    pub fn on_error<F>(&mut self, f: F)
    where
        F: FnMut(&TickerError) + Send + 'static,
    {
        self.manager.dispatcher.on_error = Some(Box::new(f));
    }

    /// Called with `(code, reason)` when an open connection ends.
    pub fn on_close<F>(&mut self, f: F)
    where
        F: FnMut(u16, &str) + Send + 'static,
    {
        self.manager.dispatcher.on_close = Some(Box::new(f));
    }

    /// Called after every successful handshake, before subscriptions replay.
    pub fn on_connect<F>(&mut self, f: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.manager.dispatcher.on_connect = Some(Box::new(f));
    }

    /// Called with `(attempt, delay)` before each reconnect wait.
    pub fn on_reconnect<F>(&mut self, f: F)
    where
        F: FnMut(u32, Duration) + Send + 'static,
    {
        self.manager.dispatcher.on_reconnect = Some(Box::new(f));
    }

    /// Called with the number of attempts made once reconnecting gives up.
    pub fn on_no_reconnect<F>(&mut self, f: F)
    where
        F: FnMut(u32) + Send + 'static,
    {
        self.manager.dispatcher.on_no_reconnect = Some(Box::new(f));
    }

    pub fn on_tick<F>(&mut self, f: F)
    where
        F: FnMut(Tick) + Send + 'static,
    {
        self.manager.dispatcher.on_tick = Some(Box::new(f));
    }

    pub fn on_order_update<F>(&mut self, f: F)
    where
        F: FnMut(OrderUpdate) + Send + 'static,
    {
        self.manager.dispatcher.on_order_update = Some(Box::new(f));
    }
}

impl<T: Transport> std::fmt::Debug for Ticker<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticker")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable control handle for a [`Ticker`].
///
/// Subscription changes are recorded first and sent immediately when a
/// connection is open; otherwise they are sent on the next connect. A write
/// failure is not returned: the connection is dropped and the change goes
/// out with the replay after reconnecting.
#[derive(Clone)]
pub struct TickerHandle {
    shared: Arc<Shared>,
}

impl TickerHandle {
    /// Subscribe tokens. New tokens start at [`Mode::Quote`]; tokens already
    /// subscribed keep their mode.
    pub async fn subscribe(&self, tokens: &[InstrumentToken]) -> Result<()> {
        require_tokens(tokens)?;
        let message = codec::encode_subscribe(tokens)?;
        let sent = self
            .shared
            .update(|registry| {
                registry.subscribe(tokens);
                let total = registry.len();
                if total > MAX_TOKENS_PER_CONNECTION {
                    tracing::warn!(
                        total,
                        limit = MAX_TOKENS_PER_CONNECTION,
                        "Subscriptions exceed the per-connection limit"
                    );
                }
                Ok(vec![message])
            })
            .await?;
        tracing::debug!(count = tokens.len(), sent, "Subscribe");
        Ok(())
    }

    /// Unsubscribe tokens. Unknown tokens are ignored.
    pub async fn unsubscribe(&self, tokens: &[InstrumentToken]) -> Result<()> {
        require_tokens(tokens)?;
        let message = codec::encode_unsubscribe(tokens)?;
        let sent = self
            .shared
            .update(|registry| {
                registry.remove(tokens);
                Ok(vec![message])
            })
            .await?;
        tracing::debug!(count = tokens.len(), sent, "Unsubscribe");
        Ok(())
    }

    /// Set the streaming mode of tokens, subscribing any not yet subscribed.
    ///
    /// Tokens that were not subscribed get a subscribe message first, since
    /// the server ignores mode changes for unsubscribed tokens.
    pub async fn set_mode(&self, mode: Mode, tokens: &[InstrumentToken]) -> Result<()> {
        require_tokens(tokens)?;
        let message = codec::encode_set_mode(mode, tokens)?;
        let sent = self
            .shared
            .update(|registry| {
                let added = registry.set_mode(mode, tokens);
                let mut messages = Vec::with_capacity(2);
                if !added.is_empty() {
                    messages.push(codec::encode_subscribe(&added)?);
                }
                messages.push(message);
                Ok(messages)
            })
            .await?;
        tracing::debug!(%mode, count = tokens.len(), sent, "Set mode");
        Ok(())
    }

    /// Stop the ticker. Idempotent.
    pub fn stop(&self) {
        if !self.shared.stop.is_cancelled() {
            tracing::info!("Stopping ticker");
        }
        self.shared.stop.cancel();
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Receiver notified on every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Point-in-time copy of the desired subscriptions, grouped by mode.
    pub fn subscriptions(&self) -> Snapshot {
        self.shared.registry.lock().snapshot()
    }
}

impl std::fmt::Debug for TickerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickerHandle")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn require_tokens(tokens: &[InstrumentToken]) -> Result<()> {
    if tokens.is_empty() {
        return Err(TickerError::InvalidArgument(
            "token list must not be empty".to_owned(),
        ));
    }
    Ok(())
}

//! Constants for the Kite Connect ticker.
//!
//! Contains the websocket endpoint, protocol limits, and the default values
//! used by [`TickerConfig`](crate::ws::ticker::TickerConfig). They are used
//! internally but exported for advanced usage.

use std::time::Duration;

// ---------------------------------------------------------------------------
// WebSocket URL
// ---------------------------------------------------------------------------

/// Websocket endpoint for the live ticker (binary ticks + JSON order updates).
pub const WS_TICKER_URL: &str = "wss://ws.kite.trade";

// ---------------------------------------------------------------------------
// Connection defaults
// ---------------------------------------------------------------------------

/// Maximum time to wait for the websocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(7);

/// Silence on the read side longer than this is treated as a dead connection.
///
/// The server sends a 1-byte heartbeat every second when nothing else flows.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum time a single outbound write may take before the connection is
/// treated as dead.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default maximum number of reconnect attempts before giving up.
pub const DEFAULT_RECONNECT_MAX_ATTEMPTS: u32 = 300;

/// Delay before the first reconnect attempt; doubled on every further attempt.
pub const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Ceiling for the reconnect delay.
pub const DEFAULT_RECONNECT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Default jitter as a fraction of the computed delay.
pub const DEFAULT_RECONNECT_JITTER: f64 = 0.1;

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

/// Protocol limits of the ticker websocket.
pub mod limits {
    /// Maximum instruments per single connection.
    pub const MAX_TOKENS_PER_CONNECTION: usize = 3000;
    /// Size of a heartbeat frame in bytes.
    pub const HEARTBEAT_FRAME_LEN: usize = 1;
}

/// Close codes reported to the close callback.
pub mod close_codes {
    /// The client stopped the connection.
    pub const NORMAL: u16 = 1000;
    /// The server sent a close frame without a status code.
    pub const NO_STATUS: u16 = 1005;
    /// The connection dropped without a close frame.
    pub const ABNORMAL: u16 = 1006;
}

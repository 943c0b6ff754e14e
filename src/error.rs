//! Error types for the `kite-ticker` crate.
//!
//! All fallible operations in this crate return [`Result<T>`], which is an
//! alias for `std::result::Result<T, TickerError>`.
//!
//! [`TickerError`] covers:
//! - **Transport errors**: websocket failures, handshake, read and write timeouts
//! - **Decode errors**: malformed packets inside an otherwise valid frame
//! - **Usage errors**: empty token lists, unknown mode strings
//! - **Server errors**: error messages pushed by the ticker server
//! - **Callback panics**: a user callback panicked during dispatch
//! - **Exhaustion**: the reconnect policy gave up

use std::time::Duration;

/// Problems found while decoding a single inbound frame or packet.
///
/// A decode error never aborts the rest of the frame: the offending packet
/// is skipped and the error is reported through the error callback.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The frame is shorter than its fixed-size header.
    #[error("frame too short: {len} bytes")]
    FrameTooShort {
        /// Length of the frame in bytes.
        len: usize,
    },

    /// A packet's declared length runs past the end of the frame.
    #[error("packet {index} truncated: declared {declared} bytes, {available} available")]
    Truncated {
        /// Position of the packet within the frame.
        index: usize,
        /// Length prefix of the packet.
        declared: usize,
        /// Bytes actually left in the frame.
        available: usize,
    },

    /// No layout is registered for a packet of this length.
    #[error("unknown packet length: {0} bytes")]
    UnknownPacketLength(usize),

    /// A layout is registered for a length shorter than the layout reads.
    #[error("packet of {len} bytes is too short for its layout ({need} bytes)")]
    ShortForLayout {
        /// Length of the packet.
        len: usize,
        /// Bytes the layout reads.
        need: usize,
    },

    /// The token's segment byte has no price divisor registered.
    #[error("unknown exchange segment {segment} for token {token}")]
    UnknownSegment {
        /// The instrument token carried by the packet.
        token: u32,
        /// The segment code (low byte of the token).
        segment: u8,
    },

    /// A text frame could not be parsed as a JSON envelope.
    #[error("malformed text frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// All possible errors produced by the ticker client.
#[derive(Debug, thiserror::Error)]
pub enum TickerError {
    /// A websocket-level error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Failed to serialize or deserialize JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error building or parsing a URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// A packet or frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The caller provided an invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The caller named a mode that does not exist.
    #[error("invalid mode: {0:?} (expected \"ltp\", \"quote\" or \"full\")")]
    InvalidMode(String),

    /// The websocket handshake did not complete in time.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// No frame (not even a heartbeat) arrived in time.
    #[error("no data received for {0:?}")]
    ReadTimeout(Duration),

    /// An outbound write did not complete in time.
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// The server pushed an error message on the text channel.
    #[error("server error: {0}")]
    Server(String),

    /// A user callback panicked while an event was being delivered.
    #[error("{category} callback panicked: {message}")]
    CallbackPanic {
        /// The callback slot that panicked (e.g. `"tick"`).
        category: &'static str,
        /// The panic payload, if it was a string.
        message: String,
    },

    /// The reconnect policy gave up.
    #[error("reconnect attempts exhausted after {attempts} attempts")]
    ReconnectExhausted {
        /// Number of reconnect attempts made before giving up.
        attempts: u32,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TickerError>;

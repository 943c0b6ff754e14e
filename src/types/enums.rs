//! Shared enum types for the ticker protocol.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TickerError;

/// Opaque instrument identifier assigned by the exchange data source.
///
/// The low byte encodes the exchange segment (see [`Segment`]).
pub type InstrumentToken = u32;

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Granularity of market data delivered for a subscribed instrument.
///
/// Ordered by increasing payload size: `Ltp < Quote < Full`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Last traded price only.
    Ltp,
    /// LTP, OHLC, volume and buy/sell totals.
    #[default]
    Quote,
    /// Quote plus open interest, timestamps and five-level depth.
    Full,
}

impl Mode {
    /// The string used for this mode on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ltp => "ltp",
            Self::Quote => "quote",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = TickerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ltp" => Ok(Self::Ltp),
            "quote" => Ok(Self::Quote),
            "full" => Ok(Self::Full),
            other => Err(TickerError::InvalidMode(other.to_owned())),
        }
    }
}

// ---------------------------------------------------------------------------
// Exchange Segment
// ---------------------------------------------------------------------------

/// Exchange segment, carried in the low byte of every instrument token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Segment {
    /// NSE cash market (code 1).
    Nse,
    /// NSE futures & options (code 2).
    Nfo,
    /// NSE currency derivatives (code 3).
    Cds,
    /// BSE cash market (code 4).
    Bse,
    /// BSE futures & options (code 5).
    Bfo,
    /// BSE currency derivatives (code 6).
    Bcd,
    /// MCX commodity futures (code 7).
    Mcx,
    /// MCX stock exchange (code 8).
    McxSx,
    /// Indices (code 9). Not tradable.
    Indices,
}

impl Segment {
    /// Returns the numeric segment code used in instrument tokens.
    pub fn code(self) -> u8 {
        match self {
            Self::Nse => 1,
            Self::Nfo => 2,
            Self::Cds => 3,
            Self::Bse => 4,
            Self::Bfo => 5,
            Self::Bcd => 6,
            Self::Mcx => 7,
            Self::McxSx => 8,
            Self::Indices => 9,
        }
    }

    /// Construct from a numeric segment code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Nse),
            2 => Some(Self::Nfo),
            3 => Some(Self::Cds),
            4 => Some(Self::Bse),
            5 => Some(Self::Bfo),
            6 => Some(Self::Bcd),
            7 => Some(Self::Mcx),
            8 => Some(Self::McxSx),
            9 => Some(Self::Indices),
            _ => None,
        }
    }

    /// Segment code of an instrument token (its low byte).
    pub fn code_of(token: InstrumentToken) -> u8 {
        (token & 0xFF) as u8
    }
}

// ---------------------------------------------------------------------------
// Connection State
// ---------------------------------------------------------------------------

/// Lifecycle state of the ticker connection.
///
/// `Disconnected → Connecting → Connected → Reconnecting → (Connecting | Closed)`.
/// [`ConnectionState::next`] is the transition table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// `serve` has not been called yet.
    #[default]
    Disconnected,
    /// Opening the transport and waiting for the handshake.
    Connecting,
    /// Handshake done; frames are being read.
    Connected,
    /// Waiting out a backoff delay before the next connect.
    Reconnecting,
    /// Stopped explicitly or reconnects exhausted.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

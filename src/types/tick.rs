//! Decoded market data snapshot types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{InstrumentToken, Mode, Segment};

/// Day open/high/low/close. `close` is the previous session's close.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Ohlc {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// A single price level of market depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DepthItem {
    /// Quantity pending at this level.
    pub quantity: u32,
    /// Price of this level.
    pub price: f64,
    /// Number of orders at this level.
    pub orders: u16,
}

impl DepthItem {
    /// An all-zero level pads the ladder of an illiquid instrument.
    pub fn is_empty(&self) -> bool {
        self.quantity == 0 && self.orders == 0 && self.price == 0.0
    }
}

/// Bid and ask ladders. Only populated in [`Mode::Full`]; either side may be
/// empty for illiquid instruments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Depth {
    /// Bid side, best first.
    pub buy: Vec<DepthItem>,
    /// Ask side, best first.
    pub sell: Vec<DepthItem>,
}

/// One decoded market snapshot for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Mode implied by the packet layout.
    pub mode: Mode,
    pub instrument_token: InstrumentToken,
    pub segment: Segment,
    /// `false` for indices.
    pub is_tradable: bool,
    pub is_index: bool,
    /// Exchange timestamp (full mode only).
    pub timestamp: Option<DateTime<Utc>>,
    /// Time of the last trade (full mode, tradable instruments only).
    pub last_trade_time: Option<DateTime<Utc>>,
    pub last_price: f64,
    pub last_traded_quantity: u32,
    pub average_trade_price: f64,
    pub volume_traded: u32,
    pub total_buy_quantity: u32,
    pub total_sell_quantity: u32,
    pub ohlc: Ohlc,
    /// Change against the previous close, in percent for tradable
    /// instruments and in points for indices.
    pub net_change: f64,
    pub oi: u32,
    pub oi_day_high: u32,
    pub oi_day_low: u32,
    pub depth: Depth,
}

impl Tick {
    /// An empty tick for `token`, filled in by the codec.
    pub(crate) fn new(mode: Mode, instrument_token: InstrumentToken, segment: Segment) -> Self {
        let is_index = segment == Segment::Indices;
        Self {
            mode,
            instrument_token,
            segment,
            is_tradable: !is_index,
            is_index,
            timestamp: None,
            last_trade_time: None,
            last_price: 0.0,
            last_traded_quantity: 0,
            average_trade_price: 0.0,
            volume_traded: 0,
            total_buy_quantity: 0,
            total_sell_quantity: 0,
            ohlc: Ohlc::default(),
            net_change: 0.0,
            oi: 0,
            oi_day_high: 0,
            oi_day_low: 0,
            depth: Depth::default(),
        }
    }
}

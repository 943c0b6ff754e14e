//! Frame codec for the ticker websocket.
//!
//! Inbound binary frames carry one or more fixed-layout tick packets:
//!
//! ```text
//! [u16 packet count] ( [u16 packet length] [packet bytes] )*
//! ```
//!
//! All integers are big-endian. The packet length selects the layout (and so
//! the mode), and prices are fixed-point integers scaled by a divisor that
//! depends on the exchange segment in the token's low byte. Both tables are
//! held by [`FrameCodec`] and can be replaced for other protocol revisions.
//!
//! Inbound text frames are JSON envelopes (`{"type": "order", "data": {..}}`).
//! Outbound control messages are JSON too, see [`encode_subscribe`],
//! [`encode_unsubscribe`] and [`encode_set_mode`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::limits::HEARTBEAT_FRAME_LEN;
use crate::error::{DecodeError, Result};
use crate::types::{
    Depth, DepthItem, InstrumentToken, Mode, Ohlc, OrderUpdate, Segment, Tick,
};

// ---------------------------------------------------------------------------
// Decoded events
// ---------------------------------------------------------------------------

/// One unit decoded from an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// A market snapshot for one instrument.
    Tick(Tick),
    /// An order lifecycle event from the text channel.
    OrderUpdate(Box<OrderUpdate>),
    /// Keep-alive frame; carries no data.
    Heartbeat,
    /// The server reported an error on the text channel.
    ServerError(String),
    /// An informational message from the server.
    ServerMessage(String),
}

/// Outcome of decoding one packet or text frame.
pub type Decoded = std::result::Result<FeedEvent, DecodeError>;

// ---------------------------------------------------------------------------
// Layout table
// ---------------------------------------------------------------------------

/// Fixed binary layouts a tick packet can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketLayout {
    /// Token + last price (8 bytes).
    Ltp,
    /// Index token + LTP + OHLC + change (28 bytes).
    IndexQuote,
    /// `IndexQuote` + exchange timestamp (32 bytes).
    IndexFull,
    /// Tradable token quote (44 bytes).
    Quote,
    /// `Quote` + timestamps + OI + 5-level depth (184 bytes).
    Full,
}

impl PacketLayout {
    /// The subscription mode this layout is delivered for.
    pub fn mode(self) -> Mode {
        match self {
            Self::Ltp => Mode::Ltp,
            Self::IndexQuote | Self::Quote => Mode::Quote,
            Self::IndexFull | Self::Full => Mode::Full,
        }
    }

    /// Bytes this layout reads from a packet.
    pub fn min_len(self) -> usize {
        match self {
            Self::Ltp => 8,
            Self::IndexQuote => 28,
            Self::IndexFull => 32,
            Self::Quote => 44,
            Self::Full => 184,
        }
    }
}

/// Number of depth levels per side in a full packet.
const DEPTH_LEVELS: usize = 5;

/// Decoder/encoder configured with a packet-length → layout table and a
/// segment → price-divisor table.
///
/// [`FrameCodec::default`] carries the tables of the current Kite protocol.
/// A table miss is reported as a [`DecodeError`] instead of guessing.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    layouts: HashMap<usize, PacketLayout>,
    divisors: HashMap<u8, f64>,
}

impl Default for FrameCodec {
    fn default() -> Self {
        let codec = [
            PacketLayout::Ltp,
            PacketLayout::IndexQuote,
            PacketLayout::IndexFull,
            PacketLayout::Quote,
            PacketLayout::Full,
        ]
        .into_iter()
        .fold(Self::empty(), |codec, layout| {
            codec.with_layout(layout.min_len(), layout)
        });

        [
            (Segment::Nse, 100.0),
            (Segment::Nfo, 100.0),
            (Segment::Cds, 10_000_000.0),
            (Segment::Bse, 100.0),
            (Segment::Bfo, 100.0),
            (Segment::Bcd, 10_000.0),
            (Segment::Mcx, 100.0),
            (Segment::McxSx, 100.0),
            (Segment::Indices, 100.0),
        ]
        .into_iter()
        .fold(codec, |codec, (segment, divisor)| {
            codec.with_divisor(segment.code(), divisor)
        })
    }
}

impl FrameCodec {
    /// A codec with no layouts and no divisors registered.
    pub fn empty() -> Self {
        Self {
            layouts: HashMap::new(),
            divisors: HashMap::new(),
        }
    }

    /// Register (or replace) the layout used for packets of `len` bytes.
    pub fn with_layout(mut self, len: usize, layout: PacketLayout) -> Self {
        self.layouts.insert(len, layout);
        self
    }

    /// Register (or replace) the price divisor for a segment code.
    pub fn with_divisor(mut self, segment: u8, divisor: f64) -> Self {
        self.divisors.insert(segment, divisor);
        self
    }

    /// Layout registered for a packet length.
    pub fn layout_for(&self, len: usize) -> Option<PacketLayout> {
        self.layouts.get(&len).copied()
    }

    /// Divisor registered for a segment code.
    pub fn divisor_for(&self, segment: u8) -> Option<f64> {
        self.divisors.get(&segment).copied()
    }

    /// Decode one inbound frame.
    ///
    /// A frame starting with `{` (after optional whitespace) is a JSON text
    /// envelope, anything else is a binary tick frame. The result holds one
    /// entry per packet in frame order; a bad packet yields an `Err` in its
    /// slot and decoding continues with the next one.
    pub fn decode_frame(&self, data: &[u8]) -> Vec<Decoded> {
        let first = data.iter().find(|b| !b.is_ascii_whitespace());
        if first == Some(&b'{') {
            self.decode_text(data).into_iter().collect()
        } else {
            self.decode_binary(data)
        }
    }

    /// Decode a binary tick frame.
    pub fn decode_binary(&self, data: &[u8]) -> Vec<Decoded> {
        if data.len() == HEARTBEAT_FRAME_LEN {
            return vec![Ok(FeedEvent::Heartbeat)];
        }
        if data.len() < 2 {
            return vec![Err(DecodeError::FrameTooShort { len: data.len() })];
        }

        let mut off = 0usize;
        let count = read_u16_be(data, &mut off) as usize;
        let mut out = Vec::with_capacity(count);

        for index in 0..count {
            if data.len() - off < 2 {
                out.push(Err(DecodeError::Truncated {
                    index,
                    declared: 2,
                    available: data.len() - off,
                }));
                break;
            }
            let declared = read_u16_be(data, &mut off) as usize;
            let available = data.len() - off;
            if declared > available {
                // The length prefixes after this point cannot be trusted.
                out.push(Err(DecodeError::Truncated {
                    index,
                    declared,
                    available,
                }));
                break;
            }

            let packet = &data[off..off + declared];
            off += declared;
            out.push(self.decode_packet(packet).map(FeedEvent::Tick));
        }

        out
    }

    /// Decode a JSON text envelope. Unknown envelope types yield `None`.
    pub fn decode_text(&self, data: &[u8]) -> Option<Decoded> {
        let envelope = match serde_json::from_slice::<TextEnvelope>(data) {
            Ok(envelope) => envelope,
            Err(e) => return Some(Err(DecodeError::Json(e))),
        };

        match envelope.kind.as_str() {
            "order" => Some(
                serde_json::from_value::<OrderUpdate>(envelope.data)
                    .map(|u| FeedEvent::OrderUpdate(Box::new(u)))
                    .map_err(DecodeError::Json),
            ),
            "error" => Some(Ok(FeedEvent::ServerError(text_payload(envelope.data)))),
            "message" => Some(Ok(FeedEvent::ServerMessage(text_payload(envelope.data)))),
            other => {
                tracing::debug!(kind = other, "Ignoring text frame of unknown type");
                None
            }
        }
    }

    /// Decode a single tick packet (without its length prefix).
    pub fn decode_packet(&self, packet: &[u8]) -> std::result::Result<Tick, DecodeError> {
        let layout = self
            .layout_for(packet.len())
            .ok_or(DecodeError::UnknownPacketLength(packet.len()))?;
        if packet.len() < layout.min_len() {
            return Err(DecodeError::ShortForLayout {
                len: packet.len(),
                need: layout.min_len(),
            });
        }

        let mut off = 0usize;
        let token: InstrumentToken = read_u32_be(packet, &mut off);
        let segment_code = Segment::code_of(token);
        let (segment, divisor) = Segment::from_code(segment_code)
            .zip(self.divisor_for(segment_code))
            .ok_or(DecodeError::UnknownSegment {
                token,
                segment: segment_code,
            })?;

        let price = |raw: u32| f64::from(raw) / divisor;
        let mut tick = Tick::new(layout.mode(), token, segment);
        tick.last_price = price(read_u32_be(packet, &mut off));

        match layout {
            PacketLayout::Ltp => {}

            PacketLayout::IndexQuote | PacketLayout::IndexFull => {
                let high = price(read_u32_be(packet, &mut off));
                let low = price(read_u32_be(packet, &mut off));
                let open = price(read_u32_be(packet, &mut off));
                let close = price(read_u32_be(packet, &mut off));
                tick.ohlc = Ohlc {
                    open,
                    high,
                    low,
                    close,
                };
                tick.net_change = price(read_u32_be(packet, &mut off));
                if layout == PacketLayout::IndexFull {
                    tick.timestamp = timestamp(read_u32_be(packet, &mut off));
                }
            }

            PacketLayout::Quote | PacketLayout::Full => {
                tick.last_traded_quantity = read_u32_be(packet, &mut off);
                tick.average_trade_price = price(read_u32_be(packet, &mut off));
                tick.volume_traded = read_u32_be(packet, &mut off);
                tick.total_buy_quantity = read_u32_be(packet, &mut off);
                tick.total_sell_quantity = read_u32_be(packet, &mut off);
                let open = price(read_u32_be(packet, &mut off));
                let high = price(read_u32_be(packet, &mut off));
                let low = price(read_u32_be(packet, &mut off));
                let close = price(read_u32_be(packet, &mut off));
                tick.ohlc = Ohlc {
                    open,
                    high,
                    low,
                    close,
                };
                if close != 0.0 {
                    tick.net_change = (tick.last_price - close) * 100.0 / close;
                }

                if layout == PacketLayout::Full {
                    tick.last_trade_time = timestamp(read_u32_be(packet, &mut off));
                    tick.oi = read_u32_be(packet, &mut off);
                    tick.oi_day_high = read_u32_be(packet, &mut off);
                    tick.oi_day_low = read_u32_be(packet, &mut off);
                    tick.timestamp = timestamp(read_u32_be(packet, &mut off));

                    let read_side = |off: &mut usize| {
                        let mut side: Vec<DepthItem> = (0..DEPTH_LEVELS)
                            .map(|_| {
                                let quantity = read_u32_be(packet, off);
                                let level_price = price(read_u32_be(packet, off));
                                let orders = read_u16_be(packet, off);
                                *off += 2; // padding
                                DepthItem {
                                    quantity,
                                    price: level_price,
                                    orders,
                                }
                            })
                            .collect();
                        while side.last().is_some_and(DepthItem::is_empty) {
                            side.pop();
                        }
                        side
                    };
                    let buy = read_side(&mut off);
                    let sell = read_side(&mut off);
                    tick.depth = Depth { buy, sell };
                }
            }
        }

        Ok(tick)
    }
}

// ---------------------------------------------------------------------------
// Text envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TextEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

fn text_payload(data: serde_json::Value) -> String {
    match data {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Outbound control messages
// ---------------------------------------------------------------------------

/// JSON action envelope sent to the server: `{"a": action, "v": value}`.
#[derive(Debug, Serialize)]
struct ControlMessage<'a, V: Serialize> {
    a: &'a str,
    v: V,
}

/// `{"a":"subscribe","v":[tokens]}`
pub fn encode_subscribe(tokens: &[InstrumentToken]) -> Result<String> {
    Ok(serde_json::to_string(&ControlMessage {
        a: "subscribe",
        v: tokens,
    })?)
}

/// `{"a":"unsubscribe","v":[tokens]}`
pub fn encode_unsubscribe(tokens: &[InstrumentToken]) -> Result<String> {
    Ok(serde_json::to_string(&ControlMessage {
        a: "unsubscribe",
        v: tokens,
    })?)
}

/// `{"a":"mode","v":["full",[tokens]]}`
pub fn encode_set_mode(mode: Mode, tokens: &[InstrumentToken]) -> Result<String> {
    Ok(serde_json::to_string(&ControlMessage {
        a: "mode",
        v: (mode.as_str(), tokens),
    })?)
}

// ---------------------------------------------------------------------------
// Binary readers
// ---------------------------------------------------------------------------

// Callers check the packet length against `PacketLayout::min_len` first, so
// the reads below stay in bounds.

/// Read a big-endian `u16` from `data` at `offset`. Advances `offset` by 2.
#[inline(always)]
fn read_u16_be(data: &[u8], offset: &mut usize) -> u16 {
    let v = u16::from_be_bytes([data[*offset], data[*offset + 1]]);
    *offset += 2;
    v
}

/// Read a big-endian `u32` from `data` at `offset`. Advances `offset` by 4.
#[inline(always)]
fn read_u32_be(data: &[u8], offset: &mut usize) -> u32 {
    let v = u32::from_be_bytes([
        data[*offset],
        data[*offset + 1],
        data[*offset + 2],
        data[*offset + 3],
    ]);
    *offset += 4;
    v
}

/// Epoch seconds to UTC; zero means "not set".
fn timestamp(secs: u32) -> Option<DateTime<Utc>> {
    if secs == 0 {
        return None;
    }
    DateTime::from_timestamp(i64::from(secs), 0)
}

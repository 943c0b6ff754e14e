//! Order update payload pushed on the ticker's text channel.
//!
//! The server sends these independently of any subscription whenever an
//! order placed with the same API key changes state:
//!
//! ```json
//! {"type": "order", "data": {"order_id": "...", "status": "COMPLETE", ...}}
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

use super::enums::InstrumentToken;

/// An order lifecycle event.
///
/// Field names follow the wire format. Every field is optional on the wire;
/// missing fields take their default value and unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderUpdate {
    pub account_id: String,
    pub placed_by: String,

    pub order_id: String,
    pub exchange_order_id: Option<String>,
    pub parent_order_id: Option<String>,
    /// Order status (e.g. `"OPEN"`, `"COMPLETE"`, `"CANCELLED"`, `"REJECTED"`).
    pub status: String,
    pub status_message: Option<String>,
    pub status_message_raw: Option<String>,
    #[serde(deserialize_with = "kite_time")]
    pub order_timestamp: Option<NaiveDateTime>,
    #[serde(deserialize_with = "kite_time")]
    pub exchange_update_timestamp: Option<NaiveDateTime>,
    #[serde(deserialize_with = "kite_time")]
    pub exchange_timestamp: Option<NaiveDateTime>,
    /// Order variety (`"regular"`, `"amo"`, `"co"`, `"iceberg"`, `"auction"`).
    pub variety: String,
    /// Free-form metadata attached by the platform (iceberg legs etc.).
    pub meta: serde_json::Value,

    pub exchange: String,
    #[serde(rename = "tradingsymbol")]
    pub trading_symbol: String,
    pub instrument_token: InstrumentToken,

    pub order_type: String,
    pub transaction_type: String,
    pub validity: String,
    pub validity_ttl: i64,
    pub product: String,
    pub quantity: f64,
    pub disclosed_quantity: f64,
    pub price: f64,
    pub trigger_price: f64,

    pub average_price: f64,
    pub filled_quantity: f64,
    pub pending_quantity: f64,
    pub cancelled_quantity: f64,

    pub tag: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts `null`, `""`, `"2006-01-02"`, `"2006-01-02 15:04:05"` and RFC 3339.
fn kite_time<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    let Some(raw) = raw.filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    for layout in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(&raw, layout) {
            return Ok(Some(t));
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        return Ok(d.and_hms_opt(0, 0, 0));
    }
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| Some(t.naive_local()))
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
}

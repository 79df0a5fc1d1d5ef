use crate::core::types::PriceLevel;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Business code ZB returns on success.
pub const ZB_SUCCESS: i64 = 1000;

/// Code ZB returns when an order query has no rows.
pub const ZB_NO_ORDERS: i64 = 3001;

/// ZB sends some integers as JSON strings and some ids as numbers.
fn flexible_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom(format!("not an integer: {}", n))),
        Value::String(s) => s
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("not an integer: {}", s))),
        other => Err(serde::de::Error::custom(format!("not an integer: {}", other))),
    }
}

fn flexible_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("not an id: {}", other))),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZbDepthFrame {
    pub channel: String,
    pub asks: Vec<PriceLevel>,
    pub bids: Vec<PriceLevel>,
    #[serde(deserialize_with = "flexible_i64")]
    pub timestamp: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZbTapeTrade {
    pub price: Decimal,
    pub amount: Decimal,
    /// Seconds since epoch
    #[serde(deserialize_with = "flexible_i64")]
    pub date: i64,
    #[serde(rename = "type")]
    pub side: String,
    #[serde(default)]
    pub tid: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZbTradesFrame {
    pub channel: String,
    pub data: Vec<ZbTapeTrade>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZbTicker {
    #[serde(default)]
    pub open: Option<Decimal>,
    pub high: Decimal,
    pub low: Decimal,
    pub last: Decimal,
    pub vol: Decimal,
    #[serde(default)]
    pub buy: Option<Decimal>,
    #[serde(default)]
    pub sell: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZbTickerFrame {
    pub channel: String,
    #[serde(deserialize_with = "flexible_i64")]
    pub date: i64,
    pub ticker: ZbTicker,
}

/// Positional order record:
/// `[id, price, quantity, filled, proceeds, sideCode, time, stateCode]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawOrderRecord")]
pub struct ZbOrderRecord {
    pub id: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub filled: Decimal,
    pub proceeds: Decimal,
    pub side_code: i64,
    pub time: i64,
    pub state_code: i64,
}

#[derive(Deserialize)]
struct RawOrderRecord(
    #[serde(deserialize_with = "flexible_string")] String,
    Decimal,
    Decimal,
    Decimal,
    Decimal,
    #[serde(deserialize_with = "flexible_i64")] i64,
    #[serde(deserialize_with = "flexible_i64")] i64,
    #[serde(deserialize_with = "flexible_i64")] i64,
);

impl From<RawOrderRecord> for ZbOrderRecord {
    fn from(raw: RawOrderRecord) -> Self {
        Self {
            id: raw.0,
            price: raw.1,
            quantity: raw.2,
            filled: raw.3,
            proceeds: raw.4,
            side_code: raw.5,
            time: raw.6,
            state_code: raw.7,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZbRecordFrame {
    pub channel: String,
    #[serde(default)]
    pub record: Vec<ZbOrderRecord>,
    #[serde(default)]
    pub hrecord: Vec<ZbOrderRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZbOrderQueryFrame {
    pub channel: String,
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZbCoin {
    pub available: Decimal,
    pub freez: Decimal,
    #[serde(rename = "showName")]
    pub show_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZbAssetFrame {
    pub channel: String,
    pub coins: Vec<ZbCoin>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZbOrderResponse {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(deserialize_with = "flexible_string")]
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZbOpenOrder {
    #[serde(deserialize_with = "flexible_string")]
    pub id: String,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub total_amount: Option<Decimal>,
    #[serde(default)]
    pub trade_amount: Option<Decimal>,
    #[serde(default, rename = "type")]
    pub trade_type: Option<i64>,
}

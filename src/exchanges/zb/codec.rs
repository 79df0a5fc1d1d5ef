use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::{gunzip, WsCodec};
use crate::core::kernel::signer::{canonical_message, CanonicalParams, Signer};
use crate::core::types::{MarketType, PriceLevel};
use crate::exchanges::zb::types::{
    ZbAssetFrame, ZbCoin, ZbDepthFrame, ZbOrderQueryFrame, ZbOrderRecord, ZbRecordFrame,
    ZbTapeTrade, ZbTicker, ZbTickerFrame, ZbTradesFrame, ZB_SUCCESS,
};
use serde_json::{json, Map, Value};
use tracing::debug;

pub const RECORD_CHANNEL: &str = "push_user_record";
pub const ASSET_CHANNEL: &str = "push_user_asset";

/// Decoded ZB push frames
#[derive(Debug, Clone)]
pub enum ZbMessage {
    Depth {
        /// Raw symbol token from the channel, e.g. `eosqc`
        symbol: String,
        asks: Vec<PriceLevel>,
        bids: Vec<PriceLevel>,
        timestamp: i64,
    },
    Trades {
        symbol: String,
        trades: Vec<ZbTapeTrade>,
    },
    Ticker {
        symbol: String,
        ticker: ZbTicker,
        timestamp: i64,
    },
    /// Order-record push; `record` and `hrecord` concatenated
    OrderRecords(Vec<ZbOrderRecord>),
    /// Order query reply; `records` is empty unless `code` is success
    OrderQuery {
        code: i64,
        message: Option<String>,
        records: Vec<ZbOrderRecord>,
    },
    Assets(Vec<ZbCoin>),
}

impl ZbMessage {
    pub fn lane(&self) -> &'static str {
        match self {
            Self::Depth { .. } => "depth",
            Self::Trades { .. } => "trades",
            Self::Ticker { .. } => "ticker",
            Self::OrderRecords(_) | Self::OrderQuery { .. } => "orders",
            Self::Assets(_) => "asset",
        }
    }
}

/// ZB WebSocket codec
///
/// Frames are routed by the last `_`-separated token of their `channel`.
#[derive(Debug, Clone, Default)]
pub struct ZbCodec {
    zipped: bool,
}

impl ZbCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect gzip-compressed binary payloads.
    #[must_use]
    pub fn zipped(mut self, zipped: bool) -> Self {
        self.zipped = zipped;
        self
    }

    pub fn is_zipped(&self) -> bool {
        self.zipped
    }
}

fn parse<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, ExchangeError> {
    serde_json::from_value(value).map_err(ExchangeError::from)
}

impl WsCodec for ZbCodec {
    type Message = ZbMessage;

    fn decode_text(&self, text: &str) -> Result<Option<ZbMessage>, ExchangeError> {
        let value: Value = serde_json::from_str(text)?;
        let Some(channel) = value
            .get("channel")
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            debug!(frame = %text, "frame without channel");
            return Ok(None);
        };

        let tokens: Vec<&str> = channel.split('_').collect();
        let kind = tokens.last().copied().unwrap_or_default();
        let symbol = if tokens.len() >= 2 {
            tokens[tokens.len() - 2].to_string()
        } else {
            String::new()
        };

        let message = match kind {
            "depth" => {
                let frame: ZbDepthFrame = parse(value)?;
                ZbMessage::Depth {
                    symbol,
                    asks: frame.asks,
                    bids: frame.bids,
                    timestamp: frame.timestamp,
                }
            }
            "trades" => {
                let frame: ZbTradesFrame = parse(value)?;
                ZbMessage::Trades {
                    symbol,
                    trades: frame.data,
                }
            }
            "ticker" => {
                let frame: ZbTickerFrame = parse(value)?;
                ZbMessage::Ticker {
                    symbol,
                    ticker: frame.ticker,
                    timestamp: frame.date,
                }
            }
            "record" => {
                let frame: ZbRecordFrame = parse(value)?;
                let mut records = frame.record;
                records.extend(frame.hrecord);
                ZbMessage::OrderRecords(records)
            }
            "getordersignoretradetype" => {
                let frame: ZbOrderQueryFrame = parse(value)?;
                let records = if frame.code == ZB_SUCCESS {
                    parse(frame.data)?
                } else {
                    Vec::new()
                };
                ZbMessage::OrderQuery {
                    code: frame.code,
                    message: frame.message,
                    records,
                }
            }
            "asset" => {
                let frame: ZbAssetFrame = parse(value)?;
                ZbMessage::Assets(frame.coins)
            }
            _ => {
                debug!(%channel, "unhandled channel");
                return Ok(None);
            }
        };

        Ok(Some(message))
    }

    fn decode_binary(&self, data: &[u8]) -> Result<Option<ZbMessage>, ExchangeError> {
        if !self.zipped {
            return Ok(None);
        }
        self.decode_text(&gunzip(data)?)
    }

    fn lane(&self, message: &ZbMessage) -> &'static str {
        message.lane()
    }
}

/// Public channel for a market type on a raw symbol.
pub fn channel_name(raw_symbol: &str, market_type: MarketType) -> String {
    let suffix = match market_type {
        MarketType::Orderbook => "depth",
        MarketType::Trade => "trades",
        MarketType::Kline(_) => "ticker",
    };
    format!("{}_{}", raw_symbol, suffix)
}

pub fn encode_channel_request(raw_symbol: &str, market_type: MarketType) -> Value {
    json!({
        "event": "addChannel",
        "channel": channel_name(raw_symbol, market_type),
    })
}

/// Authenticated subscribe frame. `sign` covers the sorted
/// `{"key":"value",...}` literal of every other field.
pub fn encode_auth_subscription(
    signer: &dyn Signer,
    channel: &str,
    market: Option<&str>,
    zipped: bool,
) -> Value {
    let zip_flag = if zipped { "true" } else { "false" };
    let mut params = CanonicalParams::new();
    params.insert("accesskey".to_string(), signer.access_key().to_string());
    params.insert("binary".to_string(), zip_flag.to_string());
    params.insert("channel".to_string(), channel.to_string());
    params.insert("event".to_string(), "addChannel".to_string());
    params.insert("isZip".to_string(), zip_flag.to_string());
    if let Some(market) = market {
        params.insert("market".to_string(), market.to_string());
    }

    let sign = signer.sign(&canonical_message(&params));

    let mut frame: Map<String, Value> = params
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    frame.insert("sign".to_string(), Value::String(sign));
    Value::Object(frame)
}

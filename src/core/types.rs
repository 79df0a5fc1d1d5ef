use crate::core::errors::ExchangeError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Token that matches any platform or any symbol in a topic key.
pub const WILDCARD: &str = "#";

/// Decimal places used for every order quantity and price we publish.
pub const ORDER_DECIMALS: u32 = 8;

/// Current wall clock time in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Round to `ORDER_DECIMALS` and pin the scale so `Display` always shows all places.
pub fn to_order_scale(value: Decimal) -> Decimal {
    let mut scaled = value.round_dp(ORDER_DECIMALS);
    scaled.rescale(ORDER_DECIMALS);
    scaled
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Limit,
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Submitted,
    PartialFilled,
    Filled,
    Canceled,
    Failed,
}

impl OrderStatus {
    /// No further updates are expected once an order reaches one of these.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Failed)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Submitted => "SUBMITTED",
            Self::PartialFilled => "PARTIAL_FILLED",
            Self::Filled => "FILLED",
            Self::Canceled => "CANCELED",
            Self::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// Candle period carried by kline market types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KlineInterval {
    #[serde(rename = "kline")]
    Minutes1,
    #[serde(rename = "kline_3m")]
    Minutes3,
    #[serde(rename = "kline_5m")]
    Minutes5,
    #[serde(rename = "kline_15m")]
    Minutes15,
    #[serde(rename = "kline_30m")]
    Minutes30,
    #[serde(rename = "kline_1h")]
    Hours1,
    #[serde(rename = "kline_3h")]
    Hours3,
    #[serde(rename = "kline_6h")]
    Hours6,
    #[serde(rename = "kline_12h")]
    Hours12,
    #[serde(rename = "kline_1d")]
    Days1,
    #[serde(rename = "kline_3d")]
    Days3,
    #[serde(rename = "kline_1w")]
    Weeks1,
    #[serde(rename = "kline_15d")]
    Days15,
    #[serde(rename = "kline_1mon")]
    Months1,
    #[serde(rename = "kline_1y")]
    Years1,
}

impl KlineInterval {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minutes1 => "kline",
            Self::Minutes3 => "kline_3m",
            Self::Minutes5 => "kline_5m",
            Self::Minutes15 => "kline_15m",
            Self::Minutes30 => "kline_30m",
            Self::Hours1 => "kline_1h",
            Self::Hours3 => "kline_3h",
            Self::Hours6 => "kline_6h",
            Self::Hours12 => "kline_12h",
            Self::Days1 => "kline_1d",
            Self::Days3 => "kline_3d",
            Self::Weeks1 => "kline_1w",
            Self::Days15 => "kline_15d",
            Self::Months1 => "kline_1mon",
            Self::Years1 => "kline_1y",
        }
    }

    pub fn all() -> [Self; 15] {
        [
            Self::Minutes1,
            Self::Minutes3,
            Self::Minutes5,
            Self::Minutes15,
            Self::Minutes30,
            Self::Hours1,
            Self::Hours3,
            Self::Hours6,
            Self::Hours12,
            Self::Days1,
            Self::Days3,
            Self::Weeks1,
            Self::Days15,
            Self::Months1,
            Self::Years1,
        ]
    }
}

/// Kind of market data a subscription is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketType {
    Orderbook,
    Trade,
    Kline(KlineInterval),
}

impl MarketType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Orderbook => "orderbook",
            Self::Trade => "trade",
            Self::Kline(interval) => interval.as_str(),
        }
    }
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MarketType {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "orderbook" => Ok(Self::Orderbook),
            "trade" => Ok(Self::Trade),
            other => KlineInterval::all()
                .into_iter()
                .find(|interval| interval.as_str() == other)
                .map(Self::Kline)
                .ok_or_else(|| {
                    ExchangeError::InvalidParameters(format!("market_type error: {}", other))
                }),
        }
    }
}

/// One `[price, quantity]` level of a book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel(pub Decimal, pub Decimal);

impl PriceLevel {
    pub fn price(&self) -> Decimal {
        self.0
    }

    pub fn quantity(&self) -> Decimal {
        self.1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orderbook {
    pub platform: String,
    pub symbol: String,
    pub asks: Vec<PriceLevel>,
    pub bids: Vec<PriceLevel>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub platform: String,
    pub symbol: String,
    pub action: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kline {
    pub platform: String,
    pub symbol: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub timestamp: i64,
    pub kline_type: KlineInterval,
}

/// Any canonical market-data entity that travels over the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MarketSnapshot {
    Orderbook(Orderbook),
    Trade(Trade),
    Kline(Kline),
}

impl MarketSnapshot {
    pub fn market_type(&self) -> MarketType {
        match self {
            Self::Orderbook(_) => MarketType::Orderbook,
            Self::Trade(_) => MarketType::Trade,
            Self::Kline(kline) => MarketType::Kline(kline.kline_type),
        }
    }

    pub fn platform(&self) -> &str {
        match self {
            Self::Orderbook(ob) => &ob.platform,
            Self::Trade(trade) => &trade.platform,
            Self::Kline(kline) => &kline.platform,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Self::Orderbook(ob) => &ob.symbol,
            Self::Trade(trade) => &trade.symbol,
            Self::Kline(kline) => &kline.symbol,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Orderbook(ob) => ob.timestamp,
            Self::Trade(trade) => trade.timestamp,
            Self::Kline(kline) => kline.timestamp,
        }
    }

    /// Exact topic this snapshot is published under.
    pub fn topic(&self) -> TopicKey {
        TopicKey::new(self.market_type(), self.platform(), self.symbol())
    }

    /// Encode with the short-key layout used for low-overhead transport.
    pub fn to_compact(&self) -> Result<String, ExchangeError> {
        let compact = match self {
            Self::Orderbook(ob) => compact::CompactSnapshot::Orderbook(ob.clone().into()),
            Self::Trade(trade) => compact::CompactSnapshot::Trade(trade.clone().into()),
            Self::Kline(kline) => compact::CompactSnapshot::Kline(kline.clone().into()),
        };
        serde_json::to_string(&compact).map_err(|e| ExchangeError::SerializationError(e.to_string()))
    }

    pub fn from_compact(data: &str) -> Result<Self, ExchangeError> {
        let compact: compact::CompactSnapshot = serde_json::from_str(data)?;
        Ok(match compact {
            compact::CompactSnapshot::Orderbook(ob) => Self::Orderbook(ob.into()),
            compact::CompactSnapshot::Trade(trade) => Self::Trade(trade.into()),
            compact::CompactSnapshot::Kline(kline) => Self::Kline(kline.into()),
        })
    }

    /// Encode with full field names.
    pub fn to_verbose(&self) -> Result<String, ExchangeError> {
        serde_json::to_string(self).map_err(|e| ExchangeError::SerializationError(e.to_string()))
    }

    pub fn from_verbose(data: &str) -> Result<Self, ExchangeError> {
        Ok(serde_json::from_str(data)?)
    }
}

mod compact {
    use super::{Decimal, KlineInterval, Kline, OrderSide, Orderbook, PriceLevel, Trade};
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    #[serde(tag = "k")]
    pub(super) enum CompactSnapshot {
        #[serde(rename = "orderbook")]
        Orderbook(CompactOrderbook),
        #[serde(rename = "trade")]
        Trade(CompactTrade),
        #[serde(rename = "kline")]
        Kline(CompactKline),
    }

    #[derive(Serialize, Deserialize)]
    pub(super) struct CompactOrderbook {
        p: String,
        s: String,
        a: Vec<PriceLevel>,
        b: Vec<PriceLevel>,
        t: i64,
    }

    #[derive(Serialize, Deserialize)]
    pub(super) struct CompactTrade {
        p: String,
        s: String,
        a: OrderSide,
        #[serde(rename = "P")]
        price: Decimal,
        q: Decimal,
        t: i64,
    }

    #[derive(Serialize, Deserialize)]
    pub(super) struct CompactKline {
        p: String,
        s: String,
        o: Decimal,
        h: Decimal,
        l: Decimal,
        c: Decimal,
        v: Decimal,
        t: i64,
        kt: KlineInterval,
    }

    impl From<Orderbook> for CompactOrderbook {
        fn from(ob: Orderbook) -> Self {
            Self {
                p: ob.platform,
                s: ob.symbol,
                a: ob.asks,
                b: ob.bids,
                t: ob.timestamp,
            }
        }
    }

    impl From<CompactOrderbook> for Orderbook {
        fn from(c: CompactOrderbook) -> Self {
            Self {
                platform: c.p,
                symbol: c.s,
                asks: c.a,
                bids: c.b,
                timestamp: c.t,
            }
        }
    }

    impl From<Trade> for CompactTrade {
        fn from(trade: Trade) -> Self {
            Self {
                p: trade.platform,
                s: trade.symbol,
                a: trade.action,
                price: trade.price,
                q: trade.quantity,
                t: trade.timestamp,
            }
        }
    }

    impl From<CompactTrade> for Trade {
        fn from(c: CompactTrade) -> Self {
            Self {
                platform: c.p,
                symbol: c.s,
                action: c.a,
                price: c.price,
                quantity: c.q,
                timestamp: c.t,
            }
        }
    }

    impl From<Kline> for CompactKline {
        fn from(kline: Kline) -> Self {
            Self {
                p: kline.platform,
                s: kline.symbol,
                o: kline.open,
                h: kline.high,
                l: kline.low,
                c: kline.close,
                v: kline.volume,
                t: kline.timestamp,
                kt: kline.kline_type,
            }
        }
    }

    impl From<CompactKline> for Kline {
        fn from(c: CompactKline) -> Self {
            Self {
                platform: c.p,
                symbol: c.s,
                open: c.o,
                high: c.h,
                low: c.l,
                close: c.c,
                volume: c.v,
                timestamp: c.t,
                kline_type: c.kt,
            }
        }
    }
}

/// `(market_type, platform, symbol)`; platform and symbol may be [`WILDCARD`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicKey {
    pub market_type: MarketType,
    pub platform: String,
    pub symbol: String,
}

impl TopicKey {
    pub fn new(market_type: MarketType, platform: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            market_type,
            platform: platform.into(),
            symbol: symbol.into(),
        }
    }

    pub fn is_multi(&self) -> bool {
        self.platform == WILDCARD || self.symbol == WILDCARD
    }

    /// Every subscription key that should receive a snapshot published under `self`:
    /// exact, any platform, any symbol, and any/any. Duplicates are dropped.
    pub fn fan_out(&self) -> Vec<Self> {
        let candidates = [
            (self.platform.as_str(), self.symbol.as_str()),
            (WILDCARD, self.symbol.as_str()),
            (self.platform.as_str(), WILDCARD),
            (WILDCARD, WILDCARD),
        ];

        let mut keys: Vec<Self> = Vec::with_capacity(candidates.len());
        for (platform, symbol) in candidates {
            let key = Self::new(self.market_type, platform, symbol);
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.market_type, self.platform, self.symbol)
    }
}

/// Live order as seen by the strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub platform: String,
    pub account: String,
    pub strategy: String,
    pub order_id: String,
    pub symbol: String,
    pub action: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
    pub filled: Decimal,
    pub remain: Decimal,
    pub avg_price: Decimal,
    pub status: OrderStatus,
    pub ctime: i64,
    pub utime: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub platform: String,
    pub account: String,
    pub coin: String,
    pub available: Decimal,
    pub frozen: Decimal,
    pub total: Decimal,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn orderbook() -> Orderbook {
        Orderbook {
            platform: "zb".to_string(),
            symbol: "EOS/QC".to_string(),
            asks: vec![PriceLevel(dec("3.1"), dec("10")), PriceLevel(dec("3.2"), dec("4.5"))],
            bids: vec![PriceLevel(dec("3.0"), dec("7"))],
            timestamp: 1_620_000_000_000,
        }
    }

    #[test]
    fn test_compact_orderbook_round_trip() {
        let snapshot = MarketSnapshot::Orderbook(orderbook());
        let encoded = snapshot.to_compact().unwrap();
        assert!(encoded.contains("\"k\":\"orderbook\""));
        assert!(encoded.contains("\"a\":"));
        assert_eq!(MarketSnapshot::from_compact(&encoded).unwrap(), snapshot);
    }

    #[test]
    fn test_compact_trade_uses_capital_price_key() {
        let snapshot = MarketSnapshot::Trade(Trade {
            platform: "zb".to_string(),
            symbol: "EOS/QC".to_string(),
            action: OrderSide::Sell,
            price: dec("3.14"),
            quantity: dec("2"),
            timestamp: 1,
        });
        let encoded = snapshot.to_compact().unwrap();
        assert!(encoded.contains("\"P\":"));
        assert!(encoded.contains("\"a\":\"SELL\""));
        assert_eq!(MarketSnapshot::from_compact(&encoded).unwrap(), snapshot);
    }

    #[test]
    fn test_kline_verbose_and_compact_agree() {
        let snapshot = MarketSnapshot::Kline(Kline {
            platform: "zb".to_string(),
            symbol: "EOS/QC".to_string(),
            open: dec("1"),
            high: dec("2"),
            low: dec("0.5"),
            close: dec("1.5"),
            volume: dec("100"),
            timestamp: 42,
            kline_type: KlineInterval::Minutes5,
        });
        let verbose = MarketSnapshot::from_verbose(&snapshot.to_verbose().unwrap()).unwrap();
        let compact = MarketSnapshot::from_compact(&snapshot.to_compact().unwrap()).unwrap();
        assert_eq!(verbose, compact);
        assert!(snapshot.to_compact().unwrap().contains("\"kt\":\"kline_5m\""));
    }

    #[test]
    fn test_market_type_parse() {
        assert_eq!("orderbook".parse::<MarketType>().unwrap(), MarketType::Orderbook);
        assert_eq!(
            "kline_1mon".parse::<MarketType>().unwrap(),
            MarketType::Kline(KlineInterval::Months1)
        );
        assert!("depth".parse::<MarketType>().is_err());
    }

    #[test]
    fn test_fan_out_has_four_distinct_keys() {
        let key = TopicKey::new(MarketType::Orderbook, "zb", "EOS/QC");
        let keys = key.fan_out();
        assert_eq!(keys.len(), 4);
        assert!(keys.contains(&TopicKey::new(MarketType::Orderbook, WILDCARD, WILDCARD)));
    }

    #[test]
    fn test_order_scale_display() {
        assert_eq!(to_order_scale(dec("10.0")).to_string(), "10.00000000");
        assert_eq!(to_order_scale(dec("0.123456789")).to_string(), "0.12345679");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
        assert!(!OrderStatus::PartialFilled.is_terminal());
        assert!(!OrderStatus::Submitted.is_terminal());
    }
}

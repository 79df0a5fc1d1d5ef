use crate::core::errors::ExchangeError;
use crate::core::kernel::ws::{FrameHandler, SessionHandle, SessionState, WsSender};
use crate::core::runtime::{EventBus, Scheduler};
use crate::core::traits::{ErrorSink, MarketFeed};
use crate::core::types::{KlineInterval, MarketSnapshot, MarketType};
use crate::exchanges::zb::codec::{encode_channel_request, ZbMessage};
use crate::exchanges::zb::conversions::{
    convert_depth, convert_tape_trade, convert_ticker, to_raw_symbol,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Channels {
    requested: Vec<MarketType>,
    sender: Option<WsSender>,
}

impl Channels {
    fn kline_intervals(&self) -> Vec<KlineInterval> {
        self.requested
            .iter()
            .filter_map(|market_type| match market_type {
                MarketType::Kline(interval) => Some(*interval),
                _ => None,
            })
            .collect()
    }
}

/// Turns public ZB pushes for one symbol into bus snapshots.
///
/// Connection lifecycle goes to `errors`: `on_init(true)` each time the
/// session is ready, a `NetworkError` each time it drops.
pub struct ZbMarketHandler {
    platform: String,
    symbol: String,
    raw_symbol: String,
    bus: Arc<EventBus>,
    scheduler: Arc<Scheduler>,
    errors: Arc<dyn ErrorSink>,
    channels: Mutex<Channels>,
}

impl ZbMarketHandler {
    pub fn new(
        platform: impl Into<String>,
        symbol: impl Into<String>,
        bus: Arc<EventBus>,
        scheduler: Arc<Scheduler>,
        errors: Arc<dyn ErrorSink>,
    ) -> Self {
        let symbol = symbol.into();
        Self {
            platform: platform.into(),
            raw_symbol: to_raw_symbol(&symbol),
            symbol,
            bus,
            scheduler,
            errors,
            channels: Mutex::new(Channels::default()),
        }
    }

    pub fn raw_symbol(&self) -> &str {
        &self.raw_symbol
    }

    /// Remember `market_type` and send its subscribe frame if a connection is up.
    ///
    /// Kline intervals share the ticker channel, so only the first one sends.
    pub fn request_channel(&self, market_type: MarketType) -> Result<(), ExchangeError> {
        let mut channels = self.channels.lock();
        if channels.requested.contains(&market_type) {
            return Ok(());
        }
        let already_streaming = channels
            .requested
            .iter()
            .any(|requested| same_channel(*requested, market_type));
        channels.requested.push(market_type);

        match &channels.sender {
            Some(sender) if !already_streaming => {
                sender.send_json(&encode_channel_request(&self.raw_symbol, market_type))
            }
            _ => Ok(()),
        }
    }

    fn canonical_symbol(&self, raw: &str) -> String {
        if raw == self.raw_symbol {
            self.symbol.clone()
        } else {
            raw.to_string()
        }
    }

    fn publish(&self, snapshot: MarketSnapshot) {
        let delivered = self.bus.publish(&snapshot);
        debug!(topic = %snapshot.topic(), delivered, "published");
    }
}

fn same_channel(a: MarketType, b: MarketType) -> bool {
    matches!(
        (a, b),
        (MarketType::Orderbook, MarketType::Orderbook)
            | (MarketType::Trade, MarketType::Trade)
            | (MarketType::Kline(_), MarketType::Kline(_))
    )
}

#[async_trait]
impl FrameHandler<ZbMessage> for ZbMarketHandler {
    async fn on_connected(&self, sender: &WsSender) -> Result<(), ExchangeError> {
        let mut channels = self.channels.lock();
        let mut sent: Vec<MarketType> = Vec::new();
        for market_type in channels.requested.clone() {
            if sent.iter().any(|s| same_channel(*s, market_type)) {
                continue;
            }
            sender.send_json(&encode_channel_request(&self.raw_symbol, market_type))?;
            sent.push(market_type);
        }
        channels.sender = Some(sender.clone());
        Ok(())
    }

    async fn handle(&self, message: ZbMessage) {
        match message {
            ZbMessage::Depth {
                symbol,
                asks,
                bids,
                timestamp,
            } => {
                let symbol = self.canonical_symbol(&symbol);
                let book = convert_depth(&self.platform, &symbol, asks, bids, timestamp);
                self.publish(MarketSnapshot::Orderbook(book));
            }
            ZbMessage::Trades { symbol, trades } => {
                let symbol = self.canonical_symbol(&symbol);
                for trade in &trades {
                    self.publish(MarketSnapshot::Trade(convert_tape_trade(
                        &self.platform,
                        &symbol,
                        trade,
                    )));
                }
            }
            ZbMessage::Ticker {
                symbol,
                ticker,
                timestamp,
            } => {
                let symbol = self.canonical_symbol(&symbol);
                let intervals = self.channels.lock().kline_intervals();
                for interval in intervals {
                    self.publish(MarketSnapshot::Kline(convert_ticker(
                        &self.platform,
                        &symbol,
                        &ticker,
                        timestamp,
                        interval,
                    )));
                }
            }
            other => warn!(lane = other.lane(), "private frame on market session"),
        }
    }

    async fn on_ready(&self) {
        let errors = self.errors.clone();
        self.scheduler
            .run_once(async move { errors.on_init(true).await }, None);
    }

    async fn on_disconnected(&self, error: &ExchangeError) {
        self.channels.lock().sender = None;
        warn!(symbol = %self.symbol, %error, "market session down");
        let errors = self.errors.clone();
        let error = ExchangeError::NetworkError(format!("market session lost: {}", error));
        self.scheduler
            .run_once(async move { errors.on_error(error).await }, None);
    }
}

impl std::fmt::Debug for ZbMarketHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZbMarketHandler")
            .field("platform", &self.platform)
            .field("symbol", &self.symbol)
            .field("channels", &self.channels.lock().requested)
            .finish_non_exhaustive()
    }
}

/// Live public-data connection for one ZB symbol.
pub struct ZbMarketFeed {
    handler: Arc<ZbMarketHandler>,
    session: SessionHandle,
}

impl ZbMarketFeed {
    pub fn new(handler: Arc<ZbMarketHandler>, session: SessionHandle) -> Self {
        Self { handler, session }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }
}

#[async_trait]
impl MarketFeed for ZbMarketFeed {
    fn platform(&self) -> &str {
        &self.handler.platform
    }

    fn symbol(&self) -> &str {
        &self.handler.symbol
    }

    fn state(&self) -> SessionState {
        self.session.state()
    }

    async fn request_channel(&self, market_type: MarketType) -> Result<(), ExchangeError> {
        self.handler.request_channel(market_type)
    }

    async fn close(&self) {
        self.session.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::MarketSink;
    use crate::core::types::{Kline, Orderbook, PriceLevel, TopicKey};
    use crate::exchanges::zb::types::ZbTicker;
    use rust_decimal::Decimal;
    use tokio::sync::mpsc;

    struct Books(mpsc::UnboundedSender<Orderbook>);

    #[async_trait]
    impl MarketSink for Books {
        async fn on_orderbook(&self, orderbook: Orderbook) {
            let _ = self.0.send(orderbook);
        }
    }

    struct Klines(mpsc::UnboundedSender<Kline>);

    #[async_trait]
    impl MarketSink for Klines {
        async fn on_kline(&self, kline: Kline) {
            let _ = self.0.send(kline);
        }
    }

    fn level(price: i64) -> PriceLevel {
        PriceLevel(Decimal::from(price), Decimal::ONE)
    }

    #[derive(Debug, PartialEq)]
    enum Lifecycle {
        Init(bool),
        Error { message: String, retryable: bool },
    }

    struct Lifecycles(mpsc::UnboundedSender<Lifecycle>);

    #[async_trait]
    impl ErrorSink for Lifecycles {
        async fn on_error(&self, error: ExchangeError) {
            let _ = self.0.send(Lifecycle::Error {
                message: error.to_string(),
                retryable: error.is_retryable(),
            });
        }

        async fn on_init(&self, success: bool) {
            let _ = self.0.send(Lifecycle::Init(success));
        }
    }

    fn handler_with(errors: Arc<dyn ErrorSink>) -> ZbMarketHandler {
        let scheduler = Arc::new(Scheduler::new());
        let bus = Arc::new(EventBus::new(scheduler.clone()));
        ZbMarketHandler::new("zb", "EOS/QC", bus, scheduler, errors)
    }

    fn handler() -> ZbMarketHandler {
        let (tx, _rx) = mpsc::unbounded_channel();
        handler_with(Arc::new(Lifecycles(tx)))
    }

    #[tokio::test]
    async fn test_own_depth_published_under_canonical_symbol() {
        let handler = handler();
        let (tx, mut rx) = mpsc::unbounded_channel();
        handler.bus.subscribe(
            TopicKey::new(MarketType::Orderbook, "zb", "EOS/QC"),
            Arc::new(Books(tx)),
        );

        handler
            .handle(ZbMessage::Depth {
                symbol: "eosqc".to_string(),
                asks: vec![level(5), level(4)],
                bids: vec![level(3)],
                timestamp: 1,
            })
            .await;

        let book = rx.recv().await.unwrap();
        assert_eq!(book.symbol, "EOS/QC");
        assert_eq!(book.asks[0].price(), Decimal::from(4));
    }

    #[tokio::test]
    async fn test_ticker_fans_out_per_requested_interval() {
        let handler = handler();
        handler
            .request_channel(MarketType::Kline(KlineInterval::Minutes1))
            .unwrap();
        handler
            .request_channel(MarketType::Kline(KlineInterval::Minutes5))
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        handler.bus.subscribe(
            TopicKey::new(MarketType::Kline(KlineInterval::Minutes5), "#", "#"),
            Arc::new(Klines(tx)),
        );

        handler
            .handle(ZbMessage::Ticker {
                symbol: "eosqc".to_string(),
                ticker: ZbTicker {
                    open: None,
                    high: Decimal::from(3),
                    low: Decimal::ONE,
                    last: Decimal::from(2),
                    vol: Decimal::from(10),
                    buy: None,
                    sell: None,
                },
                timestamp: 7,
            })
            .await;

        let kline = rx.recv().await.unwrap();
        assert_eq!(kline.kline_type, KlineInterval::Minutes5);
        assert_eq!(kline.open, Decimal::from(2));
        assert_eq!(kline.close, Decimal::from(2));
    }

    #[tokio::test]
    async fn test_ready_and_drop_reach_error_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler = handler_with(Arc::new(Lifecycles(tx)));

        handler.on_ready().await;
        assert_eq!(rx.recv().await, Some(Lifecycle::Init(true)));

        handler
            .on_disconnected(&ExchangeError::NetworkError("stream ended".to_string()))
            .await;
        match rx.recv().await {
            Some(Lifecycle::Error { message, retryable }) => {
                assert!(message.contains("market session lost"));
                assert!(retryable);
            }
            other => panic!("expected network error, got {:?}", other),
        }
        assert!(handler.channels.lock().sender.is_none());
    }

    #[test]
    fn test_klines_share_one_channel() {
        assert!(same_channel(
            MarketType::Kline(KlineInterval::Minutes1),
            MarketType::Kline(KlineInterval::Days1)
        ));
        assert!(!same_channel(MarketType::Orderbook, MarketType::Trade));
    }
}

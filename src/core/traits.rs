use crate::core::{
    config::{MarketParams, TradeParams},
    errors::ExchangeError,
    kernel::ws::SessionState,
    runtime::Runtime,
    types::{Asset, Kline, MarketType, Order, OrderSide, OrderType, Orderbook, Trade},
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

/// Receives canonical market data from the event bus.
///
/// Every method defaults to a no-op so a subscriber implements only what it
/// listens for.
#[async_trait]
pub trait MarketSink: Send + Sync {
    async fn on_orderbook(&self, _orderbook: Orderbook) {}

    async fn on_trade(&self, _trade: Trade) {}

    async fn on_kline(&self, _kline: Kline) {}
}

/// Receives reconciled order and asset snapshots for one trading connection.
#[async_trait]
pub trait OrderSink: Send + Sync {
    async fn on_order_update(&self, order: Order);

    async fn on_asset_update(&self, _asset: Asset) {}
}

/// Receives lifecycle and failure notifications.
#[async_trait]
pub trait ErrorSink: Send + Sync {
    async fn on_error(&self, error: ExchangeError);

    /// `true` each time the connection becomes ready, `false` when setup fails.
    async fn on_init(&self, _success: bool) {}
}

/// Sinks a trading connection reports to.
#[derive(Clone)]
pub struct TradeSinks {
    pub orders: Arc<dyn OrderSink>,
    pub errors: Arc<dyn ErrorSink>,
}

impl TradeSinks {
    pub fn new(orders: Arc<dyn OrderSink>, errors: Arc<dyn ErrorSink>) -> Self {
        Self { orders, errors }
    }
}

/// Outcome of cancelling several orders one by one.
#[derive(Debug, Default)]
pub struct RevokeReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, ExchangeError)>,
}

impl RevokeReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Live market-data connection for one `(platform, symbol)`.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    fn platform(&self) -> &str;

    fn symbol(&self) -> &str;

    fn state(&self) -> SessionState;

    /// Ask the exchange to start streaming `market_type`. Remembered across reconnects.
    async fn request_channel(&self, market_type: MarketType) -> Result<(), ExchangeError>;

    async fn close(&self);
}

/// Live trading connection for one `(platform, account, symbol)`.
#[async_trait]
pub trait TradeApi: Send + Sync {
    fn platform(&self) -> &str;

    fn symbol(&self) -> &str;

    fn state(&self) -> SessionState;

    /// Place an order and return the exchange-assigned id.
    async fn create_order(
        &self,
        action: OrderSide,
        price: Decimal,
        quantity: Decimal,
        order_type: OrderType,
    ) -> Result<String, ExchangeError>;

    async fn revoke_order(&self, order_id: &str) -> Result<String, ExchangeError>;

    async fn revoke_orders(&self, order_ids: &[String]) -> RevokeReport;

    /// Cancel every open order on the symbol.
    async fn revoke_all(&self) -> Result<(), ExchangeError>;

    async fn get_open_order_ids(&self) -> Result<Vec<String>, ExchangeError>;

    /// Copy of the live order table.
    fn orders(&self) -> HashMap<String, Order>;

    /// Copy of the live asset table keyed by coin.
    fn assets(&self) -> HashMap<String, Asset>;

    async fn close(&self);
}

/// One exchange implementation: REST, session and reconciler wiring behind a
/// fixed interface. Registered by platform name in the exchange registry.
pub trait ExchangeConnector: Send + Sync {
    fn platform(&self) -> &'static str;

    /// `errors` hears `on_init(true)` on every ready connection and a
    /// `NetworkError` on every drop.
    fn connect_market(
        &self,
        params: MarketParams,
        runtime: &Runtime,
        errors: Arc<dyn ErrorSink>,
    ) -> Result<Box<dyn MarketFeed>, ExchangeError>;

    fn connect_trade(
        &self,
        params: TradeParams,
        runtime: &Runtime,
        sinks: TradeSinks,
    ) -> Result<Box<dyn TradeApi>, ExchangeError>;
}

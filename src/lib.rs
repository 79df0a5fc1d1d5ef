pub mod connectivity;
pub mod core;
pub mod exchanges;
pub mod utils;

pub use connectivity::{Market, Trade};
pub use crate::core::{
    config::{ExchangeConfig, MarketParams, TradeParams},
    errors::ExchangeError,
    runtime::Runtime,
    traits::{ErrorSink, ExchangeConnector, MarketSink, OrderSink, TradeSinks},
    types::{
        Asset, Kline, KlineInterval, MarketSnapshot, MarketType, Order, OrderSide, OrderStatus,
        OrderType, Orderbook, PriceLevel, TopicKey, WILDCARD,
    },
};
/// The market-data trade print; `Trade` at the crate root is the trading facade.
pub use crate::core::types::Trade as MarketTrade;
pub use exchanges::zb::ZbConnector;
pub use utils::ExchangeRegistry;

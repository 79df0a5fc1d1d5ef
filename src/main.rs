use async_trait::async_trait;
use quantlink::{
    ErrorSink, ExchangeConfig, ExchangeError, ExchangeRegistry, Market, MarketParams, MarketSink,
    MarketType, Orderbook, Runtime,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SYMBOL: &str = "EOS/QC";

/// Logs the top of every book it receives.
struct TopOfBook;

#[async_trait]
impl MarketSink for TopOfBook {
    async fn on_orderbook(&self, orderbook: Orderbook) {
        let best_ask = orderbook.asks.first();
        let best_bid = orderbook.bids.first();
        info!(
            symbol = %orderbook.symbol,
            ask = ?best_ask.map(|level| (level.price(), level.quantity())),
            bid = ?best_bid.map(|level| (level.price(), level.quantity())),
            "orderbook"
        );
    }
}

#[async_trait]
impl ErrorSink for TopOfBook {
    async fn on_error(&self, error: ExchangeError) {
        warn!(error = %error, retryable = error.is_retryable(), "market feed error");
    }

    async fn on_init(&self, success: bool) {
        info!(success, "market feed ready");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Public data needs no credentials; only the WebSocket URL override is read.
    #[cfg(feature = "env-file")]
    let loaded = ExchangeConfig::from_env_file("ZB");
    #[cfg(not(feature = "env-file"))]
    let loaded = ExchangeConfig::from_env("ZB");

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "ZB credentials not set, continuing read-only");
            ExchangeConfig::read_only()
        }
    };

    let runtime = Runtime::new();
    let registry = ExchangeRegistry::with_defaults();

    let mut params = MarketParams::new("zb", SYMBOL, MarketType::Orderbook);
    if let Some(ws_url) = config.ws_url.clone() {
        params = params.ws_url(ws_url);
    }
    let top_of_book = Arc::new(TopOfBook);
    let market = Market::new(
        params,
        &runtime,
        &registry,
        top_of_book.clone(),
        top_of_book,
    )?;

    let heartbeat_runtime = runtime.clone();
    runtime.scheduler.run_periodic(Duration::from_secs(10), move || {
        let bus = heartbeat_runtime.bus.clone();
        async move {
            info!(subscriptions = bus.subscription_count(), "heartbeat");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    market.close().await;
    runtime.shutdown();
    Ok(())
}

use crate::core::config::{MarketParams, TradeParams};
use crate::core::errors::ExchangeError;
use crate::core::kernel::ws::{WsConfig, WsSession};
use crate::core::reconciler::{Reconciler, ReconcilerScope};
use crate::core::runtime::Runtime;
use crate::core::traits::{ErrorSink, ExchangeConnector, MarketFeed, TradeApi, TradeSinks};
use crate::exchanges::zb::builder::{build_rest, DEFAULT_WSS};
use crate::exchanges::zb::codec::ZbCodec;
use crate::exchanges::zb::conversions::to_raw_symbol;
use crate::exchanges::zb::rest::ZbRestClient;
use crate::exchanges::zb::signer::ZbSigner;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub mod market_data;
pub mod trading;

pub use market_data::{ZbMarketFeed, ZbMarketHandler};
pub use trading::{ZbTradeHandler, ZbTrading};

pub const PLATFORM: &str = "zb";

/// Wires ZB REST, sessions and reconciler behind [`ExchangeConnector`].
///
/// Sessions are spawned onto the current tokio runtime.
#[derive(Debug, Clone)]
pub struct ZbConnector {
    ws_config: WsConfig,
    rest_timeout: Duration,
    zipped: bool,
}

impl Default for ZbConnector {
    fn default() -> Self {
        Self {
            ws_config: WsConfig::default(),
            rest_timeout: Duration::from_secs(10),
            zipped: false,
        }
    }
}

impl ZbConnector {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_ws_config(mut self, ws_config: WsConfig) -> Self {
        self.ws_config = ws_config;
        self
    }

    #[must_use]
    pub fn with_rest_timeout(mut self, timeout: Duration) -> Self {
        self.rest_timeout = timeout;
        self
    }

    /// Ask for gzip-compressed private pushes.
    #[must_use]
    pub fn with_zipped(mut self, zipped: bool) -> Self {
        self.zipped = zipped;
        self
    }
}

impl ExchangeConnector for ZbConnector {
    fn platform(&self) -> &'static str {
        PLATFORM
    }

    fn connect_market(
        &self,
        params: MarketParams,
        runtime: &Runtime,
        errors: Arc<dyn ErrorSink>,
    ) -> Result<Box<dyn MarketFeed>, ExchangeError> {
        params.validate()?;

        let handler = Arc::new(ZbMarketHandler::new(
            params.platform.clone(),
            params.symbol.clone(),
            runtime.bus.clone(),
            runtime.scheduler.clone(),
            errors,
        ));
        handler.request_channel(params.market_type)?;

        let url = params.ws_url.unwrap_or_else(|| DEFAULT_WSS.to_string());
        info!(symbol = %params.symbol, %url, "starting market session");
        let session = WsSession::spawn(
            format!("{}.market.{}", PLATFORM, handler.raw_symbol()),
            url,
            self.ws_config.clone(),
            ZbCodec::new(),
            handler.clone(),
            runtime.scheduler.clone(),
        );

        Ok(Box::new(ZbMarketFeed::new(handler, session)))
    }

    fn connect_trade(
        &self,
        params: TradeParams,
        runtime: &Runtime,
        sinks: TradeSinks,
    ) -> Result<Box<dyn TradeApi>, ExchangeError> {
        params.validate()?;

        let rest = build_rest(&params.config, self.rest_timeout)?;
        let signer = Arc::new(ZbSigner::new(
            params.config.api_key().to_string(),
            params.config.secret_key(),
        ));

        let reconciler = Arc::new(Reconciler::new(
            ReconcilerScope {
                platform: params.platform.clone(),
                account: params.account.clone(),
                strategy: params.strategy.clone(),
                symbol: params.symbol.clone(),
            },
            runtime.scheduler.clone(),
            sinks.orders.clone(),
            sinks.errors.clone(),
        ));

        let handler = Arc::new(ZbTradeHandler::new(
            signer,
            &params.symbol,
            self.zipped,
            reconciler.clone(),
            runtime.scheduler.clone(),
            sinks.errors,
        ));

        let url = params
            .config
            .ws_url
            .clone()
            .unwrap_or_else(|| DEFAULT_WSS.to_string());
        info!(account = %params.account, symbol = %params.symbol, %url, "starting trade session");
        let session = WsSession::spawn(
            format!(
                "{}.trade.{}.{}",
                PLATFORM,
                params.account,
                to_raw_symbol(&params.symbol)
            ),
            url,
            self.ws_config.clone(),
            ZbCodec::new().zipped(self.zipped),
            handler,
            runtime.scheduler.clone(),
        );

        Ok(Box::new(ZbTrading::new(
            params.platform,
            params.symbol,
            ZbRestClient::new(rest),
            reconciler,
            session,
        )))
    }
}

use crate::connectivity::report_setup_failure;
use crate::core::config::TradeParams;
use crate::core::errors::ExchangeError;
use crate::core::kernel::ws::SessionState;
use crate::core::runtime::Runtime;
use crate::core::traits::{RevokeReport, TradeApi, TradeSinks};
use crate::core::types::{Asset, Order, OrderSide, OrderType};
use crate::utils::ExchangeRegistry;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::error;

/// Strategy-side trading connection for one `(platform, account, symbol)`.
pub struct Trade {
    api: Box<dyn TradeApi>,
}

impl Trade {
    /// Connect through the registered connector for `params.platform`.
    ///
    /// A setup failure is returned and also scheduled for the error sink,
    /// followed by `on_init(false)`.
    pub fn new(
        params: TradeParams,
        runtime: &Runtime,
        registry: &ExchangeRegistry,
        sinks: TradeSinks,
    ) -> Result<Self, ExchangeError> {
        let errors = sinks.errors.clone();
        let connected = params
            .validate()
            .map_err(ExchangeError::from)
            .and_then(|()| registry.get(&params.platform).map_err(ExchangeError::from))
            .and_then(|connector| connector.connect_trade(params, runtime, sinks));

        match connected {
            Ok(api) => Ok(Self { api }),
            Err(e) => {
                error!(error = %e, "trade setup failed");
                report_setup_failure(runtime, errors, e.clone());
                Err(e)
            }
        }
    }

    pub fn api(&self) -> &dyn TradeApi {
        self.api.as_ref()
    }

    pub fn platform(&self) -> &str {
        self.api.platform()
    }

    pub fn symbol(&self) -> &str {
        self.api.symbol()
    }

    pub fn state(&self) -> SessionState {
        self.api.state()
    }

    pub async fn create_order(
        &self,
        action: OrderSide,
        price: Decimal,
        quantity: Decimal,
        order_type: OrderType,
    ) -> Result<String, ExchangeError> {
        self.api
            .create_order(action, price, quantity, order_type)
            .await
    }

    pub async fn revoke_order(&self, order_id: &str) -> Result<String, ExchangeError> {
        self.api.revoke_order(order_id).await
    }

    pub async fn revoke_orders(&self, order_ids: &[String]) -> RevokeReport {
        self.api.revoke_orders(order_ids).await
    }

    pub async fn revoke_all(&self) -> Result<(), ExchangeError> {
        self.api.revoke_all().await
    }

    pub async fn get_open_order_ids(&self) -> Result<Vec<String>, ExchangeError> {
        self.api.get_open_order_ids().await
    }

    pub fn orders(&self) -> HashMap<String, Order> {
        self.api.orders()
    }

    pub fn assets(&self) -> HashMap<String, Asset> {
        self.api.assets()
    }

    pub async fn close(&self) {
        self.api.close().await;
    }
}

impl std::fmt::Debug for Trade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trade")
            .field("platform", &self.api.platform())
            .field("symbol", &self.api.symbol())
            .finish_non_exhaustive()
    }
}

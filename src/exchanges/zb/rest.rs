use crate::core::errors::ExchangeError;
use crate::core::kernel::RestClient;
use crate::core::types::{KlineInterval, OrderSide};
use crate::exchanges::zb::conversions::{to_rest_symbol, trade_type_code};
use crate::exchanges::zb::types::{ZbOpenOrder, ZbOrderResponse, ZB_NO_ORDERS};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::warn;

/// Page size for open-order queries; more than this is logged.
pub const OPEN_ORDERS_PAGE_SIZE: usize = 100;

/// Thin typed wrapper around `RestClient` for the ZB API
///
/// Symbols are canonical (`EOS/QC`) on the way in.
pub struct ZbRestClient<R: RestClient> {
    client: R,
}

impl<R: RestClient> ZbRestClient<R> {
    pub fn new(client: R) -> Self {
        Self { client }
    }

    pub fn inner(&self) -> &R {
        &self.client
    }

    /// Every market with its precision settings
    pub async fn get_exchange_info(&self) -> Result<Value, ExchangeError> {
        self.client.get("/data/v1/markets", &[], false).await
    }

    pub async fn get_orderbook(&self, symbol: &str, size: u32) -> Result<Value, ExchangeError> {
        let market = to_rest_symbol(symbol);
        let size = size.to_string();
        let params = [("market", market.as_str()), ("size", size.as_str())];
        self.client.get("/data/v1/depth", &params, false).await
    }

    pub async fn get_trades(&self, symbol: &str) -> Result<Value, ExchangeError> {
        let market = to_rest_symbol(symbol);
        self.client
            .get("/data/v1/trades", &[("market", market.as_str())], false)
            .await
    }

    pub async fn get_ticker(&self, symbol: &str) -> Result<Value, ExchangeError> {
        let market = to_rest_symbol(symbol);
        self.client
            .get("/data/v1/ticker", &[("market", market.as_str())], false)
            .await
    }

    pub async fn get_kline(
        &self,
        symbol: &str,
        interval: KlineInterval,
        size: Option<u32>,
    ) -> Result<Value, ExchangeError> {
        let market = to_rest_symbol(symbol);
        let kline_type = kline_type(interval).ok_or_else(|| {
            ExchangeError::InvalidParameters(format!("unsupported kline type: {}", interval.as_str()))
        })?;
        let size = size.unwrap_or(1000).to_string();
        let params = [
            ("market", market.as_str()),
            ("type", kline_type),
            ("size", size.as_str()),
        ];
        self.client.get("/data/v1/kline", &params, false).await
    }

    /// Account info including per-coin balances (requires authentication)
    pub async fn get_account_balance(&self) -> Result<Value, ExchangeError> {
        self.client
            .get("/api/getAccountInfo", &[("method", "getAccountInfo")], true)
            .await
    }

    /// Place a limit order (requires authentication)
    pub async fn create_order(
        &self,
        symbol: &str,
        side: OrderSide,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<ZbOrderResponse, ExchangeError> {
        let currency = to_rest_symbol(symbol);
        let price = price.normalize().to_string();
        let amount = quantity.normalize().to_string();
        let params = [
            ("acctType", "0"),
            ("amount", amount.as_str()),
            ("currency", currency.as_str()),
            ("method", "order"),
            ("price", price.as_str()),
            ("tradeType", trade_type_code(side)),
        ];
        let body = self.client.post("/api/order", &params, true).await?;
        serde_json::from_value(body).map_err(ExchangeError::from)
    }

    /// Cancel one order (requires authentication)
    pub async fn revoke_order(&self, symbol: &str, order_id: &str) -> Result<Value, ExchangeError> {
        let currency = to_rest_symbol(symbol);
        let params = [
            ("currency", currency.as_str()),
            ("id", order_id),
            ("method", "cancelOrder"),
        ];
        self.client.post("/api/cancelOrder", &params, true).await
    }

    /// Open orders on `symbol`, both sides, first page only.
    ///
    /// The exchange reports "no orders" as a business error; that comes back
    /// as an empty list.
    pub async fn get_open_orders(&self, symbol: &str) -> Result<Vec<ZbOpenOrder>, ExchangeError> {
        let currency = to_rest_symbol(symbol);
        let page_size = OPEN_ORDERS_PAGE_SIZE.to_string();
        let params = [
            ("currency", currency.as_str()),
            ("method", "getUnfinishedOrdersIgnoreTradeType"),
            ("pageIndex", "1"),
            ("pageSize", page_size.as_str()),
        ];

        let orders: Vec<ZbOpenOrder> = match self
            .client
            .get_json("/api/getUnfinishedOrdersIgnoreTradeType", &params, true)
            .await
        {
            Ok(orders) => orders,
            Err(ExchangeError::BusinessError { code, .. }) if code == ZB_NO_ORDERS => Vec::new(),
            Err(e) => return Err(e),
        };

        if orders.len() >= OPEN_ORDERS_PAGE_SIZE {
            warn!(symbol, count = orders.len(), "open orders may exceed one page");
        }
        Ok(orders)
    }

    /// Single order detail (requires authentication)
    pub async fn get_order_status(
        &self,
        symbol: &str,
        order_id: &str,
    ) -> Result<Value, ExchangeError> {
        let currency = to_rest_symbol(symbol);
        let params = [
            ("currency", currency.as_str()),
            ("id", order_id),
            ("method", "getOrder"),
        ];
        self.client.get("/api/getOrder", &params, true).await
    }
}

/// REST candle period; ZB has no 3h, 15d, monthly or yearly candles.
fn kline_type(interval: KlineInterval) -> Option<&'static str> {
    match interval {
        KlineInterval::Minutes1 => Some("1min"),
        KlineInterval::Minutes3 => Some("3min"),
        KlineInterval::Minutes5 => Some("5min"),
        KlineInterval::Minutes15 => Some("15min"),
        KlineInterval::Minutes30 => Some("30min"),
        KlineInterval::Hours1 => Some("1hour"),
        KlineInterval::Hours6 => Some("6hour"),
        KlineInterval::Hours12 => Some("12hour"),
        KlineInterval::Days1 => Some("1day"),
        KlineInterval::Days3 => Some("3day"),
        KlineInterval::Weeks1 => Some("1week"),
        KlineInterval::Hours3
        | KlineInterval::Days15
        | KlineInterval::Months1
        | KlineInterval::Years1 => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use reqwest::Method;
    use serde_json::json;

    /// Records calls and answers with a canned result.
    struct Canned {
        calls: Mutex<Vec<(Method, String, Vec<(String, String)>, bool)>>,
        reply: Result<Value, ExchangeError>,
    }

    impl Canned {
        fn new(reply: Result<Value, ExchangeError>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                reply,
            }
        }
    }

    #[async_trait]
    impl RestClient for Canned {
        async fn request(
            &self,
            method: Method,
            endpoint: &str,
            params: &[(&str, &str)],
            authenticated: bool,
        ) -> Result<Value, ExchangeError> {
            self.calls.lock().push((
                method,
                endpoint.to_string(),
                params
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
                authenticated,
            ));
            self.reply.clone()
        }
    }

    #[tokio::test]
    async fn test_create_order_params() {
        let rest = ZbRestClient::new(Canned::new(Ok(
            json!({"code": 1000, "message": "ok", "id": "20180522105585216"}),
        )));
        let response = rest
            .create_order("EOS/QC", OrderSide::Sell, "3.50".parse().unwrap(), "2".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(response.id, "20180522105585216");

        let calls = rest.inner().calls.lock();
        let (method, endpoint, params, authenticated) = &calls[0];
        assert_eq!(*method, Method::POST);
        assert_eq!(endpoint, "/api/order");
        assert!(*authenticated);
        assert!(params.contains(&("currency".to_string(), "eos_qc".to_string())));
        assert!(params.contains(&("tradeType".to_string(), "0".to_string())));
        assert!(params.contains(&("price".to_string(), "3.5".to_string())));
    }

    #[tokio::test]
    async fn test_unsupported_kline_type_is_rejected() {
        let rest = ZbRestClient::new(Canned::new(Ok(json!({}))));
        let err = rest
            .get_kline("EOS/QC", KlineInterval::Months1, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidParameters(_)));
        assert!(rest.inner().calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_no_orders_code_is_empty_list() {
        let rest = ZbRestClient::new(Canned::new(Err(ExchangeError::BusinessError {
            code: ZB_NO_ORDERS,
            message: "none".to_string(),
            body: json!({"code": 3001}),
        })));
        assert!(rest.get_open_orders("EOS/QC").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_business_errors_propagate() {
        let rest = ZbRestClient::new(Canned::new(Err(ExchangeError::BusinessError {
            code: 2009,
            message: "insufficient".to_string(),
            body: json!({"code": 2009}),
        })));
        let err = rest.get_open_orders("EOS/QC").await.unwrap_err();
        assert!(matches!(err, ExchangeError::BusinessError { code: 2009, .. }));
    }

    #[tokio::test]
    async fn test_open_orders_parse() {
        let rest = ZbRestClient::new(Canned::new(Ok(json!([
            {"id": "1", "price": 3.5, "total_amount": 2, "trade_amount": 0, "type": 1},
            {"id": 2, "type": 0}
        ]))));
        let orders = rest.get_open_orders("EOS/QC").await.unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[1].id, "2");
    }
}

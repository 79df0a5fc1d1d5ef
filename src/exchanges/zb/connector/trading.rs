use crate::core::errors::ExchangeError;
use crate::core::kernel::signer::Signer;
use crate::core::kernel::ws::{FrameHandler, SessionHandle, SessionState, WsSender};
use crate::core::kernel::RestClient;
use crate::core::reconciler::Reconciler;
use crate::core::runtime::Scheduler;
use crate::core::traits::{ErrorSink, RevokeReport, TradeApi};
use crate::core::types::{Asset, Order, OrderSide, OrderType};
use crate::exchanges::zb::codec::{
    encode_auth_subscription, ZbMessage, ASSET_CHANNEL, RECORD_CHANNEL,
};
use crate::exchanges::zb::conversions::{convert_coin, convert_order_record, to_raw_symbol};
use crate::exchanges::zb::rest::ZbRestClient;
use crate::exchanges::zb::types::{ZbOrderRecord, ZB_SUCCESS};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Private ZB pushes for one account and symbol, fed into a [`Reconciler`].
pub struct ZbTradeHandler {
    signer: Arc<dyn Signer>,
    raw_symbol: String,
    zipped: bool,
    reconciler: Arc<Reconciler>,
    scheduler: Arc<Scheduler>,
    errors: Arc<dyn ErrorSink>,
}

impl ZbTradeHandler {
    pub fn new(
        signer: Arc<dyn Signer>,
        symbol: &str,
        zipped: bool,
        reconciler: Arc<Reconciler>,
        scheduler: Arc<Scheduler>,
        errors: Arc<dyn ErrorSink>,
    ) -> Self {
        Self {
            signer,
            raw_symbol: to_raw_symbol(symbol),
            zipped,
            reconciler,
            scheduler,
            errors,
        }
    }

    fn apply_records(&self, records: &[ZbOrderRecord]) {
        for record in records {
            let result = convert_order_record(record)
                .and_then(|update| self.reconciler.apply_order(update));
            if let Err(e) = result {
                error!(?record, error = %e, "order record dropped");
            }
        }
    }
}

#[async_trait]
impl FrameHandler<ZbMessage> for ZbTradeHandler {
    fn requires_auth(&self) -> bool {
        true
    }

    async fn on_connected(&self, sender: &WsSender) -> Result<(), ExchangeError> {
        let market = format!("{}default", self.raw_symbol);
        sender.send_json(&encode_auth_subscription(
            self.signer.as_ref(),
            RECORD_CHANNEL,
            Some(&market),
            self.zipped,
        ))?;
        sender.send_json(&encode_auth_subscription(
            self.signer.as_ref(),
            ASSET_CHANNEL,
            None,
            self.zipped,
        ))
    }

    async fn on_ready(&self) {
        let errors = self.errors.clone();
        self.scheduler
            .run_once(async move { errors.on_init(true).await }, None);
    }

    async fn handle(&self, message: ZbMessage) {
        match message {
            ZbMessage::OrderRecords(records) => self.apply_records(&records),
            ZbMessage::OrderQuery {
                code,
                message,
                records,
            } => {
                if code != ZB_SUCCESS {
                    warn!(code, message = ?message, "order query failed");
                    return;
                }
                self.apply_records(&records);
            }
            ZbMessage::Assets(coins) => {
                for coin in &coins {
                    self.reconciler.apply_asset(convert_coin(coin));
                }
            }
            other => warn!(lane = other.lane(), "public frame on trade session"),
        }
    }

    async fn on_disconnected(&self, error: &ExchangeError) {
        self.reconciler
            .report(ExchangeError::NetworkError(format!("trade session lost: {}", error)));
    }
}

/// Trading connection for one ZB account and symbol.
///
/// Every failed call is returned to the caller and also reported to the
/// error sink.
pub struct ZbTrading<R: RestClient> {
    platform: String,
    symbol: String,
    rest: ZbRestClient<R>,
    reconciler: Arc<Reconciler>,
    session: SessionHandle,
}

impl<R: RestClient> ZbTrading<R> {
    pub fn new(
        platform: impl Into<String>,
        symbol: impl Into<String>,
        rest: ZbRestClient<R>,
        reconciler: Arc<Reconciler>,
        session: SessionHandle,
    ) -> Self {
        Self {
            platform: platform.into(),
            symbol: symbol.into(),
            rest,
            reconciler,
            session,
        }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    fn reported<T>(&self, result: Result<T, ExchangeError>) -> Result<T, ExchangeError> {
        if let Err(e) = &result {
            self.reconciler.report(e.clone());
        }
        result
    }
}

#[async_trait]
impl<R: RestClient + 'static> TradeApi for ZbTrading<R> {
    fn platform(&self) -> &str {
        &self.platform
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn state(&self) -> SessionState {
        self.session.state()
    }

    #[instrument(skip(self), fields(exchange = %self.platform, symbol = %self.symbol))]
    async fn create_order(
        &self,
        action: OrderSide,
        price: Decimal,
        quantity: Decimal,
        order_type: OrderType,
    ) -> Result<String, ExchangeError> {
        if order_type == OrderType::Market {
            return self.reported(Err(ExchangeError::InvalidParameters(
                "zb supports LIMIT orders only".to_string(),
            )));
        }

        let result = self
            .rest
            .create_order(&self.symbol, action, price, quantity)
            .await
            .map(|response| response.id);
        if let Ok(id) = &result {
            info!(order_id = %id, %action, %price, %quantity, "order created");
        }
        self.reported(result)
    }

    #[instrument(skip(self), fields(exchange = %self.platform, symbol = %self.symbol))]
    async fn revoke_order(&self, order_id: &str) -> Result<String, ExchangeError> {
        let result = self
            .rest
            .revoke_order(&self.symbol, order_id)
            .await
            .map(|_| order_id.to_string());
        self.reported(result)
    }

    async fn revoke_orders(&self, order_ids: &[String]) -> RevokeReport {
        let mut report = RevokeReport::default();
        for order_id in order_ids {
            match self.revoke_order(order_id).await {
                Ok(id) => report.succeeded.push(id),
                Err(e) => report.failed.push((order_id.clone(), e)),
            }
        }
        report
    }

    async fn revoke_all(&self) -> Result<(), ExchangeError> {
        let order_ids = self.get_open_order_ids().await?;
        let report = self.revoke_orders(&order_ids).await;
        info!(
            revoked = report.succeeded.len(),
            failed = report.failed.len(),
            "revoke all"
        );
        match report.failed.into_iter().next() {
            Some((_, e)) => Err(e),
            None => Ok(()),
        }
    }

    async fn get_open_order_ids(&self) -> Result<Vec<String>, ExchangeError> {
        let result = self
            .rest
            .get_open_orders(&self.symbol)
            .await
            .map(|orders| orders.into_iter().map(|order| order.id).collect());
        self.reported(result)
    }

    fn orders(&self) -> HashMap<String, Order> {
        self.reconciler.orders()
    }

    fn assets(&self) -> HashMap<String, Asset> {
        self.reconciler.assets()
    }

    async fn close(&self) {
        self.session.close().await;
    }
}

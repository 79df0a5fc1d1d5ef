use crate::core::errors::ExchangeError;
use crate::core::runtime::Scheduler;
use crate::core::traits::{ErrorSink, OrderSink};
use crate::core::types::{now_millis, to_order_scale, Asset, Order, OrderSide, OrderStatus};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// One decoded order push, already mapped to canonical side and status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderUpdate {
    pub order_id: String,
    pub action: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
    pub filled: Decimal,
    /// Total quote value traded so far
    pub proceeds: Decimal,
    pub status: OrderStatus,
    pub timestamp: i64,
}

/// One decoded balance push for a single coin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetUpdate {
    pub coin: String,
    pub available: Decimal,
    pub frozen: Decimal,
}

/// Identity stamped on every entity a reconciler produces.
#[derive(Debug, Clone)]
pub struct ReconcilerScope {
    pub platform: String,
    pub account: String,
    pub strategy: String,
    pub symbol: String,
}

/// Live order and asset tables for one trading connection.
///
/// Each processed update is published exactly once as an independent copy,
/// through the scheduler and in processing order. Terminal orders leave the
/// table right after their final snapshot is queued, so a later update with the
/// same id starts a fresh order.
pub struct Reconciler {
    scope: ReconcilerScope,
    orders: Mutex<HashMap<String, Order>>,
    assets: Mutex<HashMap<String, Asset>>,
    scheduler: Arc<Scheduler>,
    order_sink: Arc<dyn OrderSink>,
    error_sink: Arc<dyn ErrorSink>,
    lane_prefix: String,
}

impl Reconciler {
    pub fn new(
        scope: ReconcilerScope,
        scheduler: Arc<Scheduler>,
        order_sink: Arc<dyn OrderSink>,
        error_sink: Arc<dyn ErrorSink>,
    ) -> Self {
        let lane_prefix = format!("{}.{}.{}", scope.platform, scope.account, scope.symbol);
        Self {
            scope,
            orders: Mutex::new(HashMap::new()),
            assets: Mutex::new(HashMap::new()),
            scheduler,
            order_sink,
            error_sink,
            lane_prefix,
        }
    }

    pub fn scope(&self) -> &ReconcilerScope {
        &self.scope
    }

    /// Merge `update` into the live table and publish the result.
    ///
    /// A ProtocolError leaves the table untouched and publishes nothing.
    pub fn apply_order(&self, update: OrderUpdate) -> Result<Order, ExchangeError> {
        let remain = update.quantity - update.filled;
        if remain < Decimal::ZERO {
            return Err(self.reject(format!(
                "order {} filled {} exceeds quantity {}",
                update.order_id, update.filled, update.quantity
            )));
        }

        let avg_price = if update.filled.is_zero() {
            Decimal::ZERO
        } else {
            update
                .proceeds
                .checked_div(update.filled)
                .ok_or_else(|| self.reject(format!("order {} avg price overflow", update.order_id)))?
        };

        let snapshot = {
            let mut orders = self.orders.lock();

            if let Some(existing) = orders.get(&update.order_id) {
                if update.filled < existing.filled {
                    return Err(self.reject(format!(
                        "order {} filled went backward: {} -> {}",
                        update.order_id, existing.filled, update.filled
                    )));
                }
                if existing.status == OrderStatus::PartialFilled
                    && update.status == OrderStatus::Submitted
                {
                    return Err(self.reject(format!(
                        "order {} status went backward: PARTIAL_FILLED -> SUBMITTED",
                        update.order_id
                    )));
                }
            }

            let order = orders
                .entry(update.order_id.clone())
                .or_insert_with(|| Order {
                    platform: self.scope.platform.clone(),
                    account: self.scope.account.clone(),
                    strategy: self.scope.strategy.clone(),
                    order_id: update.order_id.clone(),
                    symbol: self.scope.symbol.clone(),
                    action: update.action,
                    price: Decimal::ZERO,
                    quantity: Decimal::ZERO,
                    filled: Decimal::ZERO,
                    remain: Decimal::ZERO,
                    avg_price: Decimal::ZERO,
                    status: update.status,
                    ctime: update.timestamp,
                    utime: update.timestamp,
                });

            order.action = update.action;
            order.price = to_order_scale(update.price);
            order.quantity = to_order_scale(update.quantity);
            order.filled = to_order_scale(update.filled);
            order.remain = to_order_scale(remain);
            order.avg_price = to_order_scale(avg_price);
            order.status = update.status;
            order.utime = update.timestamp;

            let snapshot = order.clone();
            if snapshot.status.is_terminal() {
                orders.remove(&snapshot.order_id);
            }
            snapshot
        };

        debug!(
            order_id = %snapshot.order_id,
            status = %snapshot.status,
            remain = %snapshot.remain,
            "order updated"
        );

        let sink = self.order_sink.clone();
        let published = snapshot.clone();
        self.scheduler
            .lane(&format!("{}.orders", self.lane_prefix))
            .submit(async move { sink.on_order_update(published).await });

        Ok(snapshot)
    }

    /// Replace the asset entry for `update.coin` and publish it unconditionally.
    pub fn apply_asset(&self, update: AssetUpdate) -> Asset {
        let asset = Asset {
            platform: self.scope.platform.clone(),
            account: self.scope.account.clone(),
            coin: update.coin.clone(),
            available: update.available,
            frozen: update.frozen,
            total: update.available + update.frozen,
            timestamp: now_millis(),
        };

        self.assets.lock().insert(update.coin, asset.clone());

        let sink = self.order_sink.clone();
        let published = asset.clone();
        self.scheduler
            .lane(&format!("{}.assets", self.lane_prefix))
            .submit(async move { sink.on_asset_update(published).await });

        asset
    }

    /// Schedule `error` for the error sink.
    pub fn report(&self, error: ExchangeError) {
        let sink = self.error_sink.clone();
        self.scheduler
            .run_once(async move { sink.on_error(error).await }, None);
    }

    pub fn orders(&self) -> HashMap<String, Order> {
        self.orders.lock().clone()
    }

    pub fn assets(&self) -> HashMap<String, Asset> {
        self.assets.lock().clone()
    }

    fn reject(&self, message: String) -> ExchangeError {
        error!(platform = %self.scope.platform, symbol = %self.scope.symbol, "{}", message);
        ExchangeError::ProtocolError(message)
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("scope", &self.scope)
            .field("orders", &self.orders.lock().len())
            .field("assets", &self.assets.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct Capture(mpsc::UnboundedSender<Order>);

    #[async_trait]
    impl OrderSink for Capture {
        async fn on_order_update(&self, order: Order) {
            let _ = self.0.send(order);
        }
    }

    struct Silent;

    #[async_trait]
    impl ErrorSink for Silent {
        async fn on_error(&self, _error: ExchangeError) {}
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn reconciler() -> (Reconciler, mpsc::UnboundedReceiver<Order>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scope = ReconcilerScope {
            platform: "zb".to_string(),
            account: "main".to_string(),
            strategy: "demo".to_string(),
            symbol: "EOS/QC".to_string(),
        };
        let reconciler = Reconciler::new(
            scope,
            Arc::new(Scheduler::new()),
            Arc::new(Capture(tx)),
            Arc::new(Silent),
        );
        (reconciler, rx)
    }

    fn update(id: &str, filled: &str, status: OrderStatus) -> OrderUpdate {
        OrderUpdate {
            order_id: id.to_string(),
            action: OrderSide::Buy,
            price: dec("10"),
            quantity: dec("2"),
            filled: dec(filled),
            proceeds: dec(filled) * dec("10"),
            status,
            timestamp: 1,
        }
    }

    #[tokio::test]
    async fn test_fill_regression_is_rejected() {
        let (reconciler, mut rx) = reconciler();
        reconciler
            .apply_order(update("7", "1.5", OrderStatus::PartialFilled))
            .unwrap();
        let err = reconciler
            .apply_order(update("7", "1.0", OrderStatus::PartialFilled))
            .unwrap_err();

        assert!(matches!(err, ExchangeError::ProtocolError(_)));
        assert_eq!(reconciler.orders()["7"].filled, dec("1.5"));
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_partial_back_to_submitted_is_rejected() {
        let (reconciler, _rx) = reconciler();
        reconciler
            .apply_order(update("8", "0.5", OrderStatus::PartialFilled))
            .unwrap();
        assert!(reconciler
            .apply_order(update("8", "0.5", OrderStatus::Submitted))
            .is_err());
        assert_eq!(reconciler.orders()["8"].status, OrderStatus::PartialFilled);
    }

    #[tokio::test]
    async fn test_overfill_is_rejected() {
        let (reconciler, _rx) = reconciler();
        assert!(reconciler
            .apply_order(update("9", "3", OrderStatus::PartialFilled))
            .is_err());
        assert!(reconciler.orders().is_empty());
    }

    #[tokio::test]
    async fn test_zero_fill_has_zero_avg_price() {
        let (reconciler, _rx) = reconciler();
        let order = reconciler
            .apply_order(update("10", "0", OrderStatus::Submitted))
            .unwrap();
        assert_eq!(order.avg_price.to_string(), "0.00000000");
        assert_eq!(order.remain.to_string(), "2.00000000");
    }

    #[tokio::test]
    async fn test_asset_total_is_sum() {
        let (reconciler, _rx) = reconciler();
        let asset = reconciler.apply_asset(AssetUpdate {
            coin: "QC".to_string(),
            available: dec("1.25"),
            frozen: dec("0.75"),
        });
        assert_eq!(asset.total, dec("2.00"));
        assert_eq!(reconciler.assets()["QC"].total, dec("2"));
    }
}

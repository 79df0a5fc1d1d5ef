use crate::core::runtime::scheduler::Scheduler;
use crate::core::traits::MarketSink;
use crate::core::types::{MarketSnapshot, TopicKey};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Topic-keyed fan-out of market snapshots.
///
/// One sink per exact key; subscribing again replaces the previous sink.
/// Delivery always goes through the scheduler, each subscriber on its own
/// lane, so publishers never wait on subscribers.
pub struct EventBus {
    scheduler: Arc<Scheduler>,
    subscriptions: RwLock<HashMap<TopicKey, Arc<dyn MarketSink>>>,
}

impl EventBus {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            scheduler,
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    /// Bind `sink` to `key`. Returns `true` when an earlier sink was replaced.
    pub fn subscribe(&self, key: TopicKey, sink: Arc<dyn MarketSink>) -> bool {
        trace!(topic = %key, "subscribe");
        self.subscriptions.write().insert(key, sink).is_some()
    }

    pub fn unsubscribe(&self, key: &TopicKey) -> bool {
        self.subscriptions.write().remove(key).is_some()
    }

    /// Remove `key` only while it is still bound to this very `sink`.
    pub fn unsubscribe_if(&self, key: &TopicKey, sink: &Arc<dyn MarketSink>) -> bool {
        let mut subscriptions = self.subscriptions.write();
        match subscriptions.get(key) {
            Some(current) if Arc::ptr_eq(current, sink) => subscriptions.remove(key).is_some(),
            _ => false,
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Deliver a copy of `snapshot` to every matching subscriber and return how
    /// many were scheduled. No match is not an error.
    pub fn publish(&self, snapshot: &MarketSnapshot) -> usize {
        let matched: Vec<(TopicKey, Arc<dyn MarketSink>)> = {
            let subscriptions = self.subscriptions.read();
            snapshot
                .topic()
                .fan_out()
                .into_iter()
                .filter_map(|key| subscriptions.get(&key).map(|sink| (key, sink.clone())))
                .collect()
        };

        for (key, sink) in &matched {
            let sink = sink.clone();
            let snapshot = snapshot.clone();
            self.scheduler
                .lane(&format!("bus.{}", key))
                .submit(async move { deliver(sink.as_ref(), snapshot).await });
        }

        matched.len()
    }
}

async fn deliver(sink: &dyn MarketSink, snapshot: MarketSnapshot) {
    match snapshot {
        MarketSnapshot::Orderbook(orderbook) => sink.on_orderbook(orderbook).await,
        MarketSnapshot::Trade(trade) => sink.on_trade(trade).await,
        MarketSnapshot::Kline(kline) => sink.on_kline(kline).await,
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscription_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{MarketType, Orderbook};
    use async_trait::async_trait;

    struct Ignore;

    #[async_trait]
    impl MarketSink for Ignore {}

    fn book(platform: &str, symbol: &str) -> MarketSnapshot {
        MarketSnapshot::Orderbook(Orderbook {
            platform: platform.to_string(),
            symbol: symbol.to_string(),
            asks: vec![],
            bids: vec![],
            timestamp: 0,
        })
    }

    #[tokio::test]
    async fn test_resubscribe_overwrites() {
        let bus = EventBus::new(Arc::new(Scheduler::new()));
        let key = TopicKey::new(MarketType::Orderbook, "zb", "EOS/QC");
        assert!(!bus.subscribe(key.clone(), Arc::new(Ignore)));
        assert!(bus.subscribe(key, Arc::new(Ignore)));
        assert_eq!(bus.subscription_count(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_if_spares_replacement() {
        let bus = EventBus::new(Arc::new(Scheduler::new()));
        let key = TopicKey::new(MarketType::Orderbook, "#", "#");
        let first: Arc<dyn MarketSink> = Arc::new(Ignore);
        let second: Arc<dyn MarketSink> = Arc::new(Ignore);

        bus.subscribe(key.clone(), first.clone());
        bus.subscribe(key.clone(), second.clone());

        assert!(!bus.unsubscribe_if(&key, &first));
        assert_eq!(bus.subscription_count(), 1);
        assert!(bus.unsubscribe_if(&key, &second));
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_counts_matches() {
        let bus = EventBus::new(Arc::new(Scheduler::new()));
        bus.subscribe(TopicKey::new(MarketType::Orderbook, "#", "#"), Arc::new(Ignore));
        bus.subscribe(TopicKey::new(MarketType::Orderbook, "zb", "#"), Arc::new(Ignore));
        bus.subscribe(TopicKey::new(MarketType::Trade, "#", "#"), Arc::new(Ignore));

        assert_eq!(bus.publish(&book("zb", "EOS/QC")), 2);
        assert_eq!(bus.publish(&book("huobi", "EOS/QC")), 1);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::new(Arc::new(Scheduler::new()));
        assert_eq!(bus.publish(&book("zb", "EOS/QC")), 0);
    }
}

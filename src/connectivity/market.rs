use crate::connectivity::report_setup_failure;
use crate::core::config::MarketParams;
use crate::core::errors::ExchangeError;
use crate::core::kernel::ws::SessionState;
use crate::core::runtime::Runtime;
use crate::core::traits::{ErrorSink, MarketFeed, MarketSink};
use crate::core::types::{MarketType, TopicKey};
use crate::utils::ExchangeRegistry;
use std::sync::Arc;
use tracing::{error, info};

/// Strategy-side market-data subscription.
///
/// Binds `sink` to the `(market_type, platform, symbol)` topic on the bus. A
/// concrete platform and symbol also open a live feed whose lifecycle goes to
/// `errors`; a wildcard in either only listens to what other feeds publish.
pub struct Market {
    topic: TopicKey,
    runtime: Runtime,
    sink: Arc<dyn MarketSink>,
    feed: Option<Box<dyn MarketFeed>>,
}

impl Market {
    /// A setup failure is returned and also scheduled for `errors`, followed
    /// by `on_init(false)`.
    pub fn new(
        params: MarketParams,
        runtime: &Runtime,
        registry: &ExchangeRegistry,
        sink: Arc<dyn MarketSink>,
        errors: Arc<dyn ErrorSink>,
    ) -> Result<Self, ExchangeError> {
        let topic = TopicKey::new(params.market_type, params.platform.clone(), params.symbol.clone());

        let opened = params.validate().map_err(ExchangeError::from).and_then(|()| {
            if topic.is_multi() {
                return Ok(None);
            }
            let connector = registry.get(&params.platform)?;
            connector
                .connect_market(params, runtime, errors.clone())
                .map(Some)
        });

        let feed = match opened {
            Ok(feed) => feed,
            Err(e) => {
                error!(%topic, error = %e, "market setup failed");
                report_setup_failure(runtime, errors, e.clone());
                return Err(e);
            }
        };

        if runtime.bus.subscribe(topic.clone(), sink.clone()) {
            info!(%topic, "replaced earlier subscription");
        }

        Ok(Self {
            topic,
            runtime: runtime.clone(),
            sink,
            feed,
        })
    }

    pub fn topic(&self) -> &TopicKey {
        &self.topic
    }

    /// `None` for wildcard subscriptions.
    pub fn feed(&self) -> Option<&dyn MarketFeed> {
        self.feed.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.feed
            .as_ref()
            .map_or(SessionState::Disconnected, |feed| feed.state())
    }

    /// Stream another market type over the same feed.
    pub async fn request_channel(&self, market_type: MarketType) -> Result<(), ExchangeError> {
        match &self.feed {
            Some(feed) => feed.request_channel(market_type).await,
            None => Err(ExchangeError::NotConnected(format!(
                "{} has no live feed",
                self.topic
            ))),
        }
    }

    /// Drop the bus subscription, unless a newer market took the key over,
    /// and close the feed, if any.
    pub async fn close(&self) {
        if !self.runtime.bus.unsubscribe_if(&self.topic, &self.sink) {
            info!(topic = %self.topic, "subscription already replaced");
        }
        if let Some(feed) = &self.feed {
            feed.close().await;
        }
    }
}

impl std::fmt::Debug for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Market")
            .field("topic", &self.topic)
            .field("live", &self.feed.is_some())
            .finish_non_exhaustive()
    }
}

use async_trait::async_trait;
use quantlink::core::errors::ExchangeError;
use quantlink::core::kernel::{Signer, WsCodec};
use quantlink::core::reconciler::{Reconciler, ReconcilerScope};
use quantlink::core::runtime::Scheduler;
use quantlink::core::traits::{ErrorSink, OrderSink};
use quantlink::core::types::{KlineInterval, MarketSnapshot, Order, OrderSide, OrderStatus, PriceLevel};
use quantlink::MarketTrade;
use quantlink::exchanges::zb::conversions::{convert_depth, convert_order_record};
use quantlink::exchanges::zb::{ZbCodec, ZbMessage, ZbSigner};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

struct Capture(mpsc::UnboundedSender<Order>);

#[async_trait]
impl OrderSink for Capture {
    async fn on_order_update(&self, order: Order) {
        let _ = self.0.send(order);
    }
}

struct Ignore;

#[async_trait]
impl ErrorSink for Ignore {
    async fn on_error(&self, _error: ExchangeError) {}
}

fn reconciler() -> (Reconciler, mpsc::UnboundedReceiver<Order>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let reconciler = Reconciler::new(
        ReconcilerScope {
            platform: "zb".to_string(),
            account: "main".to_string(),
            strategy: "demo".to_string(),
            symbol: "EOS/QC".to_string(),
        },
        Arc::new(Scheduler::new()),
        Arc::new(Capture(tx)),
        Arc::new(Ignore),
    );
    (reconciler, rx)
}

fn records(frame: &str) -> Vec<quantlink::exchanges::zb::types::ZbOrderRecord> {
    match ZbCodec::new().decode_text(frame).unwrap() {
        Some(ZbMessage::OrderRecords(records)) => records,
        other => panic!("expected order records, got {:?}", other),
    }
}

fn record_frame(record: &str) -> String {
    format!(r#"{{"channel":"push_user_record","record":[{}]}}"#, record)
}

#[cfg(test)]
mod zb_integration_tests {
    use super::*;

    #[test]
    fn test_depth_frame_asks_reversed() {
        let frame = r#"{"channel":"eosqc_depth","asks":[[5,1],[4,1],[3,1]],"bids":[[2,1],[1,1]],"timestamp":1620000000}"#;
        let Some(ZbMessage::Depth {
            symbol,
            asks,
            bids,
            timestamp,
        }) = ZbCodec::new().decode_text(frame).unwrap()
        else {
            panic!("expected depth");
        };
        assert_eq!(symbol, "eosqc");

        let book = convert_depth("zb", "EOS/QC", asks, bids, timestamp);
        let one = Decimal::ONE;
        assert_eq!(
            book.asks,
            vec![
                PriceLevel(Decimal::from(3), one),
                PriceLevel(Decimal::from(4), one),
                PriceLevel(Decimal::from(5), one),
            ]
        );
        assert_eq!(book.bids[0].price(), Decimal::from(2));
    }

    #[tokio::test]
    async fn test_partial_fill_record() {
        let (reconciler, mut rx) = reconciler();
        let frame = record_frame(r#"["1001","10.0","2.0","1.0","10.0",1,1620000000000,0]"#);

        for record in records(&frame) {
            reconciler
                .apply_order(convert_order_record(&record).unwrap())
                .unwrap();
        }

        let order = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(order.action, OrderSide::Buy);
        assert_eq!(order.price.to_string(), "10.00000000");
        assert_eq!(order.quantity.to_string(), "2.00000000");
        assert_eq!(order.remain.to_string(), "1.00000000");
        assert_eq!(order.avg_price.to_string(), "10.00000000");
        assert_eq!(order.status, OrderStatus::PartialFilled);
        assert_eq!(order.ctime, 1_620_000_000_000);
    }

    #[tokio::test]
    async fn test_unknown_state_changes_nothing() {
        let (reconciler, mut rx) = reconciler();
        let frame = record_frame(r#"["1002","10.0","2.0","0","0",0,1620000000000,7]"#);

        for record in records(&frame) {
            assert!(matches!(
                convert_order_record(&record),
                Err(ExchangeError::ProtocolError(_))
            ));
        }

        assert!(reconciler.orders().is_empty());
        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_terminal_order_is_evicted_then_recreated() {
        let (reconciler, mut rx) = reconciler();
        let apply = |raw: &str| {
            for record in records(&record_frame(raw)) {
                reconciler
                    .apply_order(convert_order_record(&record).unwrap())
                    .unwrap();
            }
        };

        apply(r#"["2001","5","1","0","0",0,1,3]"#);
        assert!(reconciler.orders().contains_key("2001"));

        apply(r#"["2001","5","1","1","5",0,2,2]"#);
        assert!(reconciler.orders().is_empty());

        let submitted = rx.recv().await.unwrap();
        let filled = rx.recv().await.unwrap();
        assert_eq!(submitted.status, OrderStatus::Submitted);
        assert_eq!(filled.status, OrderStatus::Filled);
        assert_eq!(filled.remain, Decimal::ZERO);

        // a later frame for the same id starts over, filled regression and all
        apply(r#"["2001","5","1","0","0",0,3,3]"#);
        let fresh = reconciler.orders()["2001"].clone();
        assert_eq!(fresh.status, OrderStatus::Submitted);
        assert_eq!(fresh.ctime, 3);
    }

    #[test]
    fn test_signer_is_deterministic_hex() {
        let signer = ZbSigner::new("ak".to_string(), "secret");
        for payload in ["a=1", "accesskey=ak&method=getAccountInfo", ""] {
            let first = signer.sign(payload);
            assert_eq!(first, signer.sign(payload));
            assert_eq!(first.len(), 32);
            assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_compact_trade_round_trip() {
        let snapshot = MarketSnapshot::Trade(MarketTrade {
            platform: "zb".to_string(),
            symbol: "EOS/QC".to_string(),
            action: OrderSide::Buy,
            price: "3.1415".parse().unwrap(),
            quantity: "12.5".parse().unwrap(),
            timestamp: 1_620_000_000_000,
        });
        let compact = snapshot.to_compact().unwrap();
        assert!(compact.len() < snapshot.to_verbose().unwrap().len());
        assert_eq!(MarketSnapshot::from_compact(&compact).unwrap(), snapshot);
    }

    #[test]
    fn test_crate_root_exports_both_trades() {
        let print = MarketTrade {
            platform: "zb".to_string(),
            symbol: "EOS/QC".to_string(),
            action: OrderSide::Sell,
            price: Decimal::ONE,
            quantity: Decimal::ONE,
            timestamp: 1,
        };
        assert_eq!(MarketSnapshot::Trade(print).symbol(), "EOS/QC");

        // the root `Trade` is the trading facade
        let platform: fn(&quantlink::Trade) -> &str = quantlink::Trade::platform;
        let _ = platform;
    }

    #[test]
    fn test_ticker_frame_decodes() {
        let frame = r#"{"channel":"eosqc_ticker","date":"1620000000000","ticker":{"high":"3.2","low":"3.0","last":"3.1","vol":"1000","buy":"3.09","sell":"3.11"}}"#;
        let Some(ZbMessage::Ticker { ticker, timestamp, .. }) = ZbCodec::new().decode_text(frame).unwrap()
        else {
            panic!("expected ticker");
        };
        let kline = quantlink::exchanges::zb::conversions::convert_ticker(
            "zb",
            "EOS/QC",
            &ticker,
            timestamp,
            KlineInterval::Minutes1,
        );
        assert_eq!(kline.open, kline.close);
        assert_eq!(kline.volume, Decimal::from(1000));
    }
}

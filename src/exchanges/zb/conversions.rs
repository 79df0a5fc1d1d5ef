use crate::core::{
    errors::ExchangeError,
    reconciler::{AssetUpdate, OrderUpdate},
    types::{Kline, KlineInterval, OrderSide, OrderStatus, Orderbook, PriceLevel, Trade},
};
use crate::exchanges::zb::types::{ZbCoin, ZbOrderRecord, ZbTapeTrade, ZbTicker, ZB_SUCCESS};
use serde_json::Value;

/// `EOS/QC` -> `eos_qc`, the form REST endpoints take.
pub fn to_rest_symbol(symbol: &str) -> String {
    symbol.replace('/', "_").to_lowercase()
}

/// `EOS/QC` -> `eosqc`, the form WebSocket channels take.
pub fn to_raw_symbol(symbol: &str) -> String {
    symbol.replace('/', "").to_lowercase()
}

/// ZB's `tradeType`: 1 buys, 0 sells.
pub fn trade_type_code(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "1",
        OrderSide::Sell => "0",
    }
}

pub fn order_status_from_code(code: i64) -> Option<OrderStatus> {
    match code {
        0 => Some(OrderStatus::PartialFilled),
        1 => Some(OrderStatus::Canceled),
        2 => Some(OrderStatus::Filled),
        3 => Some(OrderStatus::Submitted),
        _ => None,
    }
}

/// Map a positional record to a canonical update. Unknown state codes are a
/// ProtocolError and the record must be dropped.
pub fn convert_order_record(record: &ZbOrderRecord) -> Result<OrderUpdate, ExchangeError> {
    let status = order_status_from_code(record.state_code).ok_or_else(|| {
        ExchangeError::ProtocolError(format!(
            "status error! order {} state code {}",
            record.id, record.state_code
        ))
    })?;

    Ok(OrderUpdate {
        order_id: record.id.clone(),
        action: if record.side_code == 1 {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        },
        price: record.price,
        quantity: record.quantity,
        filled: record.filled,
        proceeds: record.proceeds,
        status,
        timestamp: record.time,
    })
}

pub fn convert_coin(coin: &ZbCoin) -> AssetUpdate {
    AssetUpdate {
        coin: coin.show_name.clone(),
        available: coin.available,
        frozen: coin.freez,
    }
}

/// ZB sends asks highest first; canonical books are best first on both sides.
pub fn convert_depth(
    platform: &str,
    symbol: &str,
    mut asks: Vec<PriceLevel>,
    bids: Vec<PriceLevel>,
    timestamp: i64,
) -> Orderbook {
    asks.reverse();
    Orderbook {
        platform: platform.to_string(),
        symbol: symbol.to_string(),
        asks,
        bids,
        timestamp,
    }
}

pub fn convert_tape_trade(platform: &str, symbol: &str, trade: &ZbTapeTrade) -> Trade {
    Trade {
        platform: platform.to_string(),
        symbol: symbol.to_string(),
        action: if trade.side == "buy" {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        },
        price: trade.price,
        quantity: trade.amount,
        timestamp: trade.date * 1000,
    }
}

pub fn convert_ticker(
    platform: &str,
    symbol: &str,
    ticker: &ZbTicker,
    timestamp: i64,
    kline_type: KlineInterval,
) -> Kline {
    Kline {
        platform: platform.to_string(),
        symbol: symbol.to_string(),
        open: ticker.open.unwrap_or(ticker.last),
        high: ticker.high,
        low: ticker.low,
        close: ticker.last,
        volume: ticker.vol,
        timestamp,
        kline_type,
    }
}

/// A JSON object carrying a numeric `code` other than 1000 is a rejection.
/// Bodies without a code (market data, order lists) pass.
pub fn zb_business_check(body: &Value) -> Option<(i64, String)> {
    let code = body.get("code")?.as_i64()?;
    if code == ZB_SUCCESS {
        return None;
    }
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some((code, message))
}

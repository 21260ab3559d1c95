//! Binance REST payloads

use chrono::DateTime;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

use crate::{Balance, Kline, Order, OrderId, Side};

/// `GET /ticker/price`
#[derive(Debug, Clone, Deserialize)]
pub struct TickerPrice {
    pub symbol: String,
    pub price: Decimal,
}

/// `GET /account`
#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    pub balances: Vec<AssetBalance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetBalance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

impl From<AssetBalance> for Balance {
    fn from(b: AssetBalance) -> Self {
        Balance {
            asset: b.asset,
            free: b.free,
            locked: b.locked,
        }
    }
}

/// Entry of `GET /openOrders`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrder {
    pub symbol: String,
    pub order_id: i64,
    pub price: Decimal,
    pub orig_qty: Decimal,
    pub executed_qty: Decimal,
    pub side: String,
}

impl OpenOrder {
    /// Remaining quantity is reported; unknown sides are dropped
    pub fn into_order(self) -> Option<Order> {
        let side = match self.side.as_str() {
            "BUY" => Side::Buy,
            "SELL" => Side::Sell,
            _ => return None,
        };
        Some(Order {
            id: OrderId::new(self.order_id.to_string()),
            symbol: self.symbol,
            side,
            price: self.price,
            quantity: self.orig_qty - self.executed_qty,
        })
    }
}

/// Acknowledgement of `POST /order`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    pub symbol: String,
    pub order_id: i64,
}

/// Error body returned with 4xx responses
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub code: i64,
    pub msg: String,
}

pub fn side_param(side: Side) -> &'static str {
    match side {
        Side::Buy => "BUY",
        Side::Sell => "SELL",
    }
}

/// Parse one row of `GET /klines`
///
/// Row layout: [open_time, open, high, low, close, volume, close_time,
/// quote_volume, trades, taker_buy_base, taker_buy_quote, ignore]
pub fn kline_from_raw(raw: &[serde_json::Value]) -> Option<Kline> {
    if raw.len() < 6 {
        return None;
    }
    let decimal = |v: &serde_json::Value| v.as_str().and_then(|s| Decimal::from_str(s).ok());

    Kline::new(
        DateTime::from_timestamp_millis(raw[0].as_i64()?)?,
        decimal(&raw[1])?,
        decimal(&raw[2])?,
        decimal(&raw[3])?,
        decimal(&raw[4])?,
        decimal(&raw[5])?,
    )
    .ok()
}

//! Exchange gateway contract
//!
//! Every venue must implement [`Exchange`], the core price-quote and
//! order-submission capability the grid engine runs on. Anything else is an
//! optional capability exposed through an accessor that returns `None` when
//! the venue does not offer it, so callers check before they use it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::ExchangeResult;
use crate::{Balance, Interval, Kline, Order, OrderId, Side};

/// Core gateway every venue provides
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Venue name for logs
    fn name(&self) -> &str;

    /// Last traded price for `symbol`
    async fn get_price(&self, symbol: &str) -> ExchangeResult<Decimal>;

    /// Free and locked balance for `asset`
    async fn get_balance(&self, asset: &str) -> ExchangeResult<Balance>;

    /// Open orders for `symbol`
    async fn get_open_orders(&self, symbol: &str) -> ExchangeResult<Vec<Order>>;

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: Side,
        price: Decimal,
        quantity: Decimal,
    ) -> ExchangeResult<OrderId>;

    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> ExchangeResult<OrderId>;

    async fn cancel_order(&self, symbol: &str, order_id: &OrderId) -> ExchangeResult<()>;

    /// Historical candle capability, if the venue has one
    fn historical(&self) -> Option<&dyn HistoricalData> {
        None
    }
}

/// Half-open time range `[start, end)`; `end = None` means "up to now"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && self.end.map_or(true, |end| t < end)
    }
}

/// Optional capability: historical klines
#[async_trait]
pub trait HistoricalData: Send + Sync {
    /// Klines for `symbol` ordered by open time
    async fn get_historical_klines(
        &self,
        symbol: &str,
        interval: Interval,
        range: TimeRange,
    ) -> ExchangeResult<Vec<Kline>>;
}

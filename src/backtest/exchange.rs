//! Simulated venue fed by replayed klines
//!
//! Prices come from the kline most recently fed in. Limit orders rest in an
//! in-memory book and fill on a later kline that trades through them:
//! - Buy limit: fills if kline low <= limit price
//! - Sell limit: fills if kline high >= limit price
//!
//! Market orders fill at the current close. The wallet is the net base-asset
//! quantity; there is no quote-currency accounting, so quote balances are
//! reported as unsupported.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::Exchange;
use crate::{Balance, Kline, Order, OrderId, Side, TradingPair};

const VENUE: &str = "backtest";

/// A resting order that traded
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub order_id: OrderId,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub time: DateTime<Utc>,
}

#[derive(Debug)]
struct Book {
    current: Option<Kline>,
    resting: Vec<Order>,
    quantity: Decimal,
    next_id: u64,
}

impl Book {
    fn next_order_id(&mut self) -> OrderId {
        self.next_id += 1;
        OrderId::new(format!("bt-{}", self.next_id))
    }

    fn apply(&mut self, side: Side, quantity: Decimal) {
        match side {
            Side::Buy => self.quantity += quantity,
            Side::Sell => self.quantity -= quantity,
        }
    }
}

pub struct SimulatedExchange {
    pair: TradingPair,
    symbol: String,
    book: Mutex<Book>,
}

impl SimulatedExchange {
    pub fn new(pair: TradingPair, initial_quantity: Decimal) -> Self {
        let symbol = pair.symbol();
        Self {
            pair,
            symbol,
            book: Mutex::new(Book {
                current: None,
                resting: Vec::new(),
                quantity: initial_quantity,
                next_id: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_symbol(&self, symbol: &str) -> ExchangeResult<()> {
        if symbol == self.symbol {
            Ok(())
        } else {
            Err(ExchangeError::Rejected {
                code: -1121,
                message: format!("unknown symbol {}", symbol),
            })
        }
    }

    /// Make `kline` current and fill every resting order it trades through
    pub fn feed(&self, kline: &Kline) -> Vec<Fill> {
        let mut book = self.lock();
        let mut filled = Vec::new();
        let mut resting = Vec::with_capacity(book.resting.len());

        for order in std::mem::take(&mut book.resting) {
            let crossed = match order.side {
                Side::Buy => kline.low <= order.price,
                Side::Sell => kline.high >= order.price,
            };
            if crossed {
                filled.push(Fill {
                    order_id: order.id,
                    side: order.side,
                    price: order.price,
                    quantity: order.quantity,
                    time: kline.open_time,
                });
            } else {
                resting.push(order);
            }
        }

        for fill in &filled {
            book.apply(fill.side, fill.quantity);
        }
        book.resting = resting;
        book.current = Some(kline.clone());
        filled
    }

    /// Net base-asset quantity held by the wallet
    pub fn instrument_quantity(&self) -> Decimal {
        self.lock().quantity
    }

    pub fn open_order_count(&self) -> usize {
        self.lock().resting.len()
    }
}

#[async_trait]
impl Exchange for SimulatedExchange {
    fn name(&self) -> &str {
        VENUE
    }

    async fn get_price(&self, symbol: &str) -> ExchangeResult<Decimal> {
        self.check_symbol(symbol)?;
        self.lock()
            .current
            .as_ref()
            .map(|k| k.close)
            .ok_or_else(|| ExchangeError::InvalidResponse("no kline replayed yet".to_string()))
    }

    async fn get_balance(&self, asset: &str) -> ExchangeResult<Balance> {
        if !asset.eq_ignore_ascii_case(&self.pair.base) {
            return Err(ExchangeError::Unsupported {
                venue: VENUE.to_string(),
                operation: "quote balance",
            });
        }
        Ok(Balance {
            asset: self.pair.base.clone(),
            free: self.lock().quantity.max(Decimal::ZERO),
            locked: Decimal::ZERO,
        })
    }

    async fn get_open_orders(&self, symbol: &str) -> ExchangeResult<Vec<Order>> {
        self.check_symbol(symbol)?;
        Ok(self.lock().resting.clone())
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: Side,
        price: Decimal,
        quantity: Decimal,
    ) -> ExchangeResult<OrderId> {
        self.check_symbol(symbol)?;
        if price <= Decimal::ZERO || quantity <= Decimal::ZERO {
            return Err(ExchangeError::Rejected {
                code: -1013,
                message: format!("invalid price {} or quantity {}", price, quantity),
            });
        }

        let mut book = self.lock();
        let id = book.next_order_id();
        book.resting.push(Order {
            id: id.clone(),
            symbol: symbol.to_string(),
            side,
            price,
            quantity,
        });
        Ok(id)
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> ExchangeResult<OrderId> {
        self.check_symbol(symbol)?;

        let mut book = self.lock();
        if book.current.is_none() {
            return Err(ExchangeError::InvalidResponse(
                "no kline replayed yet".to_string(),
            ));
        }
        let id = book.next_order_id();
        book.apply(side, quantity);
        Ok(id)
    }

    async fn cancel_order(&self, symbol: &str, order_id: &OrderId) -> ExchangeResult<()> {
        self.check_symbol(symbol)?;

        let mut book = self.lock();
        let before = book.resting.len();
        book.resting.retain(|o| &o.id != order_id);
        if book.resting.len() == before {
            return Err(ExchangeError::Rejected {
                code: -2011,
                message: format!("unknown order {}", order_id),
            });
        }
        Ok(())
    }
}

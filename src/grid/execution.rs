//! Batch order submission and cancellation
//!
//! Each order of a batch is sent on its own. A failure is logged and the rest
//! of the batch still goes out; the caller gets an [`ExecutionReport`].

use tracing::{debug, warn};

use super::ladder::Ladder;
use crate::error::{ExchangeError, GridError};
use crate::exchange::Exchange;
use crate::{Order, OrderId, PriceLevel};

/// Outcome of one batch of order operations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionReport {
    pub succeeded: Vec<OrderId>,
    pub failed: Vec<(String, ExchangeError)>,
}

impl ExecutionReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// `Err(PartialExecution)` when any operation of the batch failed
    pub fn into_result(self, action: &'static str) -> Result<Vec<OrderId>, GridError> {
        if self.failed.is_empty() {
            Ok(self.succeeded)
        } else {
            Err(GridError::PartialExecution {
                action,
                failed: self.failed.len(),
                total: self.total(),
            })
        }
    }
}

/// Submit every level of `ladder` as a limit order, sells first, nearest first
pub async fn submit_ladder(exchange: &dyn Exchange, symbol: &str, ladder: &Ladder) -> ExecutionReport {
    let mut report = ExecutionReport::default();

    for level in ladder.levels() {
        match submit_level(exchange, symbol, level).await {
            Ok(order_id) => {
                debug!(
                    symbol,
                    side = %level.side,
                    level = level.index,
                    price = %level.price,
                    quantity = %level.quantity,
                    order_id = %order_id,
                    "Placed grid order"
                );
                report.succeeded.push(order_id);
            }
            Err(e) => {
                warn!(
                    symbol,
                    side = %level.side,
                    level = level.index,
                    price = %level.price,
                    error = %e,
                    "Failed to place grid order"
                );
                report
                    .failed
                    .push((format!("{} #{} @ {}", level.side, level.index, level.price), e));
            }
        }
    }

    report
}

async fn submit_level(
    exchange: &dyn Exchange,
    symbol: &str,
    level: &PriceLevel,
) -> Result<OrderId, ExchangeError> {
    exchange
        .place_limit_order(symbol, level.side, level.price, level.quantity)
        .await
}

/// Cancel every order in `orders`, one call per order
pub async fn cancel_all(exchange: &dyn Exchange, symbol: &str, orders: &[Order]) -> ExecutionReport {
    let mut report = ExecutionReport::default();

    for order in orders {
        match exchange.cancel_order(symbol, &order.id).await {
            Ok(()) => {
                debug!(symbol, order_id = %order.id, "Cancelled order");
                report.succeeded.push(order.id.clone());
            }
            Err(e) => {
                warn!(symbol, order_id = %order.id, error = %e, "Failed to cancel order");
                report.failed.push((order.id.to_string(), e));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_result() {
        let complete = ExecutionReport {
            succeeded: vec![OrderId::new("1"), OrderId::new("2")],
            failed: vec![],
        };
        assert!(complete.is_complete());
        assert_eq!(complete.into_result("placements").unwrap().len(), 2);

        let partial = ExecutionReport {
            succeeded: vec![OrderId::new("1")],
            failed: vec![("2".to_string(), ExchangeError::Transient("timeout".into()))],
        };
        assert_eq!(partial.total(), 2);
        assert_eq!(
            partial.into_result("cancels"),
            Err(GridError::PartialExecution {
                action: "cancels",
                failed: 1,
                total: 2
            })
        );
    }
}

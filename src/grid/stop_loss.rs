//! Stop-loss monitor
//!
//! The threshold is recomputed on its own schedule, independent of the poll
//! cycle. A breach is edge-triggered: once price falls to or below the
//! threshold, liquidation runs once, and the monitor re-arms only after price
//! climbs back above the threshold.
//!
//! [`StopLossState`] is written only by the monitor. The controller forwards its
//! price snapshots over a channel instead of touching the state itself.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::execution::{cancel_all, ExecutionReport};
use super::ladder::{round_quantity, stop_loss_threshold};
use crate::config::StrategyConfig;
use crate::error::ExchangeError;
use crate::exchange::Exchange;
use crate::{OrderId, Side};

/// Result of comparing one price against the stored threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreachCheck {
    /// No threshold computed yet
    Unarmed,
    /// Price above threshold; the latch is (now) clear
    Clear,
    /// Price crossed to or below the threshold on this check
    Breach,
    /// Price still at or below the threshold after an earlier breach
    Latched,
}

#[derive(Debug, Default)]
struct Inner {
    threshold: Option<Decimal>,
    breached: bool,
}

/// Threshold plus breach latch, guarded together
#[derive(Debug, Default)]
pub struct StopLossState {
    inner: Mutex<Inner>,
}

impl StopLossState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn threshold(&self) -> Option<Decimal> {
        self.lock().threshold
    }

    pub fn is_latched(&self) -> bool {
        self.lock().breached
    }

    pub fn set_threshold(&self, threshold: Decimal) {
        self.lock().threshold = Some(threshold);
    }

    /// Clear the latch so the next check at or below the threshold breaches again
    pub fn rearm(&self) {
        self.lock().breached = false;
    }

    /// Compare `price` with the threshold and update the latch in one step
    pub fn check(&self, price: Decimal) -> BreachCheck {
        let mut inner = self.lock();
        let Some(threshold) = inner.threshold else {
            return BreachCheck::Unarmed;
        };

        if price > threshold {
            inner.breached = false;
            BreachCheck::Clear
        } else if inner.breached {
            BreachCheck::Latched
        } else {
            inner.breached = true;
            BreachCheck::Breach
        }
    }
}

/// What a liquidation did
#[derive(Debug, Clone, PartialEq)]
pub struct Liquidation {
    pub cancels: ExecutionReport,
    /// Market sell id and quantity; `None` when the free balance was zero
    pub sell: Option<(OrderId, Decimal)>,
}

/// Owns the stop-loss state and the scheduled evaluation
pub struct StopLossMonitor {
    exchange: Arc<dyn Exchange>,
    config: StrategyConfig,
    symbol: String,
    state: Arc<StopLossState>,
}

impl StopLossMonitor {
    pub fn new(exchange: Arc<dyn Exchange>, config: StrategyConfig) -> Self {
        let symbol = config.symbol();
        Self {
            exchange,
            config,
            symbol,
            state: Arc::new(StopLossState::new()),
        }
    }

    /// Read handle on the state for status reporting
    pub fn state(&self) -> Arc<StopLossState> {
        Arc::clone(&self.state)
    }

    /// Scheduled invocation: breach check, then threshold recompute
    ///
    /// A failed price fetch leaves the state untouched.
    pub async fn evaluate(&self) -> Result<BreachCheck, ExchangeError> {
        let price = self.exchange.get_price(&self.symbol).await?;
        let check = self.check_observed(price).await;

        match stop_loss_threshold(price, &self.config) {
            Ok(threshold) => {
                self.state.set_threshold(threshold);
                debug!(symbol = %self.symbol, %price, %threshold, "Stop-loss threshold updated");
            }
            Err(e) => warn!(symbol = %self.symbol, %price, error = %e, "Stop-loss threshold not updated"),
        }

        Ok(check)
    }

    /// Opportunistic check against an observed price, without recomputing
    pub async fn check_observed(&self, price: Decimal) -> BreachCheck {
        let check = self.state.check(price);
        if check == BreachCheck::Breach {
            warn!(
                symbol = %self.symbol,
                %price,
                threshold = ?self.state.threshold(),
                "Stop-loss triggered, liquidating"
            );
            match self.liquidate().await {
                Ok(liquidation) => info!(
                    symbol = %self.symbol,
                    cancelled = liquidation.cancels.succeeded.len(),
                    cancel_failures = liquidation.cancels.failed.len(),
                    sold = ?liquidation.sell.as_ref().map(|(_, qty)| *qty),
                    "Stop-loss liquidation finished"
                ),
                Err(e) => {
                    // Unfinished liquidation must be retried on the next check
                    self.state.rearm();
                    error!(symbol = %self.symbol, error = %e, "Stop-loss liquidation failed, re-armed");
                }
            }
        }
        check
    }

    /// Cancel every open order, then market-sell the free base-asset balance
    pub async fn liquidate(&self) -> Result<Liquidation, ExchangeError> {
        let open_orders = self.exchange.get_open_orders(&self.symbol).await?;
        let cancels = cancel_all(self.exchange.as_ref(), &self.symbol, &open_orders).await;

        let balance = self.exchange.get_balance(&self.config.pair.base).await?;
        let quantity = round_quantity(balance.free, self.config.quantity_precision);
        if quantity <= Decimal::ZERO {
            info!(asset = %self.config.pair.base, "No free balance to liquidate");
            return Ok(Liquidation { cancels, sell: None });
        }

        let order_id = self
            .exchange
            .place_market_order(&self.symbol, Side::Sell, quantity)
            .await?;

        Ok(Liquidation {
            cancels,
            sell: Some((order_id, quantity)),
        })
    }

    /// Stop-loss loop: scheduled evaluations plus forwarded poll prices
    pub async fn run(
        self,
        period: Duration,
        mut prices: mpsc::Receiver<Decimal>,
        shutdown: CancellationToken,
    ) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut forwarding = true;

        info!(symbol = %self.symbol, period_secs = period.as_secs(), "Stop-loss monitor started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.evaluate().await {
                        warn!(symbol = %self.symbol, error = %e, "Stop-loss evaluation skipped");
                    }
                }
                price = prices.recv(), if forwarding => match price {
                    Some(price) => {
                        self.check_observed(price).await;
                    }
                    None => forwarding = false,
                },
            }
        }

        info!(symbol = %self.symbol, "Stop-loss monitor stopped");
    }
}

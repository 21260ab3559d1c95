//! Grid strategy controller
//!
//! One poll cycle:
//! 1. Fetch the price snapshot and forward it to the stop-loss monitor
//! 2. Fetch open orders
//! 3. Ask the reconciler what to do
//! 4. Place a new ladder, wait, or cancel everything
//!
//! A failed fetch skips the cycle without touching the retry counter.

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::execution::{cancel_all, submit_ladder, ExecutionReport};
use super::ladder::{generate_ladder, Ladder};
use super::reconcile::{Decision, Reconciler};
use crate::config::StrategyConfig;
use crate::exchange::Exchange;

/// What a single poll cycle ended up doing
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Price or open-order fetch failed, or no ladder could be built
    Skipped,
    /// Previous ladder resolved; a new one was submitted
    Placed(ExecutionReport),
    /// Orders still open
    Waiting { retries: u32 },
    /// Retry budget exhausted; open orders were cancelled
    ForceClosed(ExecutionReport),
}

pub struct GridController {
    exchange: Arc<dyn Exchange>,
    config: StrategyConfig,
    symbol: String,
    reconciler: Reconciler,
    stop_loss_feed: Option<mpsc::Sender<Decimal>>,
    last_ladder: Option<Ladder>,
}

impl GridController {
    pub fn new(exchange: Arc<dyn Exchange>, config: StrategyConfig) -> Self {
        let symbol = config.symbol();
        let reconciler = Reconciler::new(config.max_retries);
        Self {
            exchange,
            config,
            symbol,
            reconciler,
            stop_loss_feed: None,
            last_ladder: None,
        }
    }

    /// Forward every poll price to the stop-loss monitor through `feed`
    pub fn with_stop_loss_feed(mut self, feed: mpsc::Sender<Decimal>) -> Self {
        self.stop_loss_feed = Some(feed);
        self
    }

    pub fn retries(&self) -> u32 {
        self.reconciler.retries()
    }

    pub fn last_ladder(&self) -> Option<&Ladder> {
        self.last_ladder.as_ref()
    }

    /// Run one poll cycle
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let price = match self.exchange.get_price(&self.symbol).await {
            Ok(price) => price,
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "Price fetch failed, skipping cycle");
                return CycleOutcome::Skipped;
            }
        };
        self.forward_price(price);

        let open_orders = match self.exchange.get_open_orders(&self.symbol).await {
            Ok(orders) => orders,
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "Open orders fetch failed, skipping cycle");
                return CycleOutcome::Skipped;
            }
        };

        match self.reconciler.assess(&open_orders) {
            Decision::PlaceLadder => self.place(price).await,
            Decision::Wait { retries } => {
                debug!(
                    symbol = %self.symbol,
                    open = open_orders.len(),
                    retries,
                    max_retries = self.reconciler.max_retries(),
                    "Ladder not filled yet"
                );
                CycleOutcome::Waiting { retries }
            }
            Decision::ForceClose => {
                info!(
                    symbol = %self.symbol,
                    open = open_orders.len(),
                    "Retry budget exhausted, cancelling open orders"
                );
                let report = cancel_all(self.exchange.as_ref(), &self.symbol, &open_orders).await;
                if let Err(e) = report.clone().into_result("cancels") {
                    warn!(symbol = %self.symbol, error = %e, "Force close incomplete");
                }
                CycleOutcome::ForceClosed(report)
            }
        }
    }

    async fn place(&mut self, price: Decimal) -> CycleOutcome {
        let ladder = match generate_ladder(price, &self.config) {
            Ok(ladder) => ladder,
            Err(e) => {
                error!(symbol = %self.symbol, %price, error = %e, "Cannot build ladder");
                return CycleOutcome::Skipped;
            }
        };

        info!(
            symbol = %self.symbol,
            reference = %price,
            levels = ladder.len(),
            stop_loss = %ladder.stop_loss,
            "Placing ladder"
        );

        let report = submit_ladder(self.exchange.as_ref(), &self.symbol, &ladder).await;
        if let Err(e) = report.clone().into_result("placements") {
            warn!(symbol = %self.symbol, error = %e, "Ladder placed partially");
        }

        self.last_ladder = Some(ladder);
        CycleOutcome::Placed(report)
    }

    fn forward_price(&self, price: Decimal) {
        if let Some(feed) = &self.stop_loss_feed {
            // Monitor is busy or gone; its own schedule still covers the threshold
            if let Err(e) = feed.try_send(price) {
                debug!(symbol = %self.symbol, error = %e, "Stop-loss feed dropped price");
            }
        }
    }

    /// Poll loop; returns once `shutdown` fires, after any in-flight cycle
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            symbol = %self.symbol,
            interval_secs = self.config.poll_interval_secs,
            "Grid controller started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let outcome = self.run_cycle().await;
                    debug!(symbol = %self.symbol, ?outcome, "Cycle finished");
                }
            }
        }

        info!(symbol = %self.symbol, "Grid controller stopped");
    }
}

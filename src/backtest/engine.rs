//! Backtesting engine
//!
//! Replays a kline series through the same controller and stop-loss monitor
//! used live, against a [`SimulatedExchange`]. Time is simulated: a controller
//! cycle runs whenever a poll interval of kline time has passed, and a
//! scheduled stop-loss evaluation whenever its update period has passed.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::exchange::SimulatedExchange;
use super::series::KlineSeries;
use crate::config::StrategyConfig;
use crate::exchange::Exchange;
use crate::grid::{BreachCheck, CycleOutcome, GridController, StopLossMonitor};

/// Counters collected over one replay
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BacktestReport {
    pub klines: usize,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub cycles: usize,
    pub skipped_cycles: usize,
    pub ladders_placed: usize,
    pub orders_placed: usize,
    pub order_failures: usize,
    pub forced_closes: usize,
    pub fills: usize,
    pub stop_loss_triggers: usize,
    pub initial_quantity: Decimal,
    pub final_quantity: Decimal,
    pub last_price: Option<Decimal>,
}

pub struct Backtester {
    config: StrategyConfig,
    initial_quantity: Decimal,
}

impl Backtester {
    pub fn new(config: StrategyConfig, initial_quantity: Decimal) -> Self {
        Self {
            config,
            initial_quantity,
        }
    }

    /// Replay `series` from the first kline to the last
    pub async fn run(&self, series: &KlineSeries) -> Result<BacktestReport> {
        self.config.validate().context("Invalid strategy config")?;

        let poll_every = Duration::seconds(self.config.poll_interval_secs as i64);
        let stop_loss_every = Duration::seconds(self.config.stop_loss_update_secs as i64);

        let exchange = Arc::new(SimulatedExchange::new(
            self.config.pair.clone(),
            self.initial_quantity,
        ));
        let venue: Arc<dyn Exchange> = exchange.clone();

        // One slot per poll: every cycle's price is drained before the next kline
        let (feed_tx, mut feed_rx) = mpsc::channel(1);
        let mut controller =
            GridController::new(Arc::clone(&venue), self.config.clone()).with_stop_loss_feed(feed_tx);
        let monitor = StopLossMonitor::new(venue, self.config.clone());

        let mut report = BacktestReport {
            initial_quantity: self.initial_quantity,
            ..BacktestReport::default()
        };
        let mut next_poll: Option<DateTime<Utc>> = None;
        let mut next_stop_loss: Option<DateTime<Utc>> = None;

        info!(
            symbol = %self.config.symbol(),
            klines = series.len(),
            "Starting replay"
        );

        let mut cursor = series.cursor();
        while let Some((time, kline)) = cursor.advance() {
            report.klines += 1;
            report.start.get_or_insert(time);
            report.end = Some(time);
            report.last_price = Some(kline.close);

            let fills = exchange.feed(kline);
            for fill in &fills {
                debug!(
                    %time,
                    side = %fill.side,
                    price = %fill.price,
                    quantity = %fill.quantity,
                    "Order filled"
                );
            }
            report.fills += fills.len();

            if next_stop_loss.map_or(true, |due| time >= due) {
                match monitor.evaluate().await {
                    Ok(BreachCheck::Breach) => report.stop_loss_triggers += 1,
                    Ok(_) => {}
                    Err(e) => warn!(%time, error = %e, "Stop-loss evaluation skipped"),
                }
                next_stop_loss = Some(time + stop_loss_every);
            }

            if next_poll.map_or(true, |due| time >= due) {
                let outcome = controller.run_cycle().await;
                self.record(&mut report, &outcome);
                next_poll = Some(time + poll_every);

                while let Ok(price) = feed_rx.try_recv() {
                    if monitor.check_observed(price).await == BreachCheck::Breach {
                        report.stop_loss_triggers += 1;
                    }
                }
            }
        }

        report.final_quantity = exchange.instrument_quantity();

        info!(
            klines = report.klines,
            cycles = report.cycles,
            ladders = report.ladders_placed,
            fills = report.fills,
            stop_loss_triggers = report.stop_loss_triggers,
            final_quantity = %report.final_quantity,
            "Replay finished"
        );

        Ok(report)
    }

    fn record(&self, report: &mut BacktestReport, outcome: &CycleOutcome) {
        report.cycles += 1;
        match outcome {
            CycleOutcome::Skipped => report.skipped_cycles += 1,
            CycleOutcome::Placed(execution) => {
                report.ladders_placed += 1;
                report.orders_placed += execution.succeeded.len();
                report.order_failures += execution.failed.len();
            }
            CycleOutcome::Waiting { .. } => {}
            CycleOutcome::ForceClosed(_) => report.forced_closes += 1,
        }
    }
}

//! Live runtime: poll loop and stop-loss loop on separate tasks

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::controller::GridController;
use super::stop_loss::{StopLossMonitor, StopLossState};
use crate::config::StrategyConfig;
use crate::exchange::Exchange;

/// Poll prices buffered between the controller and the monitor
const STOP_LOSS_FEED_CAPACITY: usize = 16;

/// Handles of a running grid trader
pub struct GridTrader {
    shutdown: CancellationToken,
    stop_loss: Arc<StopLossState>,
    controller: JoinHandle<()>,
    monitor: JoinHandle<()>,
}

impl GridTrader {
    /// Validate `config` and spawn both loops
    pub fn spawn(exchange: Arc<dyn Exchange>, config: StrategyConfig) -> Result<Self> {
        config.validate().context("Invalid strategy config")?;

        let shutdown = CancellationToken::new();
        let (feed_tx, feed_rx) = mpsc::channel(STOP_LOSS_FEED_CAPACITY);

        let monitor = StopLossMonitor::new(Arc::clone(&exchange), config.clone());
        let stop_loss = monitor.state();
        let period = config.stop_loss_update_period();

        let controller = GridController::new(exchange, config).with_stop_loss_feed(feed_tx);

        let monitor = tokio::spawn(monitor.run(period, feed_rx, shutdown.clone()));
        let controller = tokio::spawn(controller.run(shutdown.clone()));

        Ok(Self {
            shutdown,
            stop_loss,
            controller,
            monitor,
        })
    }

    pub fn stop_loss(&self) -> Arc<StopLossState> {
        Arc::clone(&self.stop_loss)
    }

    /// Token that stops both loops when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Signal both loops and wait for them to finish their current work
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down grid trader");
        self.shutdown.cancel();
        self.controller.await.context("Controller task panicked")?;
        self.monitor.await.context("Stop-loss task panicked")?;
        Ok(())
    }
}

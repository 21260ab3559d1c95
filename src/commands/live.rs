//! Live trading command
//!
//! Spawns the grid controller and the stop-loss monitor against Binance and
//! runs until Ctrl+C.

use anyhow::{Context, Result};
use grid_trader::exchange::Exchange;
use grid_trader::grid::GridTrader;
use grid_trader::{BinanceClient, Config};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

pub fn run(config_path: String, mainnet: bool) -> Result<()> {
    dotenv::dotenv().ok();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run_async(config_path, mainnet))
}

async fn run_async(config_path: String, mainnet: bool) -> Result<()> {
    let mut config = Config::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;
    if mainnet {
        config.exchange.testnet = false;
    }

    let client = BinanceClient::new(&config.exchange)?;
    if !client.has_credentials() {
        anyhow::bail!("BINANCE_API_KEY and BINANCE_API_SECRET must be set for live trading");
    }

    let strategy = &config.strategy;
    let network = if config.exchange.testnet {
        "TESTNET"
    } else {
        "MAINNET"
    };

    println!("\n{}", "=".repeat(60));
    println!("GRID TRADER - {}", network);
    println!("{}", "=".repeat(60));
    println!("Pair:               {}", strategy.pair);
    println!("Grid:               {} levels x {}", strategy.grid_count, strategy.grid_size);
    println!("Order Amount:       {}", strategy.order_amount);
    println!("Poll Interval:      {}s", strategy.poll_interval_secs);
    println!("Stop-Loss Update:   {}s", strategy.stop_loss_update_secs);
    println!("Max Retries:        {}", strategy.max_retries);
    println!("{}", "=".repeat(60));

    if !config.exchange.testnet {
        warn!("MAINNET TRADING MODE - REAL MONEY AT RISK!");
        warn!("Press Ctrl+C within 10 seconds to abort...");
        for i in (1..=10).rev() {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Aborted before start");
                    return Ok(());
                }
                _ = sleep(Duration::from_secs(1)) => info!("Starting in {} seconds...", i),
            }
        }
    }

    let exchange: Arc<dyn Exchange> = Arc::new(client);
    let price = exchange
        .get_price(&strategy.symbol())
        .await
        .with_context(|| format!("Failed to fetch initial price for {}", strategy.pair))?;
    info!(pair = %strategy.pair, %price, "Connected to {}", exchange.name());

    let trader = GridTrader::spawn(exchange, config.strategy.clone())?;

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating shutdown..."),
        Err(e) => warn!(error = %e, "Signal handler failed, shutting down"),
    }

    let stop_loss = trader.stop_loss();
    trader.shutdown().await?;

    info!(
        threshold = ?stop_loss.threshold(),
        latched = stop_loss.is_latched(),
        "Live trading session ended"
    );
    Ok(())
}

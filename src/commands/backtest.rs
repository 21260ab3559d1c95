//! Backtest command implementation

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use grid_trader::backtest::{Backtester, KlineSeries};
use grid_trader::exchange::{Exchange, TimeRange};
use grid_trader::{data, BinanceClient, Config};
use std::path::PathBuf;
use tracing::info;

pub fn run(
    config_path: String,
    data_override: Option<String>,
    start_override: Option<String>,
    end_override: Option<String>,
    fetch: bool,
) -> Result<()> {
    info!("Starting backtest");

    let mut config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    if let Some(start) = start_override {
        config.backtest.start = Some(data::parse_date(&start)?.date_naive());
    }
    if let Some(end) = end_override {
        config.backtest.end = Some(data::parse_date(&end)?.date_naive());
    }
    config.backtest.validate()?;

    let symbol = config.strategy.symbol();
    let interval = config.backtest.interval;
    let range = TimeRange::new(
        config
            .backtest
            .start
            .map(data::start_of_day)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        config.backtest.end.map(data::start_of_day),
    );

    let path = data_override
        .map(PathBuf::from)
        .unwrap_or_else(|| data::csv_path(&config.backtest.data_dir, &symbol, interval));

    let runtime = tokio::runtime::Runtime::new()?;

    let klines = if path.exists() {
        info!("Loading klines from: {}", path.display());
        data::filter_by_range(data::load_csv(&path)?, &range)
    } else if fetch {
        if config.backtest.start.is_none() {
            anyhow::bail!("--fetch needs a start date (--start or backtest.start)");
        }
        let client = BinanceClient::new(&config.exchange)?;
        let provider = client
            .historical()
            .context("Exchange does not provide historical klines")?;
        let klines = runtime.block_on(provider.get_historical_klines(&symbol, interval, range))?;
        data::save_csv(&path, &klines)?;
        klines
    } else {
        anyhow::bail!(
            "No data at {}. Run `download` first or pass --fetch",
            path.display()
        );
    };

    let series = KlineSeries::new(klines).context("Invalid kline data")?;
    info!("Loaded {} klines", series.len());

    let backtester = Backtester::new(config.strategy.clone(), config.backtest.initial_quantity);
    info!("Running backtest...");
    let report = runtime.block_on(backtester.run(&series))?;

    let fmt_time = |t: Option<DateTime<Utc>>| {
        t.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string())
    };

    println!("\n{}", "=".repeat(60));
    println!("BACKTEST RESULTS - {} {}", config.strategy.pair, interval);
    println!("{}", "=".repeat(60));
    println!("Period:             {} -> {}", fmt_time(report.start), fmt_time(report.end));
    println!("Klines:             {}", report.klines);
    println!("Poll Cycles:        {}", report.cycles);
    println!("Skipped Cycles:     {}", report.skipped_cycles);
    println!("Ladders Placed:     {}", report.ladders_placed);
    println!("Orders Placed:      {}", report.orders_placed);
    println!("Order Failures:     {}", report.order_failures);
    println!("Forced Closes:      {}", report.forced_closes);
    println!("Fills:              {}", report.fills);
    println!("Stop-Loss Triggers: {}", report.stop_loss_triggers);
    println!("{}", "-".repeat(60));
    println!(
        "{} Held:         {} -> {}",
        config.strategy.pair.base, report.initial_quantity, report.final_quantity
    );
    println!(
        "Last Price:         {}",
        report
            .last_price
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("{}", "=".repeat(60));

    info!("Backtest completed successfully");

    Ok(())
}

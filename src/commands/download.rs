//! Download command - fetch historical klines from Binance into CSV files

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use grid_trader::config::ExchangeConfig;
use grid_trader::exchange::{Exchange, TimeRange};
use grid_trader::{data, BinanceClient, Interval, TradingPair};
use std::io::Write;
use tracing::info;

pub fn run(pairs: String, intervals: String, days: u32, output: String) -> Result<()> {
    info!("Starting data download from Binance");

    let pairs: Vec<TradingPair> = pairs
        .split(',')
        .map(|s| s.trim().parse::<TradingPair>())
        .collect::<Result<_, _>>()
        .context("Invalid pair list")?;
    let intervals: Vec<Interval> = intervals
        .split(',')
        .map(|s| s.trim().parse::<Interval>())
        .collect::<Result<_, _>>()
        .map_err(anyhow::Error::msg)?;

    // Market data comes from the production API; no credentials needed
    let client = BinanceClient::new(&ExchangeConfig {
        testnet: false,
        ..ExchangeConfig::default()
    })?;
    let provider = client
        .historical()
        .context("Exchange does not provide historical klines")?;

    let runtime = tokio::runtime::Runtime::new()?;
    let range = TimeRange::new(Utc::now() - Duration::days(i64::from(days)), None);

    println!("\n{}", "=".repeat(60));
    println!("DOWNLOADING HISTORICAL DATA FROM BINANCE");
    println!("{}", "=".repeat(60));
    println!("  Pairs:      {}", pairs.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", "));
    println!("  Intervals:  {}", intervals.iter().map(|i| i.as_str()).collect::<Vec<_>>().join(", "));
    println!("  Days:       {}", days);
    println!("  Output:     {}", output);
    println!("{}\n", "=".repeat(60));

    let mut total_klines = 0;
    let mut success_count = 0;
    let total_downloads = pairs.len() * intervals.len();

    for pair in &pairs {
        println!("\n{}:", pair);
        let symbol = pair.symbol();

        for interval in &intervals {
            print!("  Downloading {} {}... ", symbol, interval);
            std::io::stdout().flush().ok();

            let result = runtime
                .block_on(provider.get_historical_klines(&symbol, *interval, range))
                .map_err(anyhow::Error::from)
                .and_then(|klines| {
                    let path = data::csv_path(&output, &symbol, *interval);
                    data::save_csv(&path, &klines)?;
                    Ok(klines.len())
                });

            match result {
                Ok(count) => {
                    total_klines += count;
                    success_count += 1;
                    println!("OK {} klines", count);
                }
                Err(e) => println!("FAILED: {}", e),
            }
        }
    }

    println!("\n{}", "=".repeat(60));
    println!("DOWNLOAD COMPLETE");
    println!("{}", "=".repeat(60));
    println!("  Success: {}/{}", success_count, total_downloads);
    println!("  Total klines: {}", total_klines);
    println!("{}", "=".repeat(60));

    info!(success_count, total_downloads, total_klines, "Download finished");
    Ok(())
}

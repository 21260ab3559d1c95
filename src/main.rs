//! Grid trader - main entry point
//!
//! This binary provides three subcommands:
//! - live: Run the grid against Binance (testnet unless told otherwise)
//! - backtest: Replay historical klines through the grid
//! - download: Download historical klines from Binance

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "grid-trader")]
#[command(about = "Grid trading controller with stop-loss monitoring and historical replay", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the grid against the exchange
    Live {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/btc_usdt_grid.json")]
        config: String,

        /// Trade on the production exchange (CAUTION - REAL MONEY!)
        #[arg(long)]
        mainnet: bool,
    },

    /// Replay historical klines through the grid
    Backtest {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/btc_usdt_grid.json")]
        config: String,

        /// CSV file to replay (defaults to {data_dir}/{SYMBOL}_{interval}.csv)
        #[arg(short, long)]
        data: Option<String>,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD, exclusive)
        #[arg(long)]
        end: Option<String>,

        /// Download the klines from Binance when the CSV file is missing
        #[arg(long)]
        fetch: bool,
    },

    /// Download historical klines from Binance
    Download {
        /// Pairs to download (comma-separated). E.g., "BTC/USDT,ETH/USDT"
        #[arg(short, long, default_value = "BTC/USDT")]
        pairs: String,

        /// Intervals (comma-separated). E.g., "5m,1h"
        #[arg(short, long, default_value = "5m")]
        intervals: String,

        /// Number of days of history to fetch
        #[arg(short, long, default_value = "30")]
        days: u32,

        /// Output directory
        #[arg(short, long, default_value = "data")]
        output: String,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // Log file naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_ansi(true);

    // Same format as the console, without ANSI colors
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(log_file = %log_path.display(), "Logging initialized");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Live { .. } => "live",
        Commands::Backtest { .. } => "backtest",
        Commands::Download { .. } => "download",
    };

    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Live { config, mainnet } => commands::live::run(config, mainnet),

        Commands::Backtest {
            config,
            data,
            start,
            end,
            fetch,
        } => commands::backtest::run(config, data, start, end, fetch),

        Commands::Download {
            pairs,
            intervals,
            days,
            output,
        } => commands::download::run(pairs, intervals, days, output),
    }
}

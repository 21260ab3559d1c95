//! Grid Trader
//!
//! A single-symbol grid trading controller: it keeps a ladder of limit orders
//! around the market price, replaces the ladder once it fills, cancels it when
//! it goes stale, and liquidates when price breaks below a stop-loss threshold
//! that is tracked on its own schedule.
//!
//! The same engine runs live against a venue implementing
//! [`exchange::Exchange`] or over historical klines through [`backtest`].
//!
//! ## Backtest Example
//! ```no_run
//! use grid_trader::backtest::{Backtester, KlineSeries};
//! use grid_trader::{data, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_file("configs/btc_usdt_grid.json")?;
//!     let klines = data::load_csv("data/BTCUSDT_5m.csv")?;
//!     let series = KlineSeries::new(klines)?;
//!
//!     let report = Backtester::new(config.strategy, config.backtest.initial_quantity)
//!         .run(&series)
//!         .await?;
//!     println!("Ladders placed: {}", report.ladders_placed);
//!     Ok(())
//! }
//! ```

pub mod backtest;
pub mod binance;
pub mod common;
pub mod config;
pub mod data;
pub mod error;
pub mod exchange;
pub mod grid;
pub mod types;

pub use config::Config;
pub use error::{ExchangeError, GridError};
pub use types::*;

// Re-export exchange clients for convenience
pub use binance::BinanceClient;

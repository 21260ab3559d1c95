//! Configuration management
//!
//! Handles loading and validating the JSON configuration file, with
//! environment variable support for API credentials.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::GridError;
use crate::{Interval, TradingPair};

/// Largest scale `rust_decimal` can represent
const MAX_PRECISION: u32 = 28;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
}

impl Config {
    /// Load configuration from JSON file and validate it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        // Load API credentials from environment if not set
        if let Ok(api_key) = std::env::var("BINANCE_API_KEY") {
            config.exchange.api_key = Some(api_key);
        }
        if let Ok(api_secret) = std::env::var("BINANCE_API_SECRET") {
            config.exchange.api_secret = Some(api_secret);
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GridError> {
        self.strategy.validate()?;
        self.exchange.validate()?;
        self.backtest.validate()
    }
}

/// Exchange configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
    /// Route requests to the venue's test network
    pub testnet: bool,
    /// Requests per second
    pub rate_limit: u32,
    /// Attempts after the first one for transient failures
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub recv_window_ms: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            api_key: None,
            api_secret: None,
            testnet: true,
            rate_limit: 10,
            max_retries: 3,
            timeout_secs: 30,
            recv_window_ms: 5_000,
        }
    }
}

impl ExchangeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), GridError> {
        if self.rate_limit == 0 {
            return Err(GridError::invalid("exchange.rate_limit", "must be > 0"));
        }
        if self.timeout_secs == 0 {
            return Err(GridError::invalid("exchange.timeout_secs", "must be > 0"));
        }
        Ok(())
    }
}

/// Grid strategy parameters
///
/// Created once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Trading pair written as `BASE/QUOTE`
    pub pair: TradingPair,
    /// Decimal places kept on order prices
    pub price_precision: u32,
    /// Decimal places kept on order quantities
    pub quantity_precision: u32,
    /// Seconds between poll cycles
    pub poll_interval_secs: u64,
    /// Price distance between adjacent levels as a share of the reference price
    pub grid_size: Decimal,
    /// Quantity increase per level as a share of the base order amount
    pub grid_step: Decimal,
    /// Levels per side
    pub grid_count: u32,
    /// Base order quantity per level
    pub order_amount: Decimal,
    /// Treat `order_amount` as quote currency and convert it at the reference price
    pub amount_in_quote: bool,
    /// Seconds between stop-loss threshold recomputations
    pub stop_loss_update_secs: u64,
    /// Unfilled polls tolerated before the open ladder is cancelled
    pub max_retries: u32,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            pair: TradingPair::new("BTC", "USDT"),
            price_precision: 3,
            quantity_precision: 3,
            poll_interval_secs: 300,
            grid_size: dec!(0.01),
            grid_step: dec!(0.02),
            grid_count: 3,
            order_amount: dec!(0.00005),
            amount_in_quote: false,
            stop_loss_update_secs: 7_200,
            max_retries: 3,
        }
    }
}

impl StrategyConfig {
    pub fn symbol(&self) -> String {
        self.pair.symbol()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn stop_loss_update_period(&self) -> Duration {
        Duration::from_secs(self.stop_loss_update_secs)
    }

    /// Check every bound before any loop is started
    pub fn validate(&self) -> Result<(), GridError> {
        if self.grid_size <= Decimal::ZERO {
            return Err(GridError::invalid("strategy.grid_size", "must be > 0"));
        }
        if self.grid_step < Decimal::ZERO {
            return Err(GridError::invalid("strategy.grid_step", "must be >= 0"));
        }
        if self.order_amount <= Decimal::ZERO {
            return Err(GridError::invalid("strategy.order_amount", "must be > 0"));
        }
        if self.poll_interval_secs == 0 {
            return Err(GridError::invalid("strategy.poll_interval_secs", "must be > 0"));
        }
        if self.stop_loss_update_secs == 0 {
            return Err(GridError::invalid(
                "strategy.stop_loss_update_secs",
                "must be > 0",
            ));
        }
        if self.price_precision > MAX_PRECISION {
            return Err(GridError::invalid(
                "strategy.price_precision",
                format!("must be <= {}", MAX_PRECISION),
            ));
        }
        if self.quantity_precision > MAX_PRECISION {
            return Err(GridError::invalid(
                "strategy.quantity_precision",
                format!("must be <= {}", MAX_PRECISION),
            ));
        }

        // The deepest buy level and the stop-loss must stay above zero
        let depth = self.grid_size * (Decimal::from(self.grid_count) + Decimal::ONE);
        if depth >= Decimal::ONE {
            return Err(GridError::invalid(
                "strategy.grid_count",
                format!(
                    "grid_size * (grid_count + 1) = {} pushes the stop-loss to or below zero",
                    depth
                ),
            ));
        }

        Ok(())
    }
}

/// Backtest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub data_dir: String,
    pub interval: Interval,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
    /// Base-asset quantity held by the simulated wallet at the start
    pub initial_quantity: Decimal,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            data_dir: "data".to_string(),
            interval: Interval::FiveMinutes,
            start: None,
            end: None,
            initial_quantity: Decimal::ZERO,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), GridError> {
        if self.initial_quantity < Decimal::ZERO {
            return Err(GridError::invalid("backtest.initial_quantity", "must be >= 0"));
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if end <= start {
                return Err(GridError::invalid("backtest.end", "must be after start"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.strategy.symbol(), "BTCUSDT");
        assert_eq!(config.strategy.poll_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_rejects_non_positive_grid_size() {
        let strategy = StrategyConfig {
            grid_size: Decimal::ZERO,
            ..StrategyConfig::default()
        };
        assert!(matches!(
            strategy.validate(),
            Err(GridError::InvalidParameter {
                name: "strategy.grid_size",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_non_positive_order_amount() {
        let strategy = StrategyConfig {
            order_amount: dec!(-1),
            ..StrategyConfig::default()
        };
        assert!(strategy.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_intervals() {
        let poll = StrategyConfig {
            poll_interval_secs: 0,
            ..StrategyConfig::default()
        };
        assert!(poll.validate().is_err());

        let stop = StrategyConfig {
            stop_loss_update_secs: 0,
            ..StrategyConfig::default()
        };
        assert!(stop.validate().is_err());
    }

    #[test]
    fn test_zero_retries_and_grid_count_allowed() {
        let strategy = StrategyConfig {
            max_retries: 0,
            grid_count: 0,
            ..StrategyConfig::default()
        };
        assert!(strategy.validate().is_ok());
    }

    #[test]
    fn test_rejects_grid_deeper_than_price() {
        let strategy = StrategyConfig {
            grid_size: dec!(0.25),
            grid_count: 3,
            ..StrategyConfig::default()
        };
        assert!(strategy.validate().is_err());
    }

    #[test]
    fn test_max_grid_count_rejected_without_overflow() {
        let strategy = StrategyConfig {
            grid_count: u32::MAX,
            ..StrategyConfig::default()
        };
        assert!(matches!(
            strategy.validate(),
            Err(GridError::InvalidParameter {
                name: "strategy.grid_count",
                ..
            })
        ));
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{
            "strategy": {
                "pair": "ETH/USDT",
                "grid_size": "0.005",
                "grid_count": 5,
                "order_amount": 0.01,
                "poll_interval_secs": 60
            },
            "backtest": { "interval": "1h", "start": "2024-01-01" }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.strategy.pair, TradingPair::new("ETH", "USDT"));
        assert_eq!(config.strategy.grid_size, dec!(0.005));
        assert_eq!(config.strategy.order_amount, dec!(0.01));
        assert_eq!(config.strategy.max_retries, 3);
        assert_eq!(config.backtest.interval, Interval::OneHour);
        assert_eq!(
            config.backtest.start,
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
        assert!(config.exchange.testnet);
    }

    #[test]
    fn test_rejects_malformed_pair() {
        let json = r#"{ "strategy": { "pair": "BTCUSDT" } }"#;
        assert!(serde_json::from_str::<Config>(json).is_err());
    }
}

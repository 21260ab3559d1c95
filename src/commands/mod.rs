//! Command implementations for the CLI

pub mod backtest;
pub mod download;
pub mod live;

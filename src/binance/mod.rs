//! Binance spot venue
//!
//! Market data endpoints are public; account and order endpoints need an API
//! key and secret.

pub mod auth;
mod client;
mod types;

pub use client::{BinanceClient, MAINNET_BASE_URL, TESTNET_BASE_URL};
pub use types::*;

//! Historical replay
//!
//! A [`KlineSeries`] is loaded once, walked by a forward-only [`Cursor`], and
//! fed to a [`SimulatedExchange`] that the live grid engine trades against.

mod engine;
mod exchange;
mod series;

pub use engine::{BacktestReport, Backtester};
pub use exchange::{Fill, SimulatedExchange};
pub use series::{Cursor, KlineSeries};

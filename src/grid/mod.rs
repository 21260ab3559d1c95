//! Grid trading engine
//!
//! Ladder math, reconciliation of the open ladder, the stop-loss monitor, and
//! the controller that ties them together on a poll interval.

pub mod controller;
pub mod execution;
pub mod ladder;
pub mod reconcile;
pub mod stop_loss;
pub mod trader;

pub use controller::{CycleOutcome, GridController};
pub use execution::{cancel_all, submit_ladder, ExecutionReport};
pub use ladder::{generate_ladder, stop_loss_threshold, Ladder};
pub use reconcile::{all_filled, Decision, Reconciler};
pub use stop_loss::{BreachCheck, Liquidation, StopLossMonitor, StopLossState};
pub use trader::GridTrader;

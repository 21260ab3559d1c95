//! Order reconciliation
//!
//! Decides, from the open-order snapshot of one poll, whether the previous
//! ladder is resolved, still pending, or stuck long enough to be closed.

use crate::Order;

/// What the controller should do with the current open-order snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Every order of the previous ladder is gone; place a fresh one
    PlaceLadder,
    /// Orders are still open; `retries` consecutive non-filled checks so far
    Wait { retries: u32 },
    /// Too many non-filled checks; cancel everything and start over next cycle
    ForceClose,
}

/// True iff no order is open
pub fn all_filled(open_orders: &[Order]) -> bool {
    open_orders.is_empty()
}

/// Tracks consecutive non-filled polls
#[derive(Debug, Clone)]
pub struct Reconciler {
    retries: u32,
    max_retries: u32,
}

impl Reconciler {
    pub fn new(max_retries: u32) -> Self {
        Self {
            retries: 0,
            max_retries,
        }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Classify a snapshot and update the retry counter
    ///
    /// With `max_retries = 3` the fourth consecutive non-filled check returns
    /// [`Decision::ForceClose`]; the counter is 0 after a fill or a force close.
    pub fn assess(&mut self, open_orders: &[Order]) -> Decision {
        if all_filled(open_orders) {
            self.retries = 0;
            return Decision::PlaceLadder;
        }

        if self.retries >= self.max_retries {
            self.retries = 0;
            return Decision::ForceClose;
        }

        self.retries += 1;
        Decision::Wait {
            retries: self.retries,
        }
    }

    pub fn reset(&mut self) {
        self.retries = 0;
    }
}

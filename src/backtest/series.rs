//! Immutable kline sequence and its forward-only cursor

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::exchange::{HistoricalData, TimeRange};
use crate::types::KlineValidationError;
use crate::{Interval, Kline};

/// Validated, ordered klines shared by every cursor built over them
#[derive(Debug, Clone)]
pub struct KlineSeries {
    klines: Arc<[Kline]>,
}

impl KlineSeries {
    /// Validate every kline and require strictly increasing open times
    pub fn new(klines: Vec<Kline>) -> Result<Self, KlineValidationError> {
        for kline in &klines {
            kline.validate()?;
        }
        for pair in klines.windows(2) {
            if pair[1].open_time <= pair[0].open_time {
                return Err(KlineValidationError::NonMonotonicTime {
                    previous: pair[0].open_time,
                    current: pair[1].open_time,
                });
            }
        }

        Ok(Self {
            klines: klines.into(),
        })
    }

    /// Load a series once from a historical data provider
    pub async fn fetch(
        provider: &dyn HistoricalData,
        symbol: &str,
        interval: Interval,
        range: TimeRange,
    ) -> anyhow::Result<Self> {
        let klines = provider
            .get_historical_klines(symbol, interval, range)
            .await?;
        Ok(Self::new(klines)?)
    }

    pub fn len(&self) -> usize {
        self.klines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.klines.is_empty()
    }

    /// Fresh cursor positioned before the first kline
    pub fn cursor(&self) -> Cursor {
        Cursor {
            klines: Arc::clone(&self.klines),
            next: 0,
        }
    }
}

/// Forward-only position within a [`KlineSeries`]
///
/// A series of N klines yields exactly N items; every later call returns `None`.
#[derive(Debug, Clone)]
pub struct Cursor {
    klines: Arc<[Kline]>,
    next: usize,
}

impl Cursor {
    pub fn advance(&mut self) -> Option<(DateTime<Utc>, &Kline)> {
        let kline = self.klines.get(self.next)?;
        self.next += 1;
        Some((kline.open_time, kline))
    }

    /// Kline returned by the last successful advance
    pub fn current(&self) -> Option<&Kline> {
        self.next.checked_sub(1).and_then(|i| self.klines.get(i))
    }

    pub fn remaining(&self) -> usize {
        self.klines.len() - self.next
    }

    pub fn is_finished(&self) -> bool {
        self.next >= self.klines.len()
    }
}

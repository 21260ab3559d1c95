//! Kline CSV storage
//!
//! Files live under the data directory as `{SYMBOL}_{interval}.csv` with the
//! header `datetime,open,high,low,close,volume`. Timestamps are written as
//! `%Y-%m-%d %H:%M:%S` UTC; RFC 3339 is accepted on read.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

use crate::exchange::TimeRange;
use crate::{Interval, Kline};

pub const CSV_HEADER: &str = "datetime,open,high,low,close,volume";

/// `{data_dir}/{symbol}_{interval}.csv`
pub fn csv_path(data_dir: impl AsRef<Path>, symbol: &str, interval: Interval) -> PathBuf {
    data_dir
        .as_ref()
        .join(format!("{}_{}.csv", symbol, interval.as_str()))
}

/// Load klines from a CSV file, skipping rows that fail validation
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Kline>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;

    let mut klines = Vec::new();
    let mut invalid_count = 0;

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;

        let dt_str = record.get(0).context("Missing datetime column")?;
        let open_time = parse_datetime(dt_str)?;
        let column = |idx: usize, name: &str| -> Result<Decimal> {
            let raw = record
                .get(idx)
                .with_context(|| format!("Missing {} column", name))?;
            Decimal::from_str(raw.trim())
                .with_context(|| format!("Failed to parse {} '{}' at row {}", name, raw, row_idx + 2))
        };

        let kline = Kline::new(
            open_time,
            column(1, "open")?,
            column(2, "high")?,
            column(3, "low")?,
            column(4, "close")?,
            column(5, "volume")?,
        );

        match kline {
            Ok(kline) => klines.push(kline),
            Err(e) => {
                invalid_count += 1;
                warn!(
                    row = row_idx + 2, // 1-indexed plus header row
                    file = %path.display(),
                    error = %e,
                    "Skipping invalid kline"
                );
            }
        }
    }

    if invalid_count > 0 {
        warn!(
            skipped = invalid_count,
            total = invalid_count + klines.len(),
            file = %path.display(),
            "Skipped invalid klines"
        );
    }

    Ok(klines)
}

/// Write klines to `path`, creating parent directories
pub fn save_csv(path: impl AsRef<Path>, klines: &[Kline]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let file = File::create(path)
        .with_context(|| format!("Failed to create output file {}", path.display()))?;
    let mut out = BufWriter::new(file);

    writeln!(out, "{}", CSV_HEADER)?;
    for kline in klines {
        writeln!(
            out,
            "{},{},{},{},{},{}",
            kline.open_time.format("%Y-%m-%d %H:%M:%S"),
            kline.open,
            kline.high,
            kline.low,
            kline.close,
            kline.volume
        )?;
    }
    out.flush()?;

    info!(rows = klines.len(), file = %path.display(), "Saved klines");
    Ok(())
}

/// Keep klines whose open time falls inside `range`
pub fn filter_by_range(klines: Vec<Kline>, range: &TimeRange) -> Vec<Kline> {
    klines
        .into_iter()
        .filter(|k| range.contains(k.open_time))
        .collect()
}

/// RFC 3339 or `YYYY-MM-DD HH:MM:SS` (UTC)
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = s.parse::<DateTime<Utc>>() {
        return Ok(dt);
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|ndt| ndt.and_utc())
        .with_context(|| format!("Failed to parse datetime: {}", s))
}

/// Midnight UTC of `date`
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Parse a `YYYY-MM-DD` date, or a full datetime
pub fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
        return Ok(start_of_day(date));
    }
    parse_datetime(s).context("Use YYYY-MM-DD or YYYY-MM-DD HH:MM:SS format")
}

//! Historical data loading for the backtester.
//!
//! Bars and ticks come in as CSV with a `%Y-%m-%d %H:%M:%S` datetime column.
//! Rows must be in chronological order; the loader rejects files that are
//! not, so replay never runs time backwards.

use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::info;

use spreadlab_core::domain::SpreadBar;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed row {row} in {path}: {reason}")]
    BadRow {
        path: String,
        row: usize,
        reason: String,
    },
    #[error("{path} is not in chronological order at row {row}")]
    OutOfOrder { path: String, row: usize },
    #[error("{path} contains no rows")]
    Empty { path: String },
}

/// Derived spread quote at one instant, as replayed in tick mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadTick {
    #[serde(deserialize_with = "parse_datetime")]
    pub datetime: NaiveDateTime,
    pub bid_price: f64,
    pub bid_volume: f64,
    pub ask_price: f64,
    pub ask_volume: f64,
    #[serde(default)]
    pub bid_spread_rate: f64,
    #[serde(default)]
    pub ask_spread_rate: f64,
}

impl SpreadTick {
    pub fn date(&self) -> chrono::NaiveDate {
        self.datetime.date()
    }

    /// Midpoint of the two rate sides, used to feed the outlier window.
    pub fn mid_rate(&self) -> f64 {
        (self.bid_spread_rate + self.ask_spread_rate) / 2.0
    }
}

#[derive(Debug, Deserialize)]
struct BarRow {
    #[serde(deserialize_with = "parse_datetime")]
    datetime: NaiveDateTime,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    #[serde(default)]
    spread_rate: f64,
    value: Option<f64>,
}

fn parse_datetime<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    NaiveDateTime::parse_from_str(&raw, DATETIME_FORMAT).map_err(serde::de::Error::custom)
}

/// Loads spread bars from a CSV file with columns
/// `datetime,open,high,low,close,volume,spread_rate[,value]`.
/// `value` (bar notional) defaults to the close price when absent.
pub fn load_bars(path: &Path) -> Result<Vec<SpreadBar>, LoadError> {
    let path_display = path.display().to_string();
    let mut reader = csv::Reader::from_path(path).map_err(|err| map_csv_error(&path_display, err))?;

    let mut bars = Vec::new();
    for (idx, record) in reader.deserialize::<BarRow>().enumerate() {
        let row = record.map_err(|err| LoadError::BadRow {
            path: path_display.clone(),
            row: idx + 1,
            reason: err.to_string(),
        })?;
        if let Some(prev) = bars.last() {
            let prev: &SpreadBar = prev;
            if row.datetime < prev.datetime {
                return Err(LoadError::OutOfOrder {
                    path: path_display,
                    row: idx + 1,
                });
            }
        }
        bars.push(SpreadBar {
            datetime: row.datetime,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            spread_rate: row.spread_rate,
            value: row.value.unwrap_or(row.close),
        });
    }

    if bars.is_empty() {
        return Err(LoadError::Empty { path: path_display });
    }
    info!(path = %path_display, bars = bars.len(), "bar history loaded");
    Ok(bars)
}

/// Loads spread ticks from a CSV file with columns
/// `datetime,bid_price,bid_volume,ask_price,ask_volume,bid_spread_rate,ask_spread_rate`.
pub fn load_ticks(path: &Path) -> Result<Vec<SpreadTick>, LoadError> {
    let path_display = path.display().to_string();
    let mut reader = csv::Reader::from_path(path).map_err(|err| map_csv_error(&path_display, err))?;

    let mut ticks: Vec<SpreadTick> = Vec::new();
    for (idx, record) in reader.deserialize::<SpreadTick>().enumerate() {
        let tick = record.map_err(|err| LoadError::BadRow {
            path: path_display.clone(),
            row: idx + 1,
            reason: err.to_string(),
        })?;
        if let Some(prev) = ticks.last() {
            if tick.datetime < prev.datetime {
                return Err(LoadError::OutOfOrder {
                    path: path_display,
                    row: idx + 1,
                });
            }
        }
        ticks.push(tick);
    }

    if ticks.is_empty() {
        return Err(LoadError::Empty { path: path_display });
    }
    info!(path = %path_display, ticks = ticks.len(), "tick history loaded");
    Ok(ticks)
}

fn map_csv_error(path: &str, err: csv::Error) -> LoadError {
    match err.into_kind() {
        csv::ErrorKind::Io(source) => LoadError::Io {
            path: path.to_string(),
            source,
        },
        other => LoadError::BadRow {
            path: path.to_string(),
            row: 0,
            reason: format!("{other:?}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn loads_bars_with_default_value() {
        let file = write_temp(
            "datetime,open,high,low,close,volume,spread_rate,value\n\
             2024-01-02 09:30:00,1.0,1.2,0.9,1.1,100,0.5,\n\
             2024-01-02 09:31:00,1.1,1.3,1.0,1.2,80,0.6,2.4\n",
        );
        let bars = load_bars(file.path()).unwrap();
        assert_eq!(bars.len(), 2);
        // Missing value falls back to the close.
        assert_eq!(bars[0].value, 1.1);
        assert_eq!(bars[1].value, 2.4);
    }

    #[test]
    fn rejects_out_of_order_bars() {
        let file = write_temp(
            "datetime,open,high,low,close,volume,spread_rate,value\n\
             2024-01-02 09:31:00,1.0,1.2,0.9,1.1,100,0.5,1.1\n\
             2024-01-02 09:30:00,1.1,1.3,1.0,1.2,80,0.6,1.2\n",
        );
        let err = load_bars(file.path()).unwrap_err();
        assert!(matches!(err, LoadError::OutOfOrder { row: 2, .. }));
    }

    #[test]
    fn rejects_malformed_rows() {
        let file = write_temp(
            "datetime,open,high,low,close,volume,spread_rate,value\n\
             2024-01-02 09:30:00,not-a-number,1.2,0.9,1.1,100,0.5,1.1\n",
        );
        let err = load_bars(file.path()).unwrap_err();
        assert!(matches!(err, LoadError::BadRow { row: 1, .. }));
    }

    #[test]
    fn rejects_empty_files() {
        let file = write_temp("datetime,open,high,low,close,volume,spread_rate,value\n");
        let err = load_bars(file.path()).unwrap_err();
        assert!(matches!(err, LoadError::Empty { .. }));
    }

    #[test]
    fn loads_ticks() {
        let file = write_temp(
            "datetime,bid_price,bid_volume,ask_price,ask_volume,bid_spread_rate,ask_spread_rate\n\
             2024-01-02 09:30:00,1.0,10,1.1,12,0.5,0.55\n",
        );
        let ticks = load_ticks(file.path()).unwrap();
        assert_eq!(ticks.len(), 1);
        assert!((ticks[0].mid_rate() - 0.525).abs() < 1e-12);
    }
}

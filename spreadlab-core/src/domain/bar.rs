//! Aggregated spread bar used for backtest replay.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// OHLCV bar of the derived spread price, plus the observed spread rate.
///
/// `value` carries the bar-level notional used for turnover accounting;
/// loaders default it to `close` when the source has no notional column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadBar {
    pub datetime: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Percentage-based spread rate observed at this bar.
    pub spread_rate: f64,
    pub value: f64,
}

impl SpreadBar {
    /// Calendar date this bar belongs to (daily PnL bucket).
    pub fn date(&self) -> NaiveDate {
        self.datetime.date()
    }

    /// Basic OHLC sanity check: high is the top, low is the bottom.
    pub fn is_sane(&self) -> bool {
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }
}

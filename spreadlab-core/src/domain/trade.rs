//! Fill records.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::direction::{Direction, Offset};
use super::ids::{OrderId, TradeId};

/// A confirmed fill, either on a single leg (live) or on the whole spread
/// (backtest, where fills are all-or-nothing).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeData {
    pub id: TradeId,
    pub order_id: OrderId,
    pub symbol: String,
    pub direction: Direction,
    pub offset: Offset,
    pub price: f64,
    pub volume: f64,
    /// Notional used for turnover accounting (bar value in bar-mode
    /// backtests, trade price otherwise).
    pub value: f64,
    /// Spread rate observed when the fill crossed, 0 in price mode.
    pub spread_rate: f64,
    pub datetime: NaiveDateTime,
}

impl TradeData {
    /// Volume signed by direction: positive for Long, negative for Short.
    pub fn signed_volume(&self) -> f64 {
        self.direction.sign() * self.volume
    }
}

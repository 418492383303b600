//! Level-1 tick snapshot for a single leg contract.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Best bid/ask quote plus last trade price for one symbol.
///
/// A tick with zero bid or ask price means "no quote yet"; consumers treat
/// it as wait-for-data rather than an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickData {
    pub symbol: String,
    pub datetime: NaiveDateTime,
    pub last_price: f64,
    pub bid_price: f64,
    pub bid_volume: f64,
    pub ask_price: f64,
    pub ask_volume: f64,
}

impl TickData {
    /// True once both sides of the book have a price.
    pub fn has_quote(&self) -> bool {
        self.bid_price > 0.0 && self.ask_price > 0.0
    }
}

//! Leg order data and the order lifecycle state machine.

use super::direction::{Direction, Offset};
use super::ids::OrderId;
use serde::{Deserialize, Serialize};

/// Order lifecycle states.
///
/// `Rejected` is what a gateway reject or timeout surfaces as; algos treat
/// it exactly like `Cancelled` (the leg is freed to re-attempt).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Submitting,
    NotTraded,
    PartTraded,
    AllTraded,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// True while the order can still receive fills.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            OrderStatus::Submitting | OrderStatus::NotTraded | OrderStatus::PartTraded
        )
    }
}

/// Request sent to the order gateway collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub direction: Direction,
    pub offset: Offset,
    pub price: f64,
    pub volume: f64,
}

/// Status snapshot of a single leg order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderData {
    pub id: OrderId,
    pub symbol: String,
    pub direction: Direction,
    pub offset: Offset,
    pub price: f64,
    pub volume: f64,
    pub traded: f64,
    pub status: OrderStatus,
}

impl OrderData {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn remaining(&self) -> f64 {
        self.volume - self.traded
    }
}

//! Reference data: contract specifications and positions.

use serde::{Deserialize, Serialize};

use super::direction::Direction;

/// Static contract specification from the reference-data collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractData {
    pub symbol: String,
    /// Minimum price increment.
    pub pricetick: f64,
    /// Contract multiplier (notional per point).
    pub size: f64,
}

/// Position snapshot from the position/query collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionData {
    pub symbol: String,
    pub direction: Direction,
    pub volume: f64,
}

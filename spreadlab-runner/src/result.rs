//! Serializable bundle of one finished backtest run.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use spreadlab_core::domain::TradeData;

use crate::daily::DailyResult;
use crate::statistics::BacktestStatistics;

/// Everything a run produced: the statistics, the daily chain, and the
/// trade log. Written as JSON for downstream analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub spread: String,
    pub strategy: String,
    pub statistics: BacktestStatistics,
    pub daily: Vec<DailyResult>,
    pub trades: Vec<TradeData>,
}

impl BacktestReport {
    pub fn new(
        spread: &str,
        strategy: &str,
        statistics: BacktestStatistics,
        daily: Vec<DailyResult>,
        trades: Vec<TradeData>,
    ) -> Self {
        BacktestReport {
            spread: spread.to_string(),
            strategy: strategy.to_string(),
            statistics,
            daily,
            trades,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serializing backtest report")
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_json()?;
        fs::write(path, json).with_context(|| format!("writing report to {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip() {
        let report = BacktestReport::new(
            "near-far",
            "grid_spread",
            BacktestStatistics::default(),
            Vec::new(),
            Vec::new(),
        );
        let json = report.to_json().unwrap();
        let back: BacktestReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.spread, "near-far");
        assert_eq!(back.strategy, "grid_spread");
    }

    #[test]
    fn writes_a_report_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = BacktestReport::new(
            "near-far",
            "grid_spread",
            BacktestStatistics::default(),
            Vec::new(),
            Vec::new(),
        );
        report.write_json(&path).unwrap();
        assert!(path.exists());
    }
}

//! SpreadLab Runner — backtest orchestration and optimization.
//!
//! This crate builds on `spreadlab-core` to provide:
//! - CSV history loading for spread bars and ticks
//! - Deterministic bar/tick replay through a spread strategy
//! - Daily PnL accounting and aggregate performance statistics
//! - TOML run configuration and JSON reports
//! - Grid and genetic parameter optimization with a content-addressed
//!   evaluation cache

pub mod backtest;
pub mod cache;
pub mod config;
pub mod daily;
pub mod data;
pub mod ga;
pub mod optimize;
pub mod result;
pub mod statistics;
pub mod strategy;

pub use backtest::{BacktestAlgo, BacktestEngine, BacktestMode, BacktestParams, RunError};
pub use cache::{setting_key, EvalCache};
pub use config::{ConfigError, OptimizationSection, ParameterRange, RunConfig};
pub use daily::DailyResult;
pub use data::{load_bars, load_ticks, LoadError, SpreadTick};
pub use ga::{run_ga_optimization, GaConfig};
pub use optimize::{
    run_grid_optimization, OptimizationResult, OptimizationSetting, OptimizeError, ParamSet,
};
pub use result::BacktestReport;
pub use statistics::{BacktestStatistics, ANNUAL_DAYS};
pub use strategy::{
    GridSpreadStrategy, SpreadStrategy, StrategyContext, StrategyError, StrategyParams,
    StrategyRegistry,
};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn params_and_results_are_send_sync() {
        assert_send::<BacktestParams>();
        assert_sync::<BacktestParams>();
        assert_send::<BacktestStatistics>();
        assert_sync::<BacktestStatistics>();
        assert_send::<DailyResult>();
        assert_sync::<DailyResult>();
        assert_send::<BacktestReport>();
        assert_sync::<BacktestReport>();
    }

    #[test]
    fn optimization_types_are_send_sync() {
        assert_send::<OptimizationSetting>();
        assert_sync::<OptimizationSetting>();
        assert_send::<OptimizationResult>();
        assert_sync::<OptimizationResult>();
        assert_send::<EvalCache>();
        assert_sync::<EvalCache>();
        assert_send::<GaConfig>();
        assert_sync::<GaConfig>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<RunConfig>();
        assert_sync::<RunConfig>();
    }
}

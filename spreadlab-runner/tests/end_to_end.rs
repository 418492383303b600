//! Integration tests for the runner: config file in, statistics out.
//!
//! Exercises the whole chain — TOML config, CSV history, strategy registry,
//! replay engine, daily PnL, statistics, and both optimization searches.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use spreadlab_runner::{
    load_bars, run_ga_optimization, run_grid_optimization, BacktestEngine, BacktestStatistics,
    EvalCache, GaConfig, OptimizationSetting, ParamSet, RunConfig, StrategyParams,
    StrategyRegistry,
};

const CONFIG: &str = r#"
    [spread]
    name = "near-far"
    active_leg = "NEAR"
    trading_type = "price"

    [[spread.legs]]
    symbol = "NEAR"
    price_multiplier = 1.0
    trading_multiplier = 1.0

    [[spread.legs]]
    symbol = "FAR"
    price_multiplier = -1.0
    trading_multiplier = -1.0

    [backtest]
    mode = "bar"
    start = 2024-01-02
    end = 2024-01-31
    rate = 0.0002
    capital = 100000.0

    [strategy]
    name = "grid_spread"

    [strategy.params]
    base_price = 2.0
    grid_step = 0.5
    grid_lots = 1.0
    max_pos = 3.0
"#;

/// A month of minute bars walking the spread price down through the grid
/// and partway back up, so the grid strategy trades both directions.
fn write_bar_csv(path: &Path) {
    let mut file = std::fs::File::create(path).unwrap();
    writeln!(file, "datetime,open,high,low,close,volume,spread_rate,value").unwrap();

    let closes = [
        2.0, 1.9, 1.7, 1.4, 1.2, 1.0, 0.8, 0.9, 1.1, 1.4, 1.6, 1.9, 2.1, 2.3,
    ];
    for (day, chunk) in closes.chunks(4).enumerate() {
        for (minute, close) in chunk.iter().enumerate() {
            writeln!(
                file,
                "2024-01-{:02} 09:{:02}:00,{close},{close},{close},{close},100,{close},{close}",
                day + 2,
                30 + minute,
            )
            .unwrap();
        }
    }
}

fn run_once(config: &RunConfig, overrides: &ParamSet, data: &Path) -> anyhow::Result<BacktestStatistics> {
    let mut params: StrategyParams = config.strategy.params.clone();
    for (name, value) in overrides {
        params.insert(name.clone(), *value);
    }
    let registry = StrategyRegistry::with_defaults();
    let mut strategy = registry.create(&config.strategy.name, &params)?;

    let mut engine = BacktestEngine::new(
        &config.spread.name,
        config.spread.trading_type,
        config.backtest_params(),
    )?;
    engine.load_bars(load_bars(data)?);
    engine.run_backtesting(strategy.as_mut())?;
    let daily = engine.calculate_result();
    Ok(engine.calculate_statistics(&daily))
}

#[test]
fn config_and_csv_drive_a_full_backtest() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("bars.csv");
    write_bar_csv(&data);
    let config = RunConfig::from_str(CONFIG).unwrap();

    let stats = run_once(&config, &ParamSet::new(), &data).unwrap();

    assert!(stats.total_days >= 3);
    assert!(stats.total_trade_count > 0, "grid never traded");
    // Balance chain is consistent with the PnL totals.
    assert!((stats.end_balance - (stats.capital + stats.total_net_pnl)).abs() < 1e-6);
    assert!(stats.total_commission > 0.0);
}

#[test]
fn replays_are_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("bars.csv");
    write_bar_csv(&data);
    let config = RunConfig::from_str(CONFIG).unwrap();

    let first = run_once(&config, &ParamSet::new(), &data).unwrap();
    let second = run_once(&config, &ParamSet::new(), &data).unwrap();
    assert_eq!(first, second);
}

#[test]
fn grid_optimization_sweeps_real_backtests() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("bars.csv");
    write_bar_csv(&data);
    let config = RunConfig::from_str(CONFIG).unwrap();

    let mut setting = OptimizationSetting::new("end_balance");
    setting
        .add_parameter("grid_step", 0.25, Some(0.75), Some(0.25))
        .unwrap();

    let results =
        run_grid_optimization(&setting, |overrides| run_once(&config, overrides, &data)).unwrap();

    assert_eq!(results.len(), 3);
    for result in &results {
        assert!(result.statistics.is_some());
        assert!(result.error.is_none());
    }
    // Sorted best-first on the target.
    assert!(results[0].fitness() >= results[1].fitness());
    assert!(results[1].fitness() >= results[2].fitness());
}

#[test]
fn bad_parameters_fail_their_evaluation_only() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("bars.csv");
    write_bar_csv(&data);
    let config = RunConfig::from_str(CONFIG).unwrap();

    // grid_step 0.0 is rejected by the strategy factory.
    let mut setting = OptimizationSetting::new("end_balance");
    setting
        .add_parameter("grid_step", 0.0, Some(0.5), Some(0.5))
        .unwrap();

    let results =
        run_grid_optimization(&setting, |overrides| run_once(&config, overrides, &data)).unwrap();

    assert_eq!(results.len(), 2);
    let failed: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();
    let succeeded: Vec<_> = results.iter().filter(|r| r.error.is_none()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(succeeded.len(), 1);
    assert_eq!(failed[0].setting["grid_step"], 0.0);
    // The failure sorts last.
    assert!(results[1].error.is_some());
}

#[test]
fn genetic_search_reuses_cached_evaluations() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("bars.csv");
    write_bar_csv(&data);
    let config = RunConfig::from_str(CONFIG).unwrap();

    let mut setting = OptimizationSetting::new("end_balance");
    setting
        .add_parameter("grid_step", 0.25, Some(1.0), Some(0.25))
        .unwrap();
    setting
        .add_parameter("max_pos", 1.0, Some(4.0), Some(1.0))
        .unwrap();

    let ga = GaConfig {
        population: 8,
        generations: 4,
        seed: Some(11),
        ..Default::default()
    };
    let cache = EvalCache::with_dir(dir.path().join("cache")).unwrap();
    let calls = AtomicUsize::new(0);

    let evaluate = |overrides: &ParamSet| {
        calls.fetch_add(1, Ordering::SeqCst);
        run_once(&config, overrides, &data)
    };

    let first = run_ga_optimization(&setting, &ga, &cache, evaluate).unwrap();
    let first_calls = calls.load(Ordering::SeqCst);
    assert!(first_calls > 0);
    assert_eq!(first_calls, cache.len());

    // Same seed, warm cache: identical leaderboard, zero new backtests.
    let second = run_ga_optimization(&setting, &ga, &cache, evaluate).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), first_calls);
    assert_eq!(first[0].setting, second[0].setting);
    assert_eq!(first[0].target_value, second[0].target_value);
}

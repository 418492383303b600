//! SpreadLab CLI — backtest and optimization commands.
//!
//! Commands:
//! - `run` — execute one backtest from a TOML config file, print the report
//! - `optimize` — sweep the config's optimization block (grid or genetic)

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use spreadlab_runner::{
    load_bars, load_ticks, run_ga_optimization, run_grid_optimization, BacktestEngine,
    BacktestMode, BacktestReport, BacktestStatistics, EvalCache, OptimizationResult, ParamSet,
    RunConfig, StrategyParams, StrategyRegistry,
};

#[derive(Parser)]
#[command(
    name = "spreadlab",
    about = "SpreadLab CLI — spread trading backtest engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one backtest and print the performance report.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// CSV history file (bars or ticks per the config's mode).
        #[arg(long)]
        data: PathBuf,

        /// Write the full JSON report here.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Sweep the config's optimization parameters.
    Optimize {
        /// Path to a TOML config file with an [optimization] block.
        #[arg(long)]
        config: PathBuf,

        /// CSV history file (bars or ticks per the config's mode).
        #[arg(long)]
        data: PathBuf,

        /// Search algorithm.
        #[arg(long, value_enum, default_value_t = Algorithm::Grid)]
        algorithm: Algorithm,

        /// Directory for the evaluation cache. Omit for in-memory only.
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// How many results to print.
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Algorithm {
    Grid,
    Genetic,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            data,
            output,
        } => run_cmd(&config, &data, output.as_deref()),
        Commands::Optimize {
            config,
            data,
            algorithm,
            cache_dir,
            top,
        } => optimize_cmd(&config, &data, algorithm, cache_dir, top),
    }
}

enum History {
    Bars(Vec<spreadlab_core::domain::SpreadBar>),
    Ticks(Vec<spreadlab_runner::SpreadTick>),
}

fn load_history(config: &RunConfig, data: &std::path::Path) -> Result<History> {
    let history = match config.backtest.mode {
        BacktestMode::Bar => History::Bars(load_bars(data)?),
        BacktestMode::Tick => History::Ticks(load_ticks(data)?),
    };
    Ok(history)
}

fn build_engine(config: &RunConfig, history: &History) -> Result<BacktestEngine> {
    let mut engine = BacktestEngine::new(
        &config.spread.name,
        config.spread.trading_type,
        config.backtest_params(),
    )?;
    match history {
        History::Bars(bars) => engine.load_bars(bars.clone()),
        History::Ticks(ticks) => engine.load_ticks(ticks.clone()),
    }
    Ok(engine)
}

fn run_cmd(config_path: &std::path::Path, data: &std::path::Path, output: Option<&std::path::Path>) -> Result<()> {
    let config = RunConfig::from_path(config_path)?;
    let history = load_history(&config, data)?;

    let registry = StrategyRegistry::with_defaults();
    let mut strategy = registry.create(&config.strategy.name, &config.strategy.params)?;

    let mut engine = build_engine(&config, &history)?;
    engine.run_backtesting(strategy.as_mut())?;
    let daily = engine.calculate_result();
    let statistics = engine.calculate_statistics(&daily);

    print_summary(&config, &statistics);

    if let Some(path) = output {
        let report = BacktestReport::new(
            &config.spread.name,
            &config.strategy.name,
            statistics,
            daily,
            engine.trades().to_vec(),
        );
        report.write_json(path)?;
        println!("Report written to: {}", path.display());
    }
    Ok(())
}

fn optimize_cmd(
    config_path: &std::path::Path,
    data: &std::path::Path,
    algorithm: Algorithm,
    cache_dir: Option<PathBuf>,
    top: usize,
) -> Result<()> {
    let config = RunConfig::from_path(config_path)?;
    let Some(optimization) = config.optimization.clone() else {
        bail!("config has no [optimization] block");
    };
    let setting = optimization.build_setting()?;
    let history = load_history(&config, data)?;
    let registry = StrategyRegistry::with_defaults();

    let evaluate = |overrides: &ParamSet| -> Result<BacktestStatistics> {
        let mut params: StrategyParams = config.strategy.params.clone();
        for (name, value) in overrides {
            params.insert(name.clone(), *value);
        }
        let mut strategy = registry
            .create(&config.strategy.name, &params)
            .context("building strategy for evaluation")?;
        let mut engine = build_engine(&config, &history)?;
        engine.run_backtesting(strategy.as_mut())?;
        let daily = engine.calculate_result();
        Ok(engine.calculate_statistics(&daily))
    };

    let results = match algorithm {
        Algorithm::Grid => run_grid_optimization(&setting, evaluate)?,
        Algorithm::Genetic => {
            let cache = match cache_dir {
                Some(dir) => EvalCache::with_dir(dir)?,
                None => EvalCache::new(),
            };
            run_ga_optimization(&setting, &optimization.ga_config(), &cache, evaluate)?
        }
    };

    print_leaderboard(&setting.target, &results, top);
    Ok(())
}

fn print_summary(config: &RunConfig, stats: &BacktestStatistics) {
    println!();
    println!("=== Backtest Result ===");
    println!("Spread:          {}", config.spread.name);
    println!("Strategy:        {}", config.strategy.name);
    if let (Some(start), Some(end)) = (stats.start_date, stats.end_date) {
        println!("Period:          {start} to {end}");
    }
    println!(
        "Days:            {} ({} up, {} down)",
        stats.total_days, stats.profit_days, stats.loss_days
    );
    println!("Trades:          {}", stats.total_trade_count);
    println!();
    println!("--- Performance ---");
    println!("Capital:         {:.2}", stats.capital);
    println!("End Balance:     {:.2}", stats.end_balance);
    println!("Total Net PnL:   {:.2}", stats.total_net_pnl);
    println!("Commission:      {:.2}", stats.total_commission);
    println!("Slippage:        {:.2}", stats.total_slippage);
    println!("Total Return:    {:.2}%", stats.total_return);
    println!("Annual Return:   {:.2}%", stats.annual_return);
    println!("Max Drawdown:    {:.2} ({:.2}%)", stats.max_drawdown, stats.max_ddpercent);
    println!("Sharpe:          {:.3}", stats.sharpe_ratio);
    println!("Return/Drawdown: {:.3}", stats.return_drawdown_ratio);
    println!();
}

fn print_leaderboard(target: &str, results: &[OptimizationResult], top: usize) {
    println!();
    println!("=== Optimization Results (target: {target}) ===");
    for (rank, result) in results.iter().take(top).enumerate() {
        let value = match result.target_value {
            Some(value) => format!("{value:.4}"),
            None => format!(
                "failed: {}",
                result.error.as_deref().unwrap_or("unknown error")
            ),
        };
        let setting: Vec<String> = result
            .setting
            .iter()
            .map(|(name, v)| format!("{name}={v}"))
            .collect();
        println!("{:>3}. {value:<14} {}", rank + 1, setting.join(", "));
    }
    println!();
}

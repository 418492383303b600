//! TOML run configuration: spread definition, engine parameters, strategy
//! selection, and the optional optimization block.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use spreadlab_core::spread::{LegConfig, SpreadData, SpreadError, TradingType};

use crate::backtest::{BacktestMode, BacktestParams};
use crate::ga::GaConfig;
use crate::optimize::{OptimizationSetting, OptimizeError};
use crate::strategy::StrategyParams;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Spread(#[from] SpreadError),
    #[error(transparent)]
    Optimize(#[from] OptimizeError),
}

/// Top-level run configuration, one spread per file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub spread: SpreadSection,
    pub backtest: BacktestSection,
    pub strategy: StrategySection,
    pub optimization: Option<OptimizationSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadSection {
    pub name: String,
    pub active_leg: String,
    #[serde(default = "default_min_volume")]
    pub min_volume: f64,
    pub trading_type: TradingType,
    pub legs: Vec<LegConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestSection {
    pub mode: BacktestMode,
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default)]
    pub rate: f64,
    #[serde(default)]
    pub slippage: f64,
    #[serde(default = "default_size")]
    pub size: f64,
    #[serde(default = "default_pricetick")]
    pub pricetick: f64,
    #[serde(default = "default_capital")]
    pub capital: f64,
    #[serde(default)]
    pub init_days: u32,
    #[serde(default = "default_outlier_window")]
    pub outlier_window: usize,
    #[serde(default = "default_outlier_k")]
    pub outlier_k: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySection {
    pub name: String,
    #[serde(default)]
    pub params: StrategyParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationSection {
    pub target: String,
    pub parameters: Vec<ParameterRange>,
    pub genetic: Option<GeneticSection>,
}

/// One swept parameter; `end`/`step` omitted means fixed at `start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterRange {
    pub name: String,
    pub start: f64,
    pub end: Option<f64>,
    pub step: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneticSection {
    #[serde(default = "default_population")]
    pub population: usize,
    #[serde(default = "default_generations")]
    pub generations: usize,
    pub seed: Option<u64>,
}

fn default_min_volume() -> f64 {
    1.0
}
fn default_size() -> f64 {
    1.0
}
fn default_pricetick() -> f64 {
    0.01
}
fn default_capital() -> f64 {
    1_000_000.0
}
fn default_outlier_window() -> usize {
    17
}
fn default_outlier_k() -> f64 {
    3.0
}
fn default_population() -> usize {
    GaConfig::default().population
}
fn default_generations() -> usize {
    GaConfig::default().generations
}

impl RunConfig {
    pub fn from_str(text: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(text)?;
        // Spread construction validates legs and multipliers up front.
        config.build_spread()?;
        if let Some(optimization) = &config.optimization {
            optimization.build_setting()?;
        }
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&text)
    }

    pub fn build_spread(&self) -> Result<SpreadData, SpreadError> {
        SpreadData::new(
            &self.spread.name,
            &self.spread.legs,
            &self.spread.active_leg,
            self.spread.min_volume,
            self.spread.trading_type,
        )
    }

    pub fn backtest_params(&self) -> BacktestParams {
        let b = &self.backtest;
        BacktestParams {
            mode: b.mode,
            start: b.start,
            end: b.end,
            rate: b.rate,
            slippage: b.slippage,
            size: b.size,
            pricetick: b.pricetick,
            capital: b.capital,
            init_days: b.init_days,
            outlier_window: b.outlier_window,
            outlier_k: b.outlier_k,
        }
    }
}

impl OptimizationSection {
    pub fn build_setting(&self) -> Result<OptimizationSetting, OptimizeError> {
        let mut setting = OptimizationSetting::new(&self.target);
        for range in &self.parameters {
            setting.add_parameter(&range.name, range.start, range.end, range.step)?;
        }
        Ok(setting)
    }

    pub fn ga_config(&self) -> GaConfig {
        match &self.genetic {
            Some(genetic) => GaConfig {
                population: genetic.population,
                generations: genetic.generations,
                seed: genetic.seed,
                ..Default::default()
            },
            None => GaConfig::default(),
        }
    }
}

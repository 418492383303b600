//! Parameter grid definition and parallel sweep execution.
//!
//! Each evaluation is a pure function of its parameter set and runs on its
//! own engine instance, so workers share nothing and a failing evaluation
//! is isolated into its result entry instead of aborting the sweep.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::statistics::BacktestStatistics;

/// One concrete parameter assignment. BTreeMap keeps the serialization
/// deterministic, which the evaluation cache key depends on.
pub type ParamSet = BTreeMap<String, f64>;

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("parameter '{0}': end is below start")]
    InvertedRange(String),
    #[error("parameter '{0}': step must be positive")]
    BadStep(String),
    #[error("no optimization parameters defined")]
    NoParameters,
}

/// The sweep space: per-parameter value lists plus the target statistic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationSetting {
    params: BTreeMap<String, Vec<f64>>,
    pub target: String,
}

impl OptimizationSetting {
    pub fn new(target: &str) -> Self {
        OptimizationSetting {
            params: BTreeMap::new(),
            target: target.to_string(),
        }
    }

    /// Adds a swept parameter. Without `end`/`step` the parameter is fixed
    /// at `start`.
    pub fn add_parameter(
        &mut self,
        name: &str,
        start: f64,
        end: Option<f64>,
        step: Option<f64>,
    ) -> Result<&mut Self, OptimizeError> {
        let values = match (end, step) {
            (Some(end), Some(step)) => {
                if end < start {
                    return Err(OptimizeError::InvertedRange(name.to_string()));
                }
                if step <= 0.0 {
                    return Err(OptimizeError::BadStep(name.to_string()));
                }
                let mut values = Vec::new();
                let mut value = start;
                // Half-step tolerance absorbs float drift at the range end.
                while value <= end + step * 0.5 {
                    values.push(value);
                    value += step;
                }
                values
            }
            _ => vec![start],
        };
        self.params.insert(name.to_string(), values);
        Ok(self)
    }

    /// Per-parameter value lists, for the genetic search's gene pool.
    pub fn parameter_values(&self) -> Vec<(String, Vec<f64>)> {
        self.params
            .iter()
            .map(|(name, values)| (name.clone(), values.clone()))
            .collect()
    }

    /// Cartesian product of all parameter value lists.
    pub fn generate_settings(&self) -> Vec<ParamSet> {
        let mut settings: Vec<ParamSet> = vec![ParamSet::new()];
        for (name, values) in &self.params {
            let mut expanded = Vec::with_capacity(settings.len() * values.len());
            for setting in &settings {
                for &value in values {
                    let mut next = setting.clone();
                    next.insert(name.clone(), value);
                    expanded.push(next);
                }
            }
            settings = expanded;
        }
        if self.params.is_empty() {
            settings.clear();
        }
        settings
    }
}

/// Outcome of one parameter evaluation. A failed evaluation carries its
/// error string and no statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub setting: ParamSet,
    pub target_value: Option<f64>,
    pub statistics: Option<BacktestStatistics>,
    pub error: Option<String>,
}

impl OptimizationResult {
    pub fn fitness(&self) -> f64 {
        self.target_value.unwrap_or(f64::NEG_INFINITY)
    }
}

/// Sorts results best-first; failed evaluations sink to the bottom.
pub fn sort_results(results: &mut [OptimizationResult]) {
    results.sort_by(|a, b| {
        b.fitness()
            .partial_cmp(&a.fitness())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Runs the full grid in parallel, one engine per rayon worker.
pub fn run_grid_optimization<F>(
    setting: &OptimizationSetting,
    evaluate: F,
) -> Result<Vec<OptimizationResult>, OptimizeError>
where
    F: Fn(&ParamSet) -> anyhow::Result<BacktestStatistics> + Sync,
{
    let settings = setting.generate_settings();
    if settings.is_empty() {
        return Err(OptimizeError::NoParameters);
    }
    info!(
        evaluations = settings.len(),
        target = %setting.target,
        "grid optimization started"
    );

    let mut results: Vec<OptimizationResult> = settings
        .par_iter()
        .map(|params| evaluate_one(params, &setting.target, &evaluate))
        .collect();

    sort_results(&mut results);
    Ok(results)
}

pub(crate) fn evaluate_one<F>(
    params: &ParamSet,
    target: &str,
    evaluate: &F,
) -> OptimizationResult
where
    F: Fn(&ParamSet) -> anyhow::Result<BacktestStatistics>,
{
    match evaluate(params) {
        Ok(statistics) => OptimizationResult {
            setting: params.clone(),
            target_value: statistics.statistic(target),
            statistics: Some(statistics),
            error: None,
        },
        Err(err) => {
            warn!(setting = ?params, %err, "evaluation failed");
            OptimizationResult {
                setting: params.clone(),
                target_value: None,
                statistics: None,
                error: Some(err.to_string()),
            }
        }
    }
}

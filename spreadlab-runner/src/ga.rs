//! Genetic search over the parameter grid.
//!
//! A (mu + lambda) scheme: each generation breeds `population` offspring
//! from tournament-selected parents, then keeps the best `population`
//! individuals out of parents and offspring combined. Individuals are
//! index vectors into the per-parameter value lists, so every candidate
//! stays on the grid and the evaluation cache applies directly.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::cache::{setting_key, EvalCache};
use crate::optimize::{
    evaluate_one, sort_results, OptimizationResult, OptimizationSetting, OptimizeError, ParamSet,
};
use crate::statistics::BacktestStatistics;

#[derive(Debug, Clone)]
pub struct GaConfig {
    pub population: usize,
    pub generations: usize,
    pub crossover_prob: f64,
    pub mutation_prob: f64,
    pub tournament_size: usize,
    /// Fixed seed makes the search reproducible.
    pub seed: Option<u64>,
}

impl Default for GaConfig {
    fn default() -> Self {
        GaConfig {
            population: 40,
            generations: 15,
            crossover_prob: 0.9,
            mutation_prob: 0.1,
            tournament_size: 3,
            seed: None,
        }
    }
}

/// Indices into the gene pool's value lists, one per parameter.
type Individual = Vec<usize>;

struct GenePool {
    genes: Vec<(String, Vec<f64>)>,
}

impl GenePool {
    fn random(&self, rng: &mut StdRng) -> Individual {
        self.genes
            .iter()
            .map(|(_, values)| rng.gen_range(0..values.len()))
            .collect()
    }

    fn decode(&self, individual: &Individual) -> ParamSet {
        self.genes
            .iter()
            .zip(individual)
            .map(|((name, values), &index)| (name.clone(), values[index]))
            .collect()
    }
}

/// Runs the genetic search and returns the final population's results,
/// best first. Every evaluation goes through `cache`, so identical
/// settings are only backtested once across the whole run.
pub fn run_ga_optimization<F>(
    setting: &OptimizationSetting,
    config: &GaConfig,
    cache: &EvalCache,
    evaluate: F,
) -> Result<Vec<OptimizationResult>, OptimizeError>
where
    F: Fn(&ParamSet) -> anyhow::Result<BacktestStatistics> + Sync,
{
    let genes = setting.parameter_values();
    if genes.is_empty() {
        return Err(OptimizeError::NoParameters);
    }
    let pool = GenePool { genes };

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    info!(
        population = config.population,
        generations = config.generations,
        target = %setting.target,
        "genetic optimization started"
    );

    let mut population: Vec<Individual> = (0..config.population.max(2))
        .map(|_| pool.random(&mut rng))
        .collect();
    let mut scored = score(&population, &pool, &setting.target, cache, &evaluate);

    for generation in 0..config.generations {
        let offspring = breed(&population, &scored, &pool, config, &mut rng);
        let offspring_scored = score(&offspring, &pool, &setting.target, cache, &evaluate);

        // mu + lambda: parents compete with offspring for survival.
        let mut combined: Vec<(Individual, OptimizationResult)> = population
            .into_iter()
            .zip(scored)
            .chain(offspring.into_iter().zip(offspring_scored))
            .collect();
        combined.sort_by(|a, b| {
            b.1.fitness()
                .partial_cmp(&a.1.fitness())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        combined.truncate(config.population.max(2));

        (population, scored) = combined.into_iter().unzip();
        debug!(
            generation,
            best = scored[0].fitness(),
            cached = cache.len(),
            "generation complete"
        );
    }

    let mut results = scored;
    sort_results(&mut results);
    let mut seen = HashSet::new();
    results.retain(|result| seen.insert(setting_key(&result.setting)));
    Ok(results)
}

/// Scores a batch. Duplicate and already-cached settings are resolved from
/// the cache; only genuinely new settings are backtested, in parallel.
fn score<F>(
    population: &[Individual],
    pool: &GenePool,
    target: &str,
    cache: &EvalCache,
    evaluate: &F,
) -> Vec<OptimizationResult>
where
    F: Fn(&ParamSet) -> anyhow::Result<BacktestStatistics> + Sync,
{
    let decoded: Vec<(String, ParamSet)> = population
        .iter()
        .map(|individual| {
            let params = pool.decode(individual);
            (setting_key(&params), params)
        })
        .collect();

    let mut known: HashMap<String, OptimizationResult> = HashMap::new();
    let mut pending: Vec<(String, ParamSet)> = Vec::new();
    for (key, params) in &decoded {
        if known.contains_key(key) || pending.iter().any(|(k, _)| k == key) {
            continue;
        }
        match cache.get(params) {
            Some(cached) => {
                known.insert(key.clone(), cached);
            }
            None => pending.push((key.clone(), params.clone())),
        }
    }

    let fresh: Vec<OptimizationResult> = pending
        .par_iter()
        .map(|(_, params)| evaluate_one(params, target, evaluate))
        .collect();
    for ((key, params), result) in pending.into_iter().zip(fresh) {
        if let Err(err) = cache.put(&params, result.clone()) {
            debug!(%err, "cache write failed");
        }
        known.insert(key, result);
    }

    decoded
        .into_iter()
        .map(|(key, _)| known[&key].clone())
        .collect()
}

fn breed(
    population: &[Individual],
    scored: &[OptimizationResult],
    pool: &GenePool,
    config: &GaConfig,
    rng: &mut StdRng,
) -> Vec<Individual> {
    let mut offspring = Vec::with_capacity(population.len());
    while offspring.len() < population.len() {
        let mut a = tournament(population, scored, config.tournament_size, rng).clone();
        let mut b = tournament(population, scored, config.tournament_size, rng).clone();

        if rng.gen_bool(config.crossover_prob) {
            crossover(&mut a, &mut b, rng);
        }
        mutate(&mut a, pool, config.mutation_prob, rng);
        mutate(&mut b, pool, config.mutation_prob, rng);

        offspring.push(a);
        if offspring.len() < population.len() {
            offspring.push(b);
        }
    }
    offspring
}

fn tournament<'a>(
    population: &'a [Individual],
    scored: &[OptimizationResult],
    size: usize,
    rng: &mut StdRng,
) -> &'a Individual {
    let mut best = rng.gen_range(0..population.len());
    for _ in 1..size.max(1) {
        let challenger = rng.gen_range(0..population.len());
        if scored[challenger].fitness() > scored[best].fitness() {
            best = challenger;
        }
    }
    &population[best]
}

/// Two-point crossover; with a single gene it degenerates to a swap.
fn crossover(a: &mut Individual, b: &mut Individual, rng: &mut StdRng) {
    let len = a.len();
    if len < 2 {
        std::mem::swap(a, b);
        return;
    }
    let mut lo = rng.gen_range(0..len);
    let mut hi = rng.gen_range(0..len);
    if lo > hi {
        std::mem::swap(&mut lo, &mut hi);
    }
    for i in lo..=hi {
        std::mem::swap(&mut a[i], &mut b[i]);
    }
}

fn mutate(individual: &mut Individual, pool: &GenePool, prob: f64, rng: &mut StdRng) {
    for (index, (_, values)) in individual.iter_mut().zip(&pool.genes) {
        if rng.gen_bool(prob) {
            *index = rng.gen_range(0..values.len());
        }
    }
}

//! Strategy trait, compile-time registry, and the bundled grid strategy.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use spreadlab_core::domain::{AlgoId, Direction, SpreadBar};

use crate::backtest::BacktestAlgo;
use crate::data::SpreadTick;

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("unknown strategy '{0}'")]
    Unknown(String),
    #[error("strategy '{strategy}' is missing parameter '{parameter}'")]
    MissingParameter { strategy: String, parameter: String },
    #[error("strategy '{strategy}' rejected parameter '{parameter}' = {value}: {reason}")]
    BadParameter {
        strategy: String,
        parameter: String,
        value: f64,
        reason: String,
    },
}

/// What a strategy asked the engine to do during a callback.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyAction {
    StartAlgo {
        algoid: AlgoId,
        direction: Direction,
        price: f64,
        volume: f64,
        payup: f64,
        interval: u32,
    },
    StopAlgo(AlgoId),
}

/// Engine surface handed to strategy callbacks.
///
/// Actions are queued and applied by the engine after the callback returns,
/// so a strategy never observes a half-applied engine state. Algo ids are
/// allocated eagerly so the strategy can track its own requests.
pub struct StrategyContext<'a> {
    spread_pos: f64,
    trading: bool,
    next_algo_id: &'a mut u64,
    actions: &'a mut Vec<StrategyAction>,
}

impl<'a> StrategyContext<'a> {
    pub(crate) fn new(
        spread_pos: f64,
        trading: bool,
        next_algo_id: &'a mut u64,
        actions: &'a mut Vec<StrategyAction>,
    ) -> Self {
        StrategyContext {
            spread_pos,
            trading,
            next_algo_id,
            actions,
        }
    }

    /// Current net spread position.
    pub fn spread_pos(&self) -> f64 {
        self.spread_pos
    }

    /// False during warm-up replay; algo requests are dropped then.
    pub fn is_trading(&self) -> bool {
        self.trading
    }

    pub fn start_long_algo(&mut self, price: f64, volume: f64, payup: f64, interval: u32) -> AlgoId {
        self.start_algo(Direction::Long, price, volume, payup, interval)
    }

    pub fn start_short_algo(
        &mut self,
        price: f64,
        volume: f64,
        payup: f64,
        interval: u32,
    ) -> AlgoId {
        self.start_algo(Direction::Short, price, volume, payup, interval)
    }

    fn start_algo(
        &mut self,
        direction: Direction,
        price: f64,
        volume: f64,
        payup: f64,
        interval: u32,
    ) -> AlgoId {
        *self.next_algo_id += 1;
        let algoid = AlgoId(*self.next_algo_id);
        if self.trading {
            self.actions.push(StrategyAction::StartAlgo {
                algoid,
                direction,
                price,
                volume,
                payup,
                interval,
            });
        } else {
            debug!(%algoid, "algo request during warm-up dropped");
        }
        algoid
    }

    pub fn stop_algo(&mut self, algoid: AlgoId) {
        if self.trading {
            self.actions.push(StrategyAction::StopAlgo(algoid));
        }
    }
}

/// A spread trading strategy driven by replay (or live) callbacks.
#[allow(unused_variables)]
pub trait SpreadStrategy: Send + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Called once before any data, warm-up included.
    fn on_init(&mut self, ctx: &mut StrategyContext) {}
    /// Called when warm-up ends and trading begins.
    fn on_start(&mut self, ctx: &mut StrategyContext) {}
    /// Called after the last datum.
    fn on_stop(&mut self, ctx: &mut StrategyContext) {}

    fn on_spread_bar(&mut self, ctx: &mut StrategyContext, bar: &SpreadBar) {}
    fn on_spread_tick(&mut self, ctx: &mut StrategyContext, tick: &SpreadTick) {}
    /// Net spread position changed.
    fn on_spread_pos(&mut self, ctx: &mut StrategyContext, net_pos: f64) {}
    /// One of this strategy's algos changed state.
    fn on_spread_algo(&mut self, ctx: &mut StrategyContext, algo: &BacktestAlgo) {}
}

pub type StrategyParams = BTreeMap<String, f64>;
pub type StrategyFactory =
    Box<dyn Fn(&StrategyParams) -> Result<Box<dyn SpreadStrategy>, StrategyError> + Send + Sync>;

/// Compile-time strategy registry: name → factory. Populated at startup,
/// replacing any notion of loading strategy classes by name at runtime.
pub struct StrategyRegistry {
    factories: HashMap<String, StrategyFactory>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        StrategyRegistry {
            factories: HashMap::new(),
        }
    }

    /// Registry with every bundled strategy registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(GridSpreadStrategy::NAME, |params| {
            Ok(Box::new(GridSpreadStrategy::from_params(params)?))
        });
        registry
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&StrategyParams) -> Result<Box<dyn SpreadStrategy>, StrategyError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn create(
        &self,
        name: &str,
        params: &StrategyParams,
    ) -> Result<Box<dyn SpreadStrategy>, StrategyError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| StrategyError::Unknown(name.to_string()))?;
        factory(params)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Grid trading over the spread price.
///
/// Divides the price axis into `grid_step` levels around `base_price` and
/// targets `grid_lots` spread lots per level below it (short above), capped
/// at ±`max_pos`. One working algo at a time closes the gap between the
/// target and the current position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridStrategyParams {
    pub base_price: f64,
    pub grid_step: f64,
    pub grid_lots: f64,
    pub max_pos: f64,
    pub payup: f64,
    pub interval: u32,
}

#[derive(Debug)]
pub struct GridSpreadStrategy {
    params: GridStrategyParams,
    working_algo: Option<AlgoId>,
}

impl GridSpreadStrategy {
    pub const NAME: &'static str = "grid_spread";

    pub fn new(params: GridStrategyParams) -> Self {
        GridSpreadStrategy {
            params,
            working_algo: None,
        }
    }

    pub fn from_params(params: &StrategyParams) -> Result<Self, StrategyError> {
        let get = |name: &str| {
            params
                .get(name)
                .copied()
                .ok_or_else(|| StrategyError::MissingParameter {
                    strategy: Self::NAME.to_string(),
                    parameter: name.to_string(),
                })
        };

        let grid_step = get("grid_step")?;
        if grid_step <= 0.0 {
            return Err(StrategyError::BadParameter {
                strategy: Self::NAME.to_string(),
                parameter: "grid_step".to_string(),
                value: grid_step,
                reason: "must be positive".to_string(),
            });
        }
        let grid_lots = get("grid_lots")?;
        if grid_lots <= 0.0 {
            return Err(StrategyError::BadParameter {
                strategy: Self::NAME.to_string(),
                parameter: "grid_lots".to_string(),
                value: grid_lots,
                reason: "must be positive".to_string(),
            });
        }

        Ok(Self::new(GridStrategyParams {
            base_price: get("base_price")?,
            grid_step,
            grid_lots,
            max_pos: get("max_pos")?,
            payup: params.get("payup").copied().unwrap_or(2.0),
            interval: params.get("interval").copied().unwrap_or(5.0) as u32,
        }))
    }

    /// Target position at a given spread price: long below the base, short
    /// above, one `grid_lots` block per full `grid_step`.
    fn target_pos(&self, price: f64) -> f64 {
        let levels = ((self.params.base_price - price) / self.params.grid_step).trunc();
        (levels * self.params.grid_lots).clamp(-self.params.max_pos, self.params.max_pos)
    }

    fn rebalance(&mut self, ctx: &mut StrategyContext, price: f64) {
        if self.working_algo.is_some() {
            return;
        }
        let diff = self.target_pos(price) - ctx.spread_pos();
        if diff.abs() < 1e-9 {
            return;
        }

        // Limit one step beyond the current price so the next datum crosses.
        let algoid = if diff > 0.0 {
            ctx.start_long_algo(
                price + self.params.grid_step,
                diff,
                self.params.payup,
                self.params.interval,
            )
        } else {
            ctx.start_short_algo(
                price - self.params.grid_step,
                -diff,
                self.params.payup,
                self.params.interval,
            )
        };
        if ctx.is_trading() {
            self.working_algo = Some(algoid);
        }
    }
}

impl SpreadStrategy for GridSpreadStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn on_start(&mut self, _ctx: &mut StrategyContext) {
        debug!(
            base_price = self.params.base_price,
            grid_step = self.params.grid_step,
            max_pos = self.params.max_pos,
            "grid strategy started"
        );
    }

    fn on_spread_bar(&mut self, ctx: &mut StrategyContext, bar: &SpreadBar) {
        self.rebalance(ctx, bar.close);
    }

    fn on_spread_tick(&mut self, ctx: &mut StrategyContext, tick: &SpreadTick) {
        let mid = (tick.bid_price + tick.ask_price) / 2.0;
        self.rebalance(ctx, mid);
    }

    fn on_spread_algo(&mut self, ctx: &mut StrategyContext, algo: &BacktestAlgo) {
        let _ = ctx;
        if self.working_algo == Some(algo.algoid) && !algo.status.is_active() {
            self.working_algo = None;
        } else if self.working_algo != Some(algo.algoid) {
            warn!(algoid = %algo.algoid, "update for untracked algo");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_params() -> StrategyParams {
        let mut params = StrategyParams::new();
        params.insert("base_price".into(), 2.0);
        params.insert("grid_step".into(), 0.5);
        params.insert("grid_lots".into(), 1.0);
        params.insert("max_pos".into(), 3.0);
        params
    }

    #[test]
    fn registry_creates_grid_strategy() {
        let registry = StrategyRegistry::with_defaults();
        let strategy = registry.create("grid_spread", &grid_params()).unwrap();
        assert_eq!(strategy.name(), "grid_spread");
    }

    #[test]
    fn registry_rejects_unknown_names() {
        let registry = StrategyRegistry::with_defaults();
        let err = registry.create("momentum", &grid_params()).unwrap_err();
        assert!(matches!(err, StrategyError::Unknown(_)));
    }

    #[test]
    fn missing_parameter_is_reported() {
        let mut params = grid_params();
        params.remove("max_pos");
        let err = GridSpreadStrategy::from_params(&params).unwrap_err();
        assert!(matches!(
            err,
            StrategyError::MissingParameter { ref parameter, .. } if parameter == "max_pos"
        ));
    }

    #[test]
    fn non_positive_step_is_rejected() {
        let mut params = grid_params();
        params.insert("grid_step".into(), 0.0);
        let err = GridSpreadStrategy::from_params(&params).unwrap_err();
        assert!(matches!(err, StrategyError::BadParameter { .. }));
    }

    #[test]
    fn target_position_steps_with_price() {
        let strategy = GridSpreadStrategy::from_params(&grid_params()).unwrap();
        // At the base: flat. One step below: long one block. Far below: capped.
        assert_eq!(strategy.target_pos(2.0), 0.0);
        assert_eq!(strategy.target_pos(1.5), 1.0);
        assert_eq!(strategy.target_pos(1.0), 2.0);
        assert_eq!(strategy.target_pos(-5.0), 3.0);
        assert_eq!(strategy.target_pos(2.5), -1.0);
        assert_eq!(strategy.target_pos(9.0), -3.0);
    }

    #[test]
    fn context_drops_requests_during_warmup() {
        let mut next_id = 0;
        let mut actions = Vec::new();
        let mut ctx = StrategyContext::new(0.0, false, &mut next_id, &mut actions);
        ctx.start_long_algo(2.0, 1.0, 2.0, 5);
        assert!(actions.is_empty());
        assert_eq!(next_id, 1);
    }

    #[test]
    fn context_queues_requests_when_trading() {
        let mut next_id = 0;
        let mut actions = Vec::new();
        let mut ctx = StrategyContext::new(0.0, true, &mut next_id, &mut actions);
        let algoid = ctx.start_short_algo(2.0, 1.0, 2.0, 5);
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            StrategyAction::StartAlgo {
                algoid: queued,
                direction,
                ..
            } => {
                assert_eq!(*queued, algoid);
                assert_eq!(*direction, Direction::Short);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }
}

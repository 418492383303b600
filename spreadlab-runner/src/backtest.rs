//! Deterministic single-threaded backtest replay for spread strategies.
//!
//! Replays bar or tick history through a strategy, crosses the strategy's
//! algos against the market, and accumulates trades into daily PnL buckets.
//! Algos here are simplified relative to the live engine: fills are
//! all-or-nothing at the cross price, and leg hedging is assumed perfect,
//! so a backtest algo is just a direction, a limit, and a volume.

use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use spreadlab_core::algo::AlgoStatus;
use spreadlab_core::domain::{AlgoId, Direction, Offset, OrderId, SpreadBar, TradeData, TradeId};
use spreadlab_core::filter::OutlierFilter;
use spreadlab_core::spread::TradingType;

use crate::daily::DailyResult;
use crate::data::SpreadTick;
use crate::statistics::BacktestStatistics;
use crate::strategy::{SpreadStrategy, StrategyAction, StrategyContext, StrategyError};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("no historical data in the configured range")]
    NoData,
    #[error("backtest start {start} is not before end {end}")]
    BadRange { start: NaiveDate, end: NaiveDate },
    #[error(transparent)]
    Strategy(#[from] StrategyError),
}

/// Bar or tick replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacktestMode {
    Bar,
    Tick,
}

/// Engine parameters for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestParams {
    pub mode: BacktestMode,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Commission rate applied to turnover.
    pub rate: f64,
    /// Slippage per lot per contract size unit.
    pub slippage: f64,
    /// Contract size multiplier.
    pub size: f64,
    pub pricetick: f64,
    pub capital: f64,
    /// Calendar days of warm-up replay before trading starts.
    pub init_days: u32,
    pub outlier_window: usize,
    pub outlier_k: f64,
}

/// A working algo inside the backtester.
///
/// `price` is the spread-price limit; for rate-traded spreads the same
/// request value is carried as `spread_rate` and crossing compares rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestAlgo {
    pub algoid: AlgoId,
    pub direction: Direction,
    pub price: f64,
    pub spread_rate: Option<f64>,
    pub volume: f64,
    pub traded: f64,
    pub payup: f64,
    pub interval: u32,
    pub status: AlgoStatus,
}

/// Bar/tick replay engine for one spread.
#[derive(Debug)]
pub struct BacktestEngine {
    spread_name: String,
    trading_type: TradingType,
    params: BacktestParams,

    bars: Vec<SpreadBar>,
    ticks: Vec<SpreadTick>,

    algos: HashMap<AlgoId, BacktestAlgo>,
    algo_count: u64,
    trades: Vec<TradeData>,
    trade_count: u64,
    spread_pos: f64,

    rate_filter: OutlierFilter,
    daily_results: BTreeMap<NaiveDate, DailyResult>,
    datetime: Option<NaiveDateTime>,
    trading: bool,
}

impl BacktestEngine {
    pub fn new(
        spread_name: &str,
        trading_type: TradingType,
        params: BacktestParams,
    ) -> Result<Self, RunError> {
        if params.start >= params.end {
            return Err(RunError::BadRange {
                start: params.start,
                end: params.end,
            });
        }
        let rate_filter = OutlierFilter::new(params.outlier_window, params.outlier_k);
        Ok(BacktestEngine {
            spread_name: spread_name.to_string(),
            trading_type,
            params,
            bars: Vec::new(),
            ticks: Vec::new(),
            algos: HashMap::new(),
            algo_count: 0,
            trades: Vec::new(),
            trade_count: 0,
            spread_pos: 0.0,
            rate_filter,
            daily_results: BTreeMap::new(),
            datetime: None,
            trading: false,
        })
    }

    /// Loads bar history, keeping only the configured date range.
    pub fn load_bars(&mut self, bars: Vec<SpreadBar>) {
        let (start, end) = (self.params.start, self.params.end);
        self.bars = bars
            .into_iter()
            .filter(|bar| {
                let date = bar.date();
                date >= start && date <= end
            })
            .collect();
        info!(spread = %self.spread_name, bars = self.bars.len(), "bar data loaded");
    }

    /// Loads tick history, keeping only the configured date range.
    pub fn load_ticks(&mut self, ticks: Vec<SpreadTick>) {
        let (start, end) = (self.params.start, self.params.end);
        self.ticks = ticks
            .into_iter()
            .filter(|tick| {
                let date = tick.date();
                date >= start && date <= end
            })
            .collect();
        info!(spread = %self.spread_name, ticks = self.ticks.len(), "tick data loaded");
    }

    pub fn trades(&self) -> &[TradeData] {
        &self.trades
    }

    pub fn spread_pos(&self) -> f64 {
        self.spread_pos
    }

    pub fn active_algos(&self) -> impl Iterator<Item = &BacktestAlgo> {
        self.algos.values()
    }

    /// Resets result state so the engine can replay again (parameter
    /// sweeps reuse loaded data).
    pub fn clear_data(&mut self) {
        self.algos.clear();
        self.algo_count = 0;
        self.trades.clear();
        self.trade_count = 0;
        self.spread_pos = 0.0;
        self.rate_filter.clear();
        self.daily_results.clear();
        self.datetime = None;
        self.trading = false;
    }

    /// Replays the loaded history through the strategy.
    ///
    /// The first `init_days` distinct calendar dates are warm-up: data
    /// reaches the strategy (and the rate window), but algo requests are
    /// dropped. Trading starts on the first date after warm-up.
    pub fn run_backtesting(&mut self, strategy: &mut dyn SpreadStrategy) -> Result<(), RunError> {
        let empty = match self.params.mode {
            BacktestMode::Bar => self.bars.is_empty(),
            BacktestMode::Tick => self.ticks.is_empty(),
        };
        if empty {
            return Err(RunError::NoData);
        }

        self.call_strategy(strategy, |s, ctx| s.on_init(ctx));

        let mut day_count: u32 = 0;
        let mut last_date: Option<NaiveDate> = None;

        match self.params.mode {
            BacktestMode::Bar => {
                let bars = self.bars.clone();
                for bar in &bars {
                    self.advance_clock(strategy, bar.date(), &mut day_count, &mut last_date);
                    self.new_bar(strategy, bar);
                }
            }
            BacktestMode::Tick => {
                let ticks = self.ticks.clone();
                for tick in &ticks {
                    self.advance_clock(strategy, tick.date(), &mut day_count, &mut last_date);
                    self.new_tick(strategy, tick);
                }
            }
        }

        self.call_strategy(strategy, |s, ctx| s.on_stop(ctx));
        info!(
            spread = %self.spread_name,
            trades = self.trades.len(),
            end_pos = self.spread_pos,
            "replay finished"
        );
        Ok(())
    }

    /// Runs the whole chain: replay, daily PnL, statistics.
    pub fn run(
        &mut self,
        strategy: &mut dyn SpreadStrategy,
    ) -> Result<BacktestStatistics, RunError> {
        self.run_backtesting(strategy)?;
        let daily = self.calculate_result();
        Ok(self.calculate_statistics(&daily))
    }

    fn advance_clock(
        &mut self,
        strategy: &mut dyn SpreadStrategy,
        date: NaiveDate,
        day_count: &mut u32,
        last_date: &mut Option<NaiveDate>,
    ) {
        if self.trading || *last_date == Some(date) {
            return;
        }
        *last_date = Some(date);
        *day_count += 1;
        if *day_count > self.params.init_days {
            self.trading = true;
            debug!(spread = %self.spread_name, %date, "warm-up finished, trading live");
            self.call_strategy(strategy, |s, ctx| s.on_start(ctx));
        }
    }

    fn new_bar(&mut self, strategy: &mut dyn SpreadStrategy, bar: &SpreadBar) {
        self.datetime = Some(bar.datetime);
        if self.trading_type == TradingType::Rate {
            self.rate_filter.push(bar.spread_rate);
        }

        self.cross_algos(strategy, bar.close, bar.close, bar.spread_rate, bar.spread_rate);
        self.call_strategy(strategy, |s, ctx| s.on_spread_bar(ctx, bar));
        self.update_daily_close(bar.date(), bar.close);
    }

    fn new_tick(&mut self, strategy: &mut dyn SpreadStrategy, tick: &SpreadTick) {
        self.datetime = Some(tick.datetime);
        if self.trading_type == TradingType::Rate {
            self.rate_filter.push(tick.mid_rate());
        }

        self.cross_algos(
            strategy,
            tick.ask_price,
            tick.bid_price,
            tick.ask_spread_rate,
            tick.bid_spread_rate,
        );
        self.call_strategy(strategy, |s, ctx| s.on_spread_tick(ctx, tick));
        let close = (tick.bid_price + tick.ask_price) / 2.0;
        self.update_daily_close(tick.date(), close);
    }

    /// Crosses every working algo against the current market.
    ///
    /// Price mode: Long fills at `long_cross_price` when its limit is at or
    /// above it; Short symmetrically at `short_cross_price`. Rate mode: no
    /// price threshold — the cross rate must lie strictly inside the
    /// outlier band (no band yet means no fills) and satisfy the rate
    /// comparison. Fills are all-or-nothing at the cross price.
    fn cross_algos(
        &mut self,
        strategy: &mut dyn SpreadStrategy,
        long_cross_price: f64,
        short_cross_price: f64,
        long_cross_rate: f64,
        short_cross_rate: f64,
    ) {
        if self.algos.is_empty() {
            return;
        }
        let band = match self.trading_type {
            TradingType::Rate => self.rate_filter.band(),
            TradingType::Price => None,
        };

        let mut filled: Vec<AlgoId> = Vec::new();
        for algo in self.algos.values() {
            let (cross_price, cross_rate) = match algo.direction {
                Direction::Long => (long_cross_price, long_cross_rate),
                Direction::Short => (short_cross_price, short_cross_rate),
            };

            let crossed = match self.trading_type {
                TradingType::Price => match algo.direction {
                    Direction::Long => cross_price > 0.0 && algo.price >= cross_price,
                    Direction::Short => cross_price > 0.0 && algo.price <= cross_price,
                },
                TradingType::Rate => {
                    let limit_rate = algo.spread_rate.unwrap_or(algo.price);
                    let in_band = band.map_or(false, |band| band.contains(cross_rate));
                    in_band
                        && match algo.direction {
                            Direction::Long => limit_rate >= cross_rate,
                            Direction::Short => limit_rate <= cross_rate,
                        }
                }
            };
            if crossed {
                filled.push(algo.algoid);
            }
        }

        for algoid in filled {
            let Some(mut algo) = self.algos.remove(&algoid) else {
                continue;
            };
            let (cross_price, cross_rate) = match algo.direction {
                Direction::Long => (long_cross_price, long_cross_rate),
                Direction::Short => (short_cross_price, short_cross_rate),
            };

            algo.traded = algo.direction.sign() * algo.volume;
            algo.status = AlgoStatus::AllTraded;
            self.spread_pos += algo.traded;

            self.trade_count += 1;
            let trade = TradeData {
                id: TradeId(self.trade_count),
                order_id: OrderId(self.trade_count),
                symbol: self.spread_name.clone(),
                direction: algo.direction,
                offset: Offset::Open,
                price: cross_price,
                volume: algo.volume,
                value: cross_price * algo.volume,
                spread_rate: cross_rate,
                datetime: self.datetime.unwrap_or_default(),
            };
            debug!(
                algoid = %algo.algoid,
                price = trade.price,
                volume = trade.volume,
                "algo crossed"
            );
            self.trades.push(trade);

            self.call_strategy(strategy, |s, ctx| s.on_spread_algo(ctx, &algo));
            let pos = self.spread_pos;
            self.call_strategy(strategy, |s, ctx| s.on_spread_pos(ctx, pos));
        }
    }

    fn update_daily_close(&mut self, date: NaiveDate, close: f64) {
        self.daily_results
            .entry(date)
            .and_modify(|day| day.close_price = close)
            .or_insert_with(|| DailyResult::new(date, close));
    }

    fn call_strategy<F>(&mut self, strategy: &mut dyn SpreadStrategy, f: F)
    where
        F: FnOnce(&mut dyn SpreadStrategy, &mut StrategyContext),
    {
        let mut actions = Vec::new();
        let mut ctx = StrategyContext::new(
            self.spread_pos,
            self.trading,
            &mut self.algo_count,
            &mut actions,
        );
        f(strategy, &mut ctx);
        self.apply_actions(strategy, actions);
    }

    fn apply_actions(&mut self, strategy: &mut dyn SpreadStrategy, mut actions: Vec<StrategyAction>) {
        while !actions.is_empty() {
            for action in std::mem::take(&mut actions) {
                match action {
                    StrategyAction::StartAlgo {
                        algoid,
                        direction,
                        price,
                        volume,
                        payup,
                        interval,
                    } => {
                        let spread_rate = match self.trading_type {
                            TradingType::Rate => Some(price),
                            TradingType::Price => None,
                        };
                        self.algos.insert(
                            algoid,
                            BacktestAlgo {
                                algoid,
                                direction,
                                price,
                                spread_rate,
                                volume,
                                traded: 0.0,
                                payup,
                                interval,
                                status: AlgoStatus::NotTraded,
                            },
                        );
                    }
                    StrategyAction::StopAlgo(algoid) => {
                        let Some(mut algo) = self.algos.remove(&algoid) else {
                            debug!(%algoid, "stop for unknown algo ignored");
                            continue;
                        };
                        algo.status = AlgoStatus::Cancelled;
                        let mut ctx = StrategyContext::new(
                            self.spread_pos,
                            self.trading,
                            &mut self.algo_count,
                            &mut actions,
                        );
                        strategy.on_spread_algo(&mut ctx, &algo);
                    }
                }
            }
        }
    }

    /// Folds the trade stream into the daily chain and marks each day.
    /// Safe to call repeatedly.
    pub fn calculate_result(&mut self) -> Vec<DailyResult> {
        for day in self.daily_results.values_mut() {
            day.trades.clear();
        }
        for trade in &self.trades {
            if let Some(day) = self.daily_results.get_mut(&trade.datetime.date()) {
                day.add_trade(trade.clone());
            }
        }

        let (size, rate, slippage) = (self.params.size, self.params.rate, self.params.slippage);
        let mut pre_close = 0.0;
        let mut start_pos = 0.0;
        for day in self.daily_results.values_mut() {
            day.calculate_pnl(pre_close, start_pos, size, rate, slippage);
            pre_close = day.close_price;
            start_pos = day.end_pos;
        }

        self.daily_results.values().cloned().collect()
    }

    pub fn calculate_statistics(&self, daily: &[DailyResult]) -> BacktestStatistics {
        BacktestStatistics::from_daily(daily, self.params.capital)
    }
}

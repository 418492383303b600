//! Event-driven host for spread execution algos.
//!
//! The engine owns one spread, a set of live algos, and the routing tables
//! mapping gateway events back to algos. Callers feed it market data and
//! execution reports (`process_*`), and drain the [`EngineEvent`] queue for
//! state changes. Order flow goes out through an [`OrderGateway`]
//! implementation, which is a live connection in production and a matching
//! simulator in the backtester.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::algo::{
    AlgoContext, AlgoCore, AlgoSnapshot, MakerAlgo, SpreadAlgo, TakerAlgo,
};
use crate::domain::{
    AlgoId, ContractData, Direction, Offset, OrderData, OrderId, OrderRequest, TickData, TradeData,
};
use crate::filter::OutlierFilter;
use crate::spread::{SpreadData, SpreadSnapshot, TradingType};

/// Order routing seam between the engine and the outside world.
///
/// `send_order` returns `None` when the order is refused at submission.
pub trait OrderGateway: Send {
    fn send_order(&mut self, req: &OrderRequest) -> Option<OrderId>;
    fn cancel_order(&mut self, order_id: OrderId);
}

/// Which execution style a new algo uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgoStyle {
    Taker,
    Maker,
}

/// State changes observable from outside the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    SpreadDataUpdated(SpreadSnapshot),
    SpreadPosUpdated { name: String, net_pos: f64 },
    AlgoUpdated(AlgoSnapshot),
}

/// Per-dispatch view handed to algos: market lookups plus order routing,
/// recording the ids it hands out so the engine can map them to the algo.
struct EngineContext<'a, G: OrderGateway> {
    gateway: &'a mut G,
    ticks: &'a HashMap<String, TickData>,
    contracts: &'a HashMap<String, ContractData>,
    sent: Vec<OrderId>,
}

impl<G: OrderGateway> AlgoContext for EngineContext<'_, G> {
    fn send_order(&mut self, req: OrderRequest) -> Option<OrderId> {
        let order_id = self.gateway.send_order(&req)?;
        self.sent.push(order_id);
        Some(order_id)
    }

    fn cancel_order(&mut self, order_id: OrderId) {
        self.gateway.cancel_order(order_id);
    }

    fn get_tick(&self, symbol: &str) -> Option<&TickData> {
        self.ticks.get(symbol)
    }

    fn get_pricetick(&self, symbol: &str) -> Option<f64> {
        self.contracts.get(symbol).map(|c| c.pricetick)
    }
}

/// Execution engine for one spread.
pub struct AlgoEngine<G: OrderGateway> {
    spread: SpreadData,
    gateway: G,
    ticks: HashMap<String, TickData>,
    contracts: HashMap<String, ContractData>,
    algos: HashMap<AlgoId, Box<dyn SpreadAlgo>>,
    order_algo_map: HashMap<OrderId, AlgoId>,
    algo_count: u64,
    rate_filter: OutlierFilter,
    events: VecDeque<EngineEvent>,
}

impl<G: OrderGateway> AlgoEngine<G> {
    pub fn new(spread: SpreadData, gateway: G) -> Self {
        AlgoEngine {
            spread,
            gateway,
            ticks: HashMap::new(),
            contracts: HashMap::new(),
            algos: HashMap::new(),
            order_algo_map: HashMap::new(),
            algo_count: 0,
            rate_filter: OutlierFilter::default(),
            events: VecDeque::new(),
        }
    }

    /// Replaces the default rate filter (window 17, k 3.0).
    pub fn with_rate_filter(mut self, filter: OutlierFilter) -> Self {
        self.rate_filter = filter;
        self
    }

    /// Registers contract metadata for a leg; legs without it cannot be
    /// priced and their orders are skipped.
    pub fn add_contract(&mut self, contract: ContractData) {
        self.contracts.insert(contract.symbol.clone(), contract);
    }

    pub fn spread(&self) -> &SpreadData {
        &self.spread
    }

    pub fn active_algo_count(&self) -> usize {
        self.algos.len()
    }

    pub fn algo_snapshot(&self, algoid: AlgoId) -> Option<AlgoSnapshot> {
        self.algos
            .get(&algoid)
            .map(|algo| algo.core().snapshot(algo.algo_name()))
    }

    pub fn poll_event(&mut self) -> Option<EngineEvent> {
        self.events.pop_front()
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.events.drain(..).collect()
    }

    /// Launches a new algo and returns its id.
    #[allow(clippy::too_many_arguments)]
    pub fn start_algo(
        &mut self,
        style: AlgoStyle,
        direction: Direction,
        offset: Offset,
        price: f64,
        spread_rate: Option<f64>,
        volume: f64,
        payup: f64,
        interval: u32,
    ) -> AlgoId {
        self.algo_count += 1;
        let algoid = AlgoId(self.algo_count);
        let core = AlgoCore::new(
            algoid,
            direction,
            offset,
            price,
            spread_rate,
            volume,
            payup,
            interval,
        );
        let algo: Box<dyn SpreadAlgo> = match style {
            AlgoStyle::Taker => Box::new(TakerAlgo::new(core)),
            AlgoStyle::Maker => Box::new(MakerAlgo::new(core)),
        };

        info!(
            algoid = %algoid,
            spread = %self.spread.name,
            style = ?style,
            direction = ?direction,
            price,
            volume,
            "algo started"
        );
        self.events
            .push_back(EngineEvent::AlgoUpdated(algo.core().snapshot(algo.algo_name())));
        self.algos.insert(algoid, algo);
        algoid
    }

    pub fn start_long_algo(
        &mut self,
        style: AlgoStyle,
        price: f64,
        volume: f64,
        payup: f64,
        interval: u32,
    ) -> AlgoId {
        let spread_rate = self.rate_limit_for(price);
        self.start_algo(
            style,
            Direction::Long,
            Offset::Open,
            price,
            spread_rate,
            volume,
            payup,
            interval,
        )
    }

    pub fn start_short_algo(
        &mut self,
        style: AlgoStyle,
        price: f64,
        volume: f64,
        payup: f64,
        interval: u32,
    ) -> AlgoId {
        let spread_rate = self.rate_limit_for(price);
        self.start_algo(
            style,
            Direction::Short,
            Offset::Open,
            price,
            spread_rate,
            volume,
            payup,
            interval,
        )
    }

    // For rate-traded spreads the caller's limit is already a rate.
    fn rate_limit_for(&self, price: f64) -> Option<f64> {
        match self.spread.trading_type {
            TradingType::Rate => Some(price),
            TradingType::Price => None,
        }
    }

    /// Cancels the algo's live orders and marks it terminal. It stays
    /// resident until its hedge completes. Returns false for unknown ids.
    pub fn stop_algo(&mut self, algoid: AlgoId) -> bool {
        let Self {
            gateway,
            ticks,
            contracts,
            algos,
            events,
            ..
        } = self;
        let Some(algo) = algos.get_mut(&algoid) else {
            warn!(algoid = %algoid, "stop for unknown algo");
            return false;
        };

        let mut ctx = EngineContext {
            gateway,
            ticks,
            contracts,
            sent: Vec::new(),
        };
        algo.core_mut().stop(&mut ctx);
        events.push_back(EngineEvent::AlgoUpdated(
            algo.core().snapshot(algo.algo_name()),
        ));
        self.reap_finished();
        true
    }

    /// Applies a market tick: updates the spread, feeds the rate filter,
    /// and gives every algo a look at the new quote.
    pub fn process_tick(&mut self, tick: &TickData) {
        self.ticks.insert(tick.symbol.clone(), tick.clone());

        if self.spread.leg(&tick.symbol).is_some() {
            // Unknown legs were just excluded, so this cannot fail.
            if let Err(err) = self.spread.update_leg_tick(tick) {
                warn!(symbol = %tick.symbol, %err, "leg tick rejected");
                return;
            }
            self.events
                .push_back(EngineEvent::SpreadDataUpdated(self.spread.snapshot()));

            if self.spread.trading_type == TradingType::Rate && self.spread.is_inited() {
                let mid_rate =
                    (self.spread.bid_spread_rate + self.spread.ask_spread_rate) / 2.0;
                self.rate_filter.push(mid_rate);
            }
        }

        let band = match self.spread.trading_type {
            TradingType::Rate => self.rate_filter.band(),
            TradingType::Price => None,
        };

        let Self {
            gateway,
            ticks,
            contracts,
            spread,
            algos,
            order_algo_map,
            ..
        } = self;
        let mut ctx = EngineContext {
            gateway,
            ticks,
            contracts,
            sent: Vec::new(),
        };
        for (algoid, algo) in algos.iter_mut() {
            algo.on_tick(&mut ctx, spread, band);
            for order_id in ctx.sent.drain(..) {
                order_algo_map.insert(order_id, *algoid);
            }
        }

        self.reap_finished();
    }

    /// Applies an execution report to the owning algo.
    pub fn process_order(&mut self, order: &OrderData) {
        let Some(&algoid) = self.order_algo_map.get(&order.id) else {
            debug!(order_id = %order.id, "order update without owner ignored");
            return;
        };

        let Self {
            gateway,
            ticks,
            contracts,
            spread,
            algos,
            order_algo_map,
            events,
            ..
        } = self;
        let Some(algo) = algos.get_mut(&algoid) else {
            debug!(order_id = %order.id, algoid = %algoid, "order update for removed algo");
            return;
        };

        algo.core_mut().record_order(order);
        let mut ctx = EngineContext {
            gateway,
            ticks,
            contracts,
            sent: Vec::new(),
        };
        algo.on_order(&mut ctx, spread, order);
        for order_id in ctx.sent.drain(..) {
            order_algo_map.insert(order_id, algoid);
        }
        events.push_back(EngineEvent::AlgoUpdated(
            algo.core().snapshot(algo.algo_name()),
        ));

        self.reap_finished();
    }

    /// Applies a fill: books it on the spread position and on the owning
    /// algo, which may respond by hedging.
    pub fn process_trade(&mut self, trade: &TradeData) {
        let Some(&algoid) = self.order_algo_map.get(&trade.order_id) else {
            debug!(
                order_id = %trade.order_id,
                symbol = %trade.symbol,
                volume = trade.volume,
                "fill without owner ignored"
            );
            return;
        };

        if self.spread.leg(&trade.symbol).is_some() {
            if let Err(err) = self
                .spread
                .update_leg_trade(&trade.symbol, trade.signed_volume())
            {
                warn!(symbol = %trade.symbol, %err, "leg fill rejected");
                return;
            }
            self.events.push_back(EngineEvent::SpreadPosUpdated {
                name: self.spread.name.clone(),
                net_pos: self.spread.net_pos,
            });
        }

        let Self {
            gateway,
            ticks,
            contracts,
            spread,
            algos,
            order_algo_map,
            events,
            ..
        } = self;
        let Some(algo) = algos.get_mut(&algoid) else {
            debug!(algoid = %algoid, "fill for removed algo dropped");
            return;
        };

        algo.core_mut().record_trade(trade, spread);
        let mut ctx = EngineContext {
            gateway,
            ticks,
            contracts,
            sent: Vec::new(),
        };
        algo.on_trade(&mut ctx, spread, trade);
        for order_id in ctx.sent.drain(..) {
            order_algo_map.insert(order_id, algoid);
        }
        events.push_back(EngineEvent::AlgoUpdated(
            algo.core().snapshot(algo.algo_name()),
        ));

        self.reap_finished();
    }

    /// Advances every algo's interval timer by one tick.
    pub fn process_timer(&mut self) {
        let Self {
            gateway,
            ticks,
            contracts,
            spread,
            algos,
            order_algo_map,
            ..
        } = self;
        let mut ctx = EngineContext {
            gateway,
            ticks,
            contracts,
            sent: Vec::new(),
        };
        for (algoid, algo) in algos.iter_mut() {
            let core = algo.core_mut();
            core.timer_count += 1;
            if core.timer_count < core.interval {
                continue;
            }
            core.timer_count = 0;
            algo.on_interval(&mut ctx, spread);
            for order_id in ctx.sent.drain(..) {
                order_algo_map.insert(order_id, *algoid);
            }
        }

        self.reap_finished();
    }

    /// Removes algos that are terminal, flat on orders, and fully hedged.
    fn reap_finished(&mut self) {
        let spread = &self.spread;
        let finished: Vec<AlgoId> = self
            .algos
            .iter()
            .filter(|(_, algo)| {
                let core = algo.core();
                !core.status.is_active()
                    && core.is_order_finished()
                    && core.is_hedge_finished(spread)
            })
            .map(|(algoid, _)| *algoid)
            .collect();

        for algoid in finished {
            if let Some(algo) = self.algos.remove(&algoid) {
                self.order_algo_map.retain(|_, owner| *owner != algoid);
                info!(
                    algoid = %algoid,
                    status = ?algo.core().status,
                    traded = algo.core().traded,
                    "algo finished"
                );
                self.events.push_back(EngineEvent::AlgoUpdated(
                    algo.core().snapshot(algo.algo_name()),
                ));
            }
        }
    }
}

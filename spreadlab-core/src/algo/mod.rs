//! Spread execution algorithms.
//!
//! An algo owns one working order on the spread: a signed target in spread
//! lots, a limit price (or rate), and the bookkeeping that maps leg fills
//! back to spread lots. Two strategies are provided: [`TakerAlgo`] crosses
//! the book when the spread quote reaches its limit, [`MakerAlgo`] rests a
//! derived quote on the active leg. Both hedge passive legs mechanically
//! after every active-leg fill.

pub mod maker;
pub mod taker;

pub use maker::MakerAlgo;
pub use taker::TakerAlgo;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{
    AlgoId, Direction, Offset, OrderData, OrderId, OrderRequest, TickData, TradeData,
};
use crate::filter::Band;
use crate::spread::{round_to, SpreadData};

/// Tolerance for comparing fill quantities.
const VOLUME_EPS: f64 = 1e-9;

/// Algo lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlgoStatus {
    NotTraded,
    PartTraded,
    AllTraded,
    Cancelled,
}

impl AlgoStatus {
    pub fn is_active(self) -> bool {
        matches!(self, AlgoStatus::NotTraded | AlgoStatus::PartTraded)
    }
}

/// Services an algo needs from its host: order routing and market lookups.
///
/// `send_order` returns `None` when the order cannot be placed (unknown
/// contract, gateway down); the algo simply carries no live order for that
/// leg and retries on the next opportunity.
pub trait AlgoContext {
    fn send_order(&mut self, req: OrderRequest) -> Option<OrderId>;
    fn cancel_order(&mut self, order_id: OrderId);
    fn get_tick(&self, symbol: &str) -> Option<&TickData>;
    fn get_pricetick(&self, symbol: &str) -> Option<f64>;
}

/// Read-only view of an algo, emitted on every state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgoSnapshot {
    pub algoid: AlgoId,
    pub algo_name: String,
    pub direction: Direction,
    pub offset: Offset,
    pub price: f64,
    pub volume: f64,
    pub traded: f64,
    pub status: AlgoStatus,
    pub spread_rate: Option<f64>,
}

/// State shared by every algo flavor: target, fills per leg, live orders.
#[derive(Debug)]
pub struct AlgoCore {
    pub algoid: AlgoId,
    pub direction: Direction,
    pub offset: Offset,
    /// Limit in spread price terms.
    pub price: f64,
    /// Limit in spread rate terms, set only for rate-traded spreads.
    pub spread_rate: Option<f64>,
    /// Unsigned target in spread lots.
    pub volume: f64,
    /// Price padding in price ticks applied to aggressive leg orders.
    pub payup: f64,
    /// Timer ticks between interval callbacks.
    pub interval: u32,
    pub status: AlgoStatus,
    /// Signed spread lots filled so far, derived from the active leg.
    pub traded: f64,
    leg_traded: HashMap<String, f64>,
    live_orders: HashMap<OrderId, String>,
    pub(crate) timer_count: u32,
}

impl AlgoCore {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        algoid: AlgoId,
        direction: Direction,
        offset: Offset,
        price: f64,
        spread_rate: Option<f64>,
        volume: f64,
        payup: f64,
        interval: u32,
    ) -> Self {
        AlgoCore {
            algoid,
            direction,
            offset,
            price,
            spread_rate,
            volume,
            payup,
            interval,
            status: AlgoStatus::NotTraded,
            traded: 0.0,
            leg_traded: HashMap::new(),
            live_orders: HashMap::new(),
            timer_count: 0,
        }
    }

    /// Signed target in spread lots.
    pub fn target(&self) -> f64 {
        self.direction.sign() * self.volume
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// True when no leg order is live.
    pub fn is_order_finished(&self) -> bool {
        self.live_orders.is_empty()
    }

    pub fn live_order_ids(&self) -> impl Iterator<Item = OrderId> + '_ {
        self.live_orders.keys().copied()
    }

    pub fn leg_traded(&self, symbol: &str) -> f64 {
        self.leg_traded.get(symbol).copied().unwrap_or(0.0)
    }

    /// Drops the order from the live set once it reaches a terminal state.
    pub fn record_order(&mut self, order: &OrderData) {
        if !order.is_active() {
            self.live_orders.remove(&order.id);
        }
    }

    /// Books a leg fill and re-derives spread progress from the active leg.
    ///
    /// Fills are booked even after the algo went terminal: a stopped algo
    /// keeps hedging the position it already put on, and the fills closing
    /// that hedge must land here. A cancelled algo never leaves `Cancelled`.
    pub fn record_trade(&mut self, trade: &TradeData, spread: &SpreadData) {
        *self.leg_traded.entry(trade.symbol.clone()).or_insert(0.0) += trade.signed_volume();

        let active_traded = round_to(self.leg_traded(spread.active_symbol()), spread.min_volume);
        self.traded = spread.calculate_spread_volume(spread.active_symbol(), active_traded);

        if self.status != AlgoStatus::Cancelled {
            self.status = if self.traded.abs() >= self.volume - VOLUME_EPS {
                AlgoStatus::AllTraded
            } else if self.traded.abs() > VOLUME_EPS {
                AlgoStatus::PartTraded
            } else {
                AlgoStatus::NotTraded
            };
        }
    }

    /// True when every passive leg is hedged to the spread lots realized on
    /// the active leg.
    pub fn is_hedge_finished(&self, spread: &SpreadData) -> bool {
        let active_traded = round_to(self.leg_traded(spread.active_symbol()), spread.min_volume);
        let hedged_spread = spread.calculate_spread_volume(spread.active_symbol(), active_traded);

        for leg in spread.passive_legs() {
            let target = spread.calculate_leg_volume(&leg.symbol, hedged_spread);
            if (target - self.leg_traded(&leg.symbol)).abs() > VOLUME_EPS {
                return false;
            }
        }
        true
    }

    /// Sends passive-leg orders closing the gap to the hedged position.
    /// Returns false when any leg could not be priced (missing tick or
    /// contract), so callers can retry on the next tick.
    pub fn hedge_passive_legs(&mut self, ctx: &mut dyn AlgoContext, spread: &SpreadData) -> bool {
        let active_traded = round_to(self.leg_traded(spread.active_symbol()), spread.min_volume);
        let hedged_spread = spread.calculate_spread_volume(spread.active_symbol(), active_traded);

        let mut orders: Vec<(String, f64)> = Vec::new();
        for leg in spread.passive_legs() {
            let target = spread.calculate_leg_volume(&leg.symbol, hedged_spread);
            let gap = target - self.leg_traded(&leg.symbol);
            if gap.abs() > VOLUME_EPS {
                orders.push((leg.symbol.clone(), gap));
            }
        }

        let mut all_sent = true;
        for (symbol, gap) in orders {
            if !self.send_leg_order(ctx, &symbol, gap, None) {
                all_sent = false;
            }
        }
        all_sent
    }

    /// Sends one signed leg order. Without an explicit price the order is
    /// priced aggressively: ask + payup ticks to buy, bid - payup ticks to
    /// sell. Returns false when the leg could not be priced or routed.
    pub fn send_leg_order(
        &mut self,
        ctx: &mut dyn AlgoContext,
        symbol: &str,
        signed_volume: f64,
        price: Option<f64>,
    ) -> bool {
        if signed_volume.abs() < VOLUME_EPS {
            return true;
        }

        let quote = match ctx.get_tick(symbol) {
            Some(tick) => (tick.bid_price, tick.ask_price),
            None => {
                debug!(algoid = %self.algoid, symbol, "no tick for leg, order skipped");
                return false;
            }
        };
        let pricetick = match ctx.get_pricetick(symbol) {
            Some(tick) => tick,
            None => {
                warn!(algoid = %self.algoid, symbol, "no contract for leg, order skipped");
                return false;
            }
        };

        let (direction, limit) = if signed_volume > 0.0 {
            (
                Direction::Long,
                price.unwrap_or(quote.1 + pricetick * self.payup),
            )
        } else {
            (
                Direction::Short,
                price.unwrap_or(quote.0 - pricetick * self.payup),
            )
        };

        let req = OrderRequest {
            symbol: symbol.to_string(),
            direction,
            offset: self.offset,
            price: limit,
            volume: signed_volume.abs(),
        };
        match ctx.send_order(req) {
            Some(order_id) => {
                self.live_orders.insert(order_id, symbol.to_string());
                true
            }
            None => false,
        }
    }

    /// Cancels every live leg order. Orders leave the live set when the
    /// terminal order update comes back, not here.
    pub fn cancel_all(&mut self, ctx: &mut dyn AlgoContext) {
        for order_id in self.live_orders.keys().copied().collect::<Vec<_>>() {
            ctx.cancel_order(order_id);
        }
    }

    /// User-requested stop: cancel live orders and go terminal.
    pub fn stop(&mut self, ctx: &mut dyn AlgoContext) {
        self.cancel_all(ctx);
        if self.is_active() {
            self.status = AlgoStatus::Cancelled;
        }
    }

    pub fn snapshot(&self, algo_name: &str) -> AlgoSnapshot {
        AlgoSnapshot {
            algoid: self.algoid,
            algo_name: algo_name.to_string(),
            direction: self.direction,
            offset: self.offset,
            price: self.price,
            volume: self.volume,
            traded: self.traded,
            status: self.status,
            spread_rate: self.spread_rate,
        }
    }
}

/// A spread execution algorithm driven by host callbacks.
pub trait SpreadAlgo: Send {
    fn algo_name(&self) -> &'static str;
    fn core(&self) -> &AlgoCore;
    fn core_mut(&mut self) -> &mut AlgoCore;

    /// New derived spread quote. `band` is the current rate acceptance band
    /// for rate-traded spreads, `None` while the filter warms up.
    fn on_tick(
        &mut self,
        ctx: &mut dyn AlgoContext,
        spread: &SpreadData,
        band: Option<Band>,
    );

    /// A leg order of this algo changed state.
    fn on_order(&mut self, ctx: &mut dyn AlgoContext, spread: &SpreadData, order: &OrderData);

    /// A leg order of this algo filled (already booked into the core).
    fn on_trade(&mut self, ctx: &mut dyn AlgoContext, spread: &SpreadData, trade: &TradeData);

    /// Periodic callback, fired every `interval` timer ticks.
    fn on_interval(&mut self, ctx: &mut dyn AlgoContext, spread: &SpreadData);
}

#[cfg(test)]
pub(crate) mod testkit {
    //! In-memory context double shared by the taker and maker tests.

    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct StubContext {
        pub ticks: HashMap<String, TickData>,
        pub priceticks: HashMap<String, f64>,
        pub sent: Vec<OrderRequest>,
        pub cancelled: Vec<OrderId>,
        next_order_id: u64,
    }

    impl StubContext {
        pub fn set_quote(&mut self, symbol: &str, bid: f64, ask: f64) {
            self.ticks.insert(
                symbol.to_string(),
                TickData {
                    symbol: symbol.to_string(),
                    datetime: NaiveDate::from_ymd_opt(2024, 1, 2)
                        .unwrap()
                        .and_hms_opt(9, 30, 0)
                        .unwrap(),
                    last_price: (bid + ask) / 2.0,
                    bid_price: bid,
                    bid_volume: 100.0,
                    ask_price: ask,
                    ask_volume: 100.0,
                },
            );
        }
    }

    impl AlgoContext for StubContext {
        fn send_order(&mut self, req: OrderRequest) -> Option<OrderId> {
            self.next_order_id += 1;
            self.sent.push(req);
            Some(OrderId(self.next_order_id))
        }

        fn cancel_order(&mut self, order_id: OrderId) {
            self.cancelled.push(order_id);
        }

        fn get_tick(&self, symbol: &str) -> Option<&TickData> {
            self.ticks.get(symbol)
        }

        fn get_pricetick(&self, symbol: &str) -> Option<f64> {
            self.priceticks.get(symbol).copied()
        }
    }

    pub fn filled_order(req: &OrderRequest, id: OrderId) -> OrderData {
        OrderData {
            id,
            symbol: req.symbol.clone(),
            direction: req.direction,
            offset: req.offset,
            price: req.price,
            volume: req.volume,
            traded: req.volume,
            status: crate::domain::OrderStatus::AllTraded,
        }
    }

    pub fn fill_for(req: &OrderRequest, id: OrderId, trade_id: u64) -> TradeData {
        TradeData {
            id: crate::domain::TradeId(trade_id),
            order_id: id,
            symbol: req.symbol.clone(),
            direction: req.direction,
            offset: req.offset,
            price: req.price,
            volume: req.volume,
            value: req.price * req.volume,
            spread_rate: 0.0,
            datetime: NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(9, 30, 1)
                .unwrap(),
        }
    }
}

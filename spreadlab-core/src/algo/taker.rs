//! Taker execution: cross the book when the spread quote reaches the limit.

use tracing::debug;

use crate::domain::{Direction, OrderData, TradeData};
use crate::filter::Band;
use crate::spread::{SpreadData, TradingType};

use super::{AlgoContext, AlgoCore, SpreadAlgo};

/// Aggressive spread algo.
///
/// Waits until the derived spread quote crosses its limit, then lifts the
/// active leg for as much volume as the book shows, padding the leg price
/// by `payup` ticks. Passive legs are hedged after every active-leg fill.
/// Works one round at a time: no new active-leg order while any leg order
/// is live.
pub struct TakerAlgo {
    core: AlgoCore,
}

impl TakerAlgo {
    pub const NAME: &'static str = "taker";

    pub fn new(core: AlgoCore) -> Self {
        TakerAlgo { core }
    }

    /// True when the spread quote satisfies the limit on the algo's side.
    ///
    /// Rate-traded spreads additionally require the quote's rate to sit
    /// inside the acceptance band; without a band (filter still warming up)
    /// nothing is taken.
    fn limit_crossed(&self, spread: &SpreadData, band: Option<Band>) -> bool {
        match spread.trading_type {
            TradingType::Price => match self.core.direction {
                Direction::Long => {
                    spread.ask_volume > 0.0 && spread.ask_price <= self.core.price
                }
                Direction::Short => {
                    spread.bid_volume > 0.0 && spread.bid_price >= self.core.price
                }
            },
            TradingType::Rate => {
                let Some(limit_rate) = self.core.spread_rate else {
                    return false;
                };
                let (quote_rate, volume, crossed) = match self.core.direction {
                    Direction::Long => (
                        spread.ask_spread_rate,
                        spread.ask_volume,
                        spread.ask_spread_rate <= limit_rate,
                    ),
                    Direction::Short => (
                        spread.bid_spread_rate,
                        spread.bid_volume,
                        spread.bid_spread_rate >= limit_rate,
                    ),
                };
                if volume <= 0.0 || !crossed {
                    return false;
                }
                match band {
                    Some(band) => band.contains(quote_rate),
                    None => {
                        debug!(algoid = %self.core.algoid, "rate band warming up, take skipped");
                        false
                    }
                }
            }
        }
    }

    /// Lifts the active leg for the available volume, capped at the
    /// remaining target.
    fn take_active_leg(&mut self, ctx: &mut dyn AlgoContext, spread: &SpreadData) {
        let remaining = self.core.target() - self.core.traded;
        let spread_volume = match self.core.direction {
            Direction::Long => spread.ask_volume.min(remaining),
            Direction::Short => (-spread.bid_volume).max(remaining),
        };

        let active_symbol = spread.active_symbol().to_string();
        let leg_volume = spread.calculate_leg_volume(&active_symbol, spread_volume);
        self.core.send_leg_order(ctx, &active_symbol, leg_volume, None);
    }
}

impl SpreadAlgo for TakerAlgo {
    fn algo_name(&self) -> &'static str {
        Self::NAME
    }

    fn core(&self) -> &AlgoCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AlgoCore {
        &mut self.core
    }

    fn on_tick(&mut self, ctx: &mut dyn AlgoContext, spread: &SpreadData, band: Option<Band>) {
        if !spread.is_inited() {
            return;
        }
        // One round in flight at a time.
        if !self.core.is_order_finished() {
            return;
        }
        // Hedging continues even after the algo went terminal.
        if !self.core.is_hedge_finished(spread) {
            self.core.hedge_passive_legs(ctx, spread);
            return;
        }
        if !self.core.is_active() {
            return;
        }
        if self.limit_crossed(spread, band) {
            self.take_active_leg(ctx, spread);
        }
    }

    fn on_order(&mut self, _ctx: &mut dyn AlgoContext, _spread: &SpreadData, _order: &OrderData) {}

    fn on_trade(&mut self, ctx: &mut dyn AlgoContext, spread: &SpreadData, trade: &TradeData) {
        if trade.symbol == spread.active_symbol() && !self.core.is_hedge_finished(spread) {
            self.core.hedge_passive_legs(ctx, spread);
        }
    }

    fn on_interval(&mut self, ctx: &mut dyn AlgoContext, spread: &SpreadData) {
        let _ = spread;
        if self.core.is_active() && !self.core.is_order_finished() {
            self.core.cancel_all(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testkit::{fill_for, StubContext};
    use super::super::{AlgoStatus, SpreadAlgo};
    use super::*;
    use crate::domain::{AlgoId, Offset, OrderId, TickData};
    use crate::spread::LegConfig;
    use chrono::NaiveDate;

    fn spread(trading_type: TradingType) -> SpreadData {
        SpreadData::new(
            "near-far",
            &[
                LegConfig {
                    symbol: "NEAR".into(),
                    price_multiplier: 1.0,
                    trading_multiplier: 1.0,
                },
                LegConfig {
                    symbol: "FAR".into(),
                    price_multiplier: -1.0,
                    trading_multiplier: -1.0,
                },
            ],
            "NEAR",
            1.0,
            trading_type,
        )
        .unwrap()
    }

    fn tick(symbol: &str, bid: f64, ask: f64, volume: f64) -> TickData {
        TickData {
            symbol: symbol.into(),
            datetime: NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
            last_price: (bid + ask) / 2.0,
            bid_price: bid,
            bid_volume: volume,
            ask_price: ask,
            ask_volume: volume,
        }
    }

    fn long_taker(price: f64, volume: f64) -> TakerAlgo {
        TakerAlgo::new(AlgoCore::new(
            AlgoId(1),
            Direction::Long,
            Offset::Open,
            price,
            None,
            volume,
            2.0,
            5,
        ))
    }

    fn ctx_with_legs() -> StubContext {
        let mut ctx = StubContext::default();
        ctx.set_quote("NEAR", 100.0, 100.2);
        ctx.set_quote("FAR", 98.0, 98.1);
        ctx.priceticks.insert("NEAR".into(), 0.2);
        ctx.priceticks.insert("FAR".into(), 0.1);
        ctx
    }

    #[test]
    fn waits_while_limit_not_crossed() {
        let mut spread = spread(TradingType::Price);
        spread.update_leg_tick(&tick("NEAR", 100.0, 100.2, 10.0)).unwrap();
        spread.update_leg_tick(&tick("FAR", 98.0, 98.1, 10.0)).unwrap();
        // ask = 100.2 - 98.0 = 2.2 > limit 2.0
        let mut algo = long_taker(2.0, 3.0);
        let mut ctx = ctx_with_legs();

        algo.on_tick(&mut ctx, &spread, None);
        assert!(ctx.sent.is_empty());
    }

    #[test]
    fn takes_active_leg_when_limit_crossed() {
        let mut spread = spread(TradingType::Price);
        spread.update_leg_tick(&tick("NEAR", 100.0, 100.2, 10.0)).unwrap();
        spread.update_leg_tick(&tick("FAR", 98.4, 98.5, 10.0)).unwrap();
        // ask = 100.2 - 98.4 = 1.8 <= limit 2.0
        let mut algo = long_taker(2.0, 3.0);
        let mut ctx = ctx_with_legs();

        algo.on_tick(&mut ctx, &spread, None);
        assert_eq!(ctx.sent.len(), 1);
        let req = &ctx.sent[0];
        assert_eq!(req.symbol, "NEAR");
        assert_eq!(req.direction, Direction::Long);
        assert_eq!(req.volume, 3.0);
        // ask + payup * pricetick
        assert!((req.price - (100.2 + 0.2 * 2.0)).abs() < 1e-9);
    }

    #[test]
    fn available_volume_caps_the_take() {
        let mut spread = spread(TradingType::Price);
        spread.update_leg_tick(&tick("NEAR", 100.0, 100.2, 2.0)).unwrap();
        spread.update_leg_tick(&tick("FAR", 98.4, 98.5, 10.0)).unwrap();
        let mut algo = long_taker(2.0, 5.0);
        let mut ctx = ctx_with_legs();

        algo.on_tick(&mut ctx, &spread, None);
        assert_eq!(ctx.sent[0].volume, 2.0);
    }

    #[test]
    fn active_fill_triggers_hedge() {
        let mut spread = spread(TradingType::Price);
        spread.update_leg_tick(&tick("NEAR", 100.0, 100.2, 10.0)).unwrap();
        spread.update_leg_tick(&tick("FAR", 98.4, 98.5, 10.0)).unwrap();
        let mut algo = long_taker(2.0, 3.0);
        let mut ctx = ctx_with_legs();

        algo.on_tick(&mut ctx, &spread, None);
        let active_req = ctx.sent[0].clone();
        let order_id = OrderId(1);

        let trade = fill_for(&active_req, order_id, 1);
        algo.core_mut().record_trade(&trade, &spread);
        algo.core_mut().record_order(&super::super::testkit::filled_order(&active_req, order_id));
        algo.on_trade(&mut ctx, &spread, &trade);

        assert_eq!(ctx.sent.len(), 2);
        let hedge = &ctx.sent[1];
        assert_eq!(hedge.symbol, "FAR");
        assert_eq!(hedge.direction, Direction::Short);
        assert_eq!(hedge.volume, 3.0);
        assert_eq!(algo.core().status, AlgoStatus::AllTraded);
    }

    #[test]
    fn interval_cancels_unfilled_orders() {
        let mut spread = spread(TradingType::Price);
        spread.update_leg_tick(&tick("NEAR", 100.0, 100.2, 10.0)).unwrap();
        spread.update_leg_tick(&tick("FAR", 98.4, 98.5, 10.0)).unwrap();
        let mut algo = long_taker(2.0, 3.0);
        let mut ctx = ctx_with_legs();

        algo.on_tick(&mut ctx, &spread, None);
        assert_eq!(ctx.sent.len(), 1);

        algo.on_interval(&mut ctx, &spread);
        assert_eq!(ctx.cancelled.len(), 1);
    }

    #[test]
    fn rate_take_requires_band() {
        let mut spread = spread(TradingType::Rate);
        spread.update_leg_tick(&tick("NEAR", 100.0, 100.0, 10.0)).unwrap();
        spread.update_leg_tick(&tick("FAR", 99.0, 99.0, 10.0)).unwrap();
        // ask_spread_rate = 1.0
        let mut algo = TakerAlgo::new(AlgoCore::new(
            AlgoId(1),
            Direction::Long,
            Offset::Open,
            0.0,
            Some(1.5),
            3.0,
            2.0,
            5,
        ));
        let mut ctx = ctx_with_legs();

        algo.on_tick(&mut ctx, &spread, None);
        assert!(ctx.sent.is_empty());

        let band = Band {
            lower: 0.5,
            upper: 1.5,
        };
        algo.on_tick(&mut ctx, &spread, Some(band));
        assert_eq!(ctx.sent.len(), 1);
    }

    #[test]
    fn rate_take_rejects_outlier_quote() {
        let mut spread = spread(TradingType::Rate);
        spread.update_leg_tick(&tick("NEAR", 100.0, 100.0, 10.0)).unwrap();
        spread.update_leg_tick(&tick("FAR", 99.0, 99.0, 10.0)).unwrap();
        let mut algo = TakerAlgo::new(AlgoCore::new(
            AlgoId(1),
            Direction::Long,
            Offset::Open,
            0.0,
            Some(1.5),
            3.0,
            2.0,
            5,
        ));
        let mut ctx = ctx_with_legs();

        // Quote rate 1.0 sits outside the band.
        let band = Band {
            lower: 2.0,
            upper: 3.0,
        };
        algo.on_tick(&mut ctx, &spread, Some(band));
        assert!(ctx.sent.is_empty());
    }
}

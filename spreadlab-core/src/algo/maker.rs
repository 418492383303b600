//! Maker execution: rest a derived quote on the active leg.

use crate::domain::{Direction, OrderData, TradeData};
use crate::filter::Band;
use crate::spread::{round_to, SpreadData, TradingType};

use super::{AlgoContext, AlgoCore, SpreadAlgo};

/// Passive spread algo.
///
/// Inverts the spread limit into an active-leg limit price and rests it in
/// the book. The quote follows the passive legs: when they move enough that
/// the derived price drifts by more than `payup` ticks, the resting order
/// is cancelled and re-placed on the next tick. Fills on the active leg are
/// hedged aggressively, and hedging pauses quoting until flat.
pub struct MakerAlgo {
    core: AlgoCore,
    /// Price of the currently resting quote, if any.
    quote_price: Option<f64>,
}

impl MakerAlgo {
    pub const NAME: &'static str = "maker";

    pub fn new(core: AlgoCore) -> Self {
        MakerAlgo {
            core,
            quote_price: None,
        }
    }

    /// Active-leg limit price that realizes the spread limit against the
    /// current passive-leg quotes, rounded to the leg's price tick.
    ///
    /// Solving `limit = sum(leg_price * pm)` for the active leg: buying the
    /// spread consumes the other side of each passive leg, so the active
    /// contribution is `(limit - spread_side) / pm` re-anchored on the
    /// active leg's own quote. Rate-traded spreads convert the rate limit
    /// into price space via the active leg first, and refuse to quote while
    /// the rate sits outside the acceptance band.
    fn calculate_quote_price(
        &self,
        ctx: &dyn AlgoContext,
        spread: &SpreadData,
        band: Option<Band>,
    ) -> Option<f64> {
        let active_symbol = spread.active_symbol();
        let pm = spread.price_multiplier(active_symbol)?;
        let active = spread.active_leg();
        let pricetick = ctx.get_pricetick(active_symbol)?;

        let (limit, spread_side, anchor) = match spread.trading_type {
            TradingType::Price => match self.core.direction {
                // Buying the spread rests below the market: remove the
                // active ask contribution from the spread ask.
                Direction::Long => {
                    let anchor = if pm > 0.0 { active.ask_price } else { active.bid_price };
                    (self.core.price, spread.ask_price, anchor)
                }
                Direction::Short => {
                    let anchor = if pm > 0.0 { active.bid_price } else { active.ask_price };
                    (self.core.price, spread.bid_price, anchor)
                }
            },
            TradingType::Rate => {
                let limit_rate = self.core.spread_rate?;
                match self.core.direction {
                    Direction::Long => {
                        if !band?.contains(limit_rate) {
                            return None;
                        }
                        let anchor = if pm > 0.0 { active.ask_price } else { active.bid_price };
                        (
                            limit_rate / 100.0 * active.ask_price,
                            spread.ask_price,
                            anchor,
                        )
                    }
                    Direction::Short => {
                        if !band?.contains(limit_rate) {
                            return None;
                        }
                        let anchor = if pm > 0.0 { active.bid_price } else { active.ask_price };
                        (
                            limit_rate / 100.0 * active.bid_price,
                            spread.bid_price,
                            anchor,
                        )
                    }
                }
            }
        };

        Some(round_to((limit - spread_side) / pm + anchor, pricetick))
    }

    fn quote_active_leg(&mut self, ctx: &mut dyn AlgoContext, spread: &SpreadData, price: f64) {
        let remaining = self.core.target() - self.core.traded;
        let active_symbol = spread.active_symbol().to_string();
        let leg_volume = spread.calculate_leg_volume(&active_symbol, remaining);
        if self
            .core
            .send_leg_order(ctx, &active_symbol, leg_volume, Some(price))
        {
            self.quote_price = Some(price);
        }
    }
}

impl SpreadAlgo for MakerAlgo {
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

        // Hedging outranks quoting and continues after the algo went
        // terminal.
        if !self.core.is_hedge_finished(spread) {
            if self.core.is_order_finished() {
                self.core.hedge_passive_legs(ctx, spread);
            }
            return;
        }

        if !self.core.is_active() {
            return;
        }

        let Some(new_price) = self.calculate_quote_price(ctx, spread, band) else {
            return;
        };

        if self.core.is_order_finished() {
            self.quote_active_leg(ctx, spread, new_price);
            return;
        }

        // Re-quote only when the derived price drifts beyond the padding.
        if let (Some(current), Some(pricetick)) = (
            self.quote_price,
            ctx.get_pricetick(spread.active_symbol()),
        ) {
            if (new_price - current).abs() > pricetick * self.core.payup {
                self.core.cancel_all(ctx);
            }
        }
    }

    fn on_order(&mut self, _ctx: &mut dyn AlgoContext, _spread: &SpreadData, order: &OrderData) {
        // The resting quote going terminal clears the tracked price; the
        // next tick re-quotes if the algo still has volume to do.
        if !order.is_active() && self.core.is_order_finished() {
            self.quote_price = None;
        }
    }

    fn on_trade(&mut self, ctx: &mut dyn AlgoContext, spread: &SpreadData, trade: &TradeData) {
        if trade.symbol == spread.active_symbol() && !self.core.is_hedge_finished(spread) {
            self.core.hedge_passive_legs(ctx, spread);
        }
    }

    fn on_interval(&mut self, ctx: &mut dyn AlgoContext, spread: &SpreadData) {
        // Stuck hedge orders are cancelled and re-sent on the next tick;
        // the resting quote is left alone.
        if self.core.is_active()
            && !self.core.is_hedge_finished(spread)
            && !self.core.is_order_finished()
        {
            self.core.cancel_all(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testkit::{fill_for, filled_order, StubContext};
    use super::super::SpreadAlgo;
    use super::*;
    use crate::domain::{AlgoId, Offset, OrderId, OrderStatus, TickData};
    use crate::spread::LegConfig;
    use chrono::NaiveDate;

    fn spread() -> SpreadData {
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
            TradingType::Price,
        )
        .unwrap()
    }

    fn tick(symbol: &str, bid: f64, ask: f64) -> TickData {
        TickData {
            symbol: symbol.into(),
            datetime: NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
            last_price: (bid + ask) / 2.0,
            bid_price: bid,
            bid_volume: 10.0,
            ask_price: ask,
            ask_volume: 10.0,
        }
    }

    fn long_maker(price: f64, volume: f64) -> MakerAlgo {
        MakerAlgo::new(AlgoCore::new(
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

    fn quoted_spread() -> SpreadData {
        let mut spread = spread();
        spread.update_leg_tick(&tick("NEAR", 100.0, 100.2)).unwrap();
        spread.update_leg_tick(&tick("FAR", 98.0, 98.1)).unwrap();
        spread
    }

    #[test]
    fn rests_quote_derived_from_limit() {
        let spread = quoted_spread();
        let mut algo = long_maker(2.0, 3.0);
        let mut ctx = ctx_with_legs();

        algo.on_tick(&mut ctx, &spread, None);
        assert_eq!(ctx.sent.len(), 1);
        let req = &ctx.sent[0];
        assert_eq!(req.symbol, "NEAR");
        assert_eq!(req.direction, Direction::Long);
        assert_eq!(req.volume, 3.0);
        // spread.ask = 100.2 - 98.0 = 2.2; quote = (2.0 - 2.2)/1 + 100.2 = 100.0
        assert!((req.price - 100.0).abs() < 1e-9);
    }

    #[test]
    fn short_quote_is_symmetric() {
        let spread = quoted_spread();
        let mut algo = MakerAlgo::new(AlgoCore::new(
            AlgoId(1),
            Direction::Short,
            Offset::Open,
            2.1,
            None,
            3.0,
            2.0,
            5,
        ));
        let mut ctx = ctx_with_legs();

        algo.on_tick(&mut ctx, &spread, None);
        let req = &ctx.sent[0];
        assert_eq!(req.direction, Direction::Short);
        // spread.bid = 100.0 - 98.1 = 1.9; quote = (2.1 - 1.9)/1 + 100.0 = 100.2
        assert!((req.price - 100.2).abs() < 1e-9);
    }

    #[test]
    fn small_drift_keeps_quote_resting() {
        let mut spread = quoted_spread();
        let mut algo = long_maker(2.0, 3.0);
        let mut ctx = ctx_with_legs();

        algo.on_tick(&mut ctx, &spread, None);
        assert_eq!(ctx.sent.len(), 1);

        // FAR drifts by one tick: derived quote moves 0.1 < 0.2 * 2.
        spread.update_leg_tick(&tick("FAR", 98.1, 98.2)).unwrap();
        algo.on_tick(&mut ctx, &spread, None);
        assert!(ctx.cancelled.is_empty());
        assert_eq!(ctx.sent.len(), 1);
    }

    #[test]
    fn large_drift_cancels_and_requotes() {
        let mut spread = quoted_spread();
        let mut algo = long_maker(2.0, 3.0);
        let mut ctx = ctx_with_legs();

        algo.on_tick(&mut ctx, &spread, None);
        let quote_id = OrderId(1);

        // Passive leg gaps a full point: quote must chase.
        spread.update_leg_tick(&tick("FAR", 99.0, 99.1)).unwrap();
        algo.on_tick(&mut ctx, &spread, None);
        assert_eq!(ctx.cancelled, vec![quote_id]);

        // Cancel confirm comes back, next tick re-quotes at the new level.
        let mut order = filled_order(&ctx.sent[0].clone(), quote_id);
        order.traded = 0.0;
        order.status = OrderStatus::Cancelled;
        algo.core_mut().record_order(&order);
        algo.on_order(&mut ctx, &spread, &order);

        algo.on_tick(&mut ctx, &spread, None);
        assert_eq!(ctx.sent.len(), 2);
        // spread.ask = 100.2 - 99.0 = 1.2; quote = (2.0 - 1.2)/1 + 100.2 = 101.0
        assert!((ctx.sent[1].price - 101.0).abs() < 1e-9);
    }

    #[test]
    fn active_fill_is_hedged_before_quoting_resumes() {
        let spread = quoted_spread();
        let mut algo = long_maker(2.0, 3.0);
        let mut ctx = ctx_with_legs();

        algo.on_tick(&mut ctx, &spread, None);
        let quote_req = ctx.sent[0].clone();
        let quote_id = OrderId(1);

        let trade = fill_for(&quote_req, quote_id, 1);
        algo.core_mut().record_trade(&trade, &spread);
        algo.core_mut().record_order(&filled_order(&quote_req, quote_id));
        algo.on_trade(&mut ctx, &spread, &trade);

        assert_eq!(ctx.sent.len(), 2);
        assert_eq!(ctx.sent[1].symbol, "FAR");
        assert_eq!(ctx.sent[1].direction, Direction::Short);
        assert_eq!(ctx.sent[1].volume, 3.0);
    }

    #[test]
    fn rate_maker_needs_band() {
        let mut spread = SpreadData::new(
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
            TradingType::Rate,
        )
        .unwrap();
        spread.update_leg_tick(&tick("NEAR", 100.0, 100.0)).unwrap();
        spread.update_leg_tick(&tick("FAR", 99.0, 99.0)).unwrap();

        let mut algo = MakerAlgo::new(AlgoCore::new(
            AlgoId(1),
            Direction::Long,
            Offset::Open,
            0.0,
            Some(0.8),
            3.0,
            2.0,
            5,
        ));
        let mut ctx = ctx_with_legs();
        ctx.set_quote("NEAR", 100.0, 100.0);
        ctx.set_quote("FAR", 99.0, 99.0);

        algo.on_tick(&mut ctx, &spread, None);
        assert!(ctx.sent.is_empty());

        let band = Band {
            lower: 0.5,
            upper: 1.5,
        };
        algo.on_tick(&mut ctx, &spread, Some(band));
        assert_eq!(ctx.sent.len(), 1);
        // limit price = 0.8% of 100 = 0.8; spread.ask = 1.0
        // quote = (0.8 - 1.0)/1 + 100.0 = 99.8
        assert!((ctx.sent[0].price - 99.8).abs() < 1e-9);
    }
}

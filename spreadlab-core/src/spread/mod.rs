//! Multi-leg spread model: leg quotes in, derived prices/volumes out.
//!
//! A spread is a synthetic instrument over several underlying contracts.
//! Each leg carries a *price multiplier* (contribution to the derived price)
//! and a *trading multiplier* (leg lots per spread lot, signed by trading
//! direction). One leg is designated *active* — aggressive orders route
//! through it; the remaining legs are hedged mechanically.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::TickData;

/// Spread construction and update errors. All are configuration errors that
/// fail fast; none occur on the tick path once a spread is built.
#[derive(Debug, Error)]
pub enum SpreadError {
    #[error("spread '{0}' has no legs")]
    NoLegs(String),
    #[error("active leg '{0}' is not among the spread legs")]
    ActiveLegMissing(String),
    #[error("active leg '{0}' has a zero price multiplier")]
    ZeroActiveMultiplier(String),
    #[error("leg '{0}' has a zero trading multiplier")]
    ZeroTradingMultiplier(String),
    #[error("min_volume must be positive, got {0}")]
    BadMinVolume(f64),
    #[error("symbol '{0}' is not a leg of this spread")]
    UnknownLeg(String),
}

/// Whether algos quote/cross on absolute spread price or on spread rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingType {
    Price,
    Rate,
}

/// Static definition of one leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegConfig {
    pub symbol: String,
    /// Contribution to the derived spread price.
    pub price_multiplier: f64,
    /// Leg lots per spread lot, signed by trading direction.
    pub trading_multiplier: f64,
}

/// Live quote snapshot of one leg.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegData {
    pub symbol: String,
    pub bid_price: f64,
    pub bid_volume: f64,
    pub ask_price: f64,
    pub ask_volume: f64,
    pub last_price: f64,
    /// Net position in leg lots, updated only by confirmed trades.
    pub net_pos: f64,
}

impl LegData {
    fn new(symbol: &str) -> Self {
        LegData {
            symbol: symbol.to_string(),
            ..Default::default()
        }
    }

    pub fn has_quote(&self) -> bool {
        self.bid_price > 0.0 && self.ask_price > 0.0
    }
}

/// The spread instrument: legs, multipliers, and derived quote fields.
///
/// Created once per definition, mutated on every leg tick, lives for the
/// session. Derived fields stay at zero until every leg has a quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadData {
    pub name: String,
    legs: Vec<LegData>,
    price_multipliers: HashMap<String, f64>,
    trading_multipliers: HashMap<String, f64>,
    active_symbol: String,
    pub min_volume: f64,
    pub trading_type: TradingType,

    /// Net position in spread lots, derived from the active leg.
    pub net_pos: f64,
    pub datetime: Option<NaiveDateTime>,

    // Derived quote fields, recomputed on every leg tick.
    pub bid_price: f64,
    pub ask_price: f64,
    pub bid_volume: f64,
    pub ask_volume: f64,
    pub bid_spread_rate: f64,
    pub ask_spread_rate: f64,
}

impl SpreadData {
    /// Builds and validates a spread definition.
    pub fn new(
        name: &str,
        legs: &[LegConfig],
        active_symbol: &str,
        min_volume: f64,
        trading_type: TradingType,
    ) -> Result<Self, SpreadError> {
        if legs.is_empty() {
            return Err(SpreadError::NoLegs(name.to_string()));
        }
        if !legs.iter().any(|leg| leg.symbol == active_symbol) {
            return Err(SpreadError::ActiveLegMissing(active_symbol.to_string()));
        }
        if min_volume <= 0.0 {
            return Err(SpreadError::BadMinVolume(min_volume));
        }

        let mut price_multipliers = HashMap::new();
        let mut trading_multipliers = HashMap::new();
        for leg in legs {
            if leg.symbol == active_symbol && leg.price_multiplier == 0.0 {
                return Err(SpreadError::ZeroActiveMultiplier(leg.symbol.clone()));
            }
            if leg.trading_multiplier == 0.0 {
                return Err(SpreadError::ZeroTradingMultiplier(leg.symbol.clone()));
            }
            price_multipliers.insert(leg.symbol.clone(), leg.price_multiplier);
            trading_multipliers.insert(leg.symbol.clone(), leg.trading_multiplier);
        }

        Ok(SpreadData {
            name: name.to_string(),
            legs: legs.iter().map(|leg| LegData::new(&leg.symbol)).collect(),
            price_multipliers,
            trading_multipliers,
            active_symbol: active_symbol.to_string(),
            min_volume,
            trading_type,
            net_pos: 0.0,
            datetime: None,
            bid_price: 0.0,
            ask_price: 0.0,
            bid_volume: 0.0,
            ask_volume: 0.0,
            bid_spread_rate: 0.0,
            ask_spread_rate: 0.0,
        })
    }

    pub fn active_symbol(&self) -> &str {
        &self.active_symbol
    }

    pub fn active_leg(&self) -> &LegData {
        self.legs
            .iter()
            .find(|leg| leg.symbol == self.active_symbol)
            .expect("active leg validated at construction")
    }

    pub fn legs(&self) -> &[LegData] {
        &self.legs
    }

    pub fn leg(&self, symbol: &str) -> Option<&LegData> {
        self.legs.iter().find(|leg| leg.symbol == symbol)
    }

    /// Legs hedged mechanically (everything but the active leg).
    pub fn passive_legs(&self) -> impl Iterator<Item = &LegData> {
        self.legs
            .iter()
            .filter(move |leg| leg.symbol != self.active_symbol)
    }

    pub fn price_multiplier(&self, symbol: &str) -> Option<f64> {
        self.price_multipliers.get(symbol).copied()
    }

    pub fn trading_multiplier(&self, symbol: &str) -> Option<f64> {
        self.trading_multipliers.get(symbol).copied()
    }

    /// True once every leg has both sides quoted.
    pub fn is_inited(&self) -> bool {
        self.legs.iter().all(|leg| leg.has_quote())
    }

    /// Applies a leg tick and recomputes the derived quote fields.
    pub fn update_leg_tick(&mut self, tick: &TickData) -> Result<(), SpreadError> {
        let leg = self
            .legs
            .iter_mut()
            .find(|leg| leg.symbol == tick.symbol)
            .ok_or_else(|| SpreadError::UnknownLeg(tick.symbol.clone()))?;

        leg.bid_price = tick.bid_price;
        leg.bid_volume = tick.bid_volume;
        leg.ask_price = tick.ask_price;
        leg.ask_volume = tick.ask_volume;
        leg.last_price = tick.last_price;

        self.datetime = Some(tick.datetime);
        self.calculate_price();
        Ok(())
    }

    /// Records a confirmed fill on a leg and re-derives the spread position
    /// from the active leg.
    pub fn update_leg_trade(&mut self, symbol: &str, signed_volume: f64) -> Result<(), SpreadError> {
        let leg = self
            .legs
            .iter_mut()
            .find(|leg| leg.symbol == symbol)
            .ok_or_else(|| SpreadError::UnknownLeg(symbol.to_string()))?;
        leg.net_pos += signed_volume;

        let active_pos = self.active_leg().net_pos;
        let active_symbol = self.active_symbol.clone();
        self.net_pos = self.calculate_spread_volume(&active_symbol, active_pos);
        Ok(())
    }

    /// Recomputes the worst-case executable spread quotes.
    ///
    /// Entering the spread long pays each positive-multiplier leg's ask and
    /// receives each negative-multiplier leg's bid; `ask_price` is that cost,
    /// `bid_price` the mirror image. Tradable volumes are the bottleneck over
    /// legs, floored to `min_volume`.
    pub fn calculate_price(&mut self) {
        if !self.is_inited() {
            self.bid_price = 0.0;
            self.ask_price = 0.0;
            self.bid_volume = 0.0;
            self.ask_volume = 0.0;
            self.bid_spread_rate = 0.0;
            self.ask_spread_rate = 0.0;
            return;
        }

        let mut bid_price = 0.0;
        let mut ask_price = 0.0;
        let mut bid_volume = f64::MAX;
        let mut ask_volume = f64::MAX;

        for leg in &self.legs {
            let pm = self.price_multipliers[&leg.symbol];
            let tm = self.trading_multipliers[&leg.symbol];

            if pm > 0.0 {
                bid_price += leg.bid_price * pm;
                ask_price += leg.ask_price * pm;
            } else {
                bid_price += leg.ask_price * pm;
                ask_price += leg.bid_price * pm;
            }

            // Selling the spread consumes the leg's bid (tm > 0) or ask
            // (tm < 0) liquidity; buying consumes the opposite side.
            let (leg_bid_avail, leg_ask_avail) = if tm > 0.0 {
                (leg.bid_volume, leg.ask_volume)
            } else {
                (leg.ask_volume, leg.bid_volume)
            };
            bid_volume = bid_volume.min(leg_bid_avail / tm.abs());
            ask_volume = ask_volume.min(leg_ask_avail / tm.abs());
        }

        self.bid_price = bid_price;
        self.ask_price = ask_price;
        self.bid_volume = floor_to(bid_volume, self.min_volume);
        self.ask_volume = floor_to(ask_volume, self.min_volume);

        let (active_bid, active_ask) = {
            let active = self.active_leg();
            (active.bid_price, active.ask_price)
        };
        self.bid_spread_rate = if active_bid > 0.0 {
            100.0 * self.bid_price / active_bid
        } else {
            0.0
        };
        self.ask_spread_rate = if active_ask > 0.0 {
            100.0 * self.ask_price / active_ask
        } else {
            0.0
        };
    }

    /// Copy of the derived quote fields, cheap to hand to observers.
    pub fn snapshot(&self) -> SpreadSnapshot {
        SpreadSnapshot {
            name: self.name.clone(),
            datetime: self.datetime,
            bid_price: self.bid_price,
            ask_price: self.ask_price,
            bid_volume: self.bid_volume,
            ask_volume: self.ask_volume,
            bid_spread_rate: self.bid_spread_rate,
            ask_spread_rate: self.ask_spread_rate,
            net_pos: self.net_pos,
        }
    }

    /// Leg lots corresponding to a signed spread volume.
    pub fn calculate_leg_volume(&self, symbol: &str, spread_volume: f64) -> f64 {
        let tm = self.trading_multipliers.get(symbol).copied().unwrap_or(0.0);
        spread_volume * tm
    }

    /// Signed spread volume realized by a signed leg volume, truncated
    /// toward zero to `min_volume` granularity. Inverse of
    /// [`calculate_leg_volume`](Self::calculate_leg_volume) up to rounding.
    pub fn calculate_spread_volume(&self, symbol: &str, leg_volume: f64) -> f64 {
        let tm = self.trading_multipliers.get(symbol).copied().unwrap_or(0.0);
        if tm == 0.0 {
            return 0.0;
        }
        trunc_to(leg_volume / tm, self.min_volume)
    }
}

/// Derived quote fields of a spread at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadSnapshot {
    pub name: String,
    pub datetime: Option<NaiveDateTime>,
    pub bid_price: f64,
    pub ask_price: f64,
    pub bid_volume: f64,
    pub ask_volume: f64,
    pub bid_spread_rate: f64,
    pub ask_spread_rate: f64,
    pub net_pos: f64,
}

/// Rounds to the nearest multiple of `target`.
pub fn round_to(value: f64, target: f64) -> f64 {
    (value / target).round() * target
}

/// Floors toward negative infinity to a multiple of `target`.
pub fn floor_to(value: f64, target: f64) -> f64 {
    (value / target).floor() * target
}

/// Truncates toward zero to a multiple of `target`.
pub fn trunc_to(value: f64, target: f64) -> f64 {
    (value / target).trunc() * target
}

//! Per-day PnL accounting over the backtest trade stream.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use spreadlab_core::domain::TradeData;

/// One calendar day of the backtest: its close, the trades that settled,
/// and the PnL decomposition once [`calculate_pnl`](Self::calculate_pnl)
/// has run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyResult {
    pub date: NaiveDate,
    pub close_price: f64,
    pub pre_close: f64,

    pub trades: Vec<TradeData>,
    pub trade_count: usize,

    pub start_pos: f64,
    pub end_pos: f64,

    pub turnover: f64,
    pub commission: f64,
    pub slippage: f64,

    /// PnL from positions changed today, marked to today's close.
    pub trading_pnl: f64,
    /// PnL from the position carried in overnight.
    pub holding_pnl: f64,
    pub total_pnl: f64,
    pub net_pnl: f64,
}

impl DailyResult {
    pub fn new(date: NaiveDate, close_price: f64) -> Self {
        DailyResult {
            date,
            close_price,
            pre_close: 0.0,
            trades: Vec::new(),
            trade_count: 0,
            start_pos: 0.0,
            end_pos: 0.0,
            turnover: 0.0,
            commission: 0.0,
            slippage: 0.0,
            trading_pnl: 0.0,
            holding_pnl: 0.0,
            total_pnl: 0.0,
            net_pnl: 0.0,
        }
    }

    pub fn add_trade(&mut self, trade: TradeData) {
        self.trades.push(trade);
    }

    /// Marks the day: holding PnL on the carried position, trading PnL per
    /// trade against today's close, commission on turnover, linear slippage.
    ///
    /// A missing previous close (first day) falls back to 1.0 so the
    /// downstream return series never divides by zero.
    pub fn calculate_pnl(
        &mut self,
        pre_close: f64,
        start_pos: f64,
        size: f64,
        rate: f64,
        slippage: f64,
    ) {
        self.pre_close = if pre_close > 0.0 { pre_close } else { 1.0 };
        self.start_pos = start_pos;
        self.end_pos = start_pos;

        self.trade_count = self.trades.len();
        self.turnover = 0.0;
        self.commission = 0.0;
        self.slippage = 0.0;
        self.trading_pnl = 0.0;

        self.holding_pnl = self.start_pos * (self.close_price - self.pre_close) * size;

        for trade in &self.trades {
            let pos_change = trade.signed_volume();
            self.end_pos += pos_change;

            self.trading_pnl += pos_change * (self.close_price - trade.price) * size;

            let turnover = trade.volume * size * trade.price;
            self.turnover += turnover;
            self.commission += turnover * rate;
            self.slippage += trade.volume * size * slippage;
        }

        self.total_pnl = self.trading_pnl + self.holding_pnl;
        self.net_pnl = self.total_pnl - self.commission - self.slippage;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use spreadlab_core::domain::{Direction, Offset, OrderId, TradeId};

    fn trade(direction: Direction, price: f64, volume: f64) -> TradeData {
        TradeData {
            id: TradeId(1),
            order_id: OrderId(1),
            symbol: "SPREAD".into(),
            direction,
            offset: Offset::Open,
            price,
            volume,
            value: price * volume,
            spread_rate: 0.0,
            datetime: NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn flat_day_with_one_long_trade() {
        // One long of 10 @ 100, day closes at 105, size 1, rate 2e-4.
        let mut day = DailyResult::new(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 105.0);
        day.add_trade(trade(Direction::Long, 100.0, 10.0));
        day.calculate_pnl(100.0, 0.0, 1.0, 0.0002, 0.0);

        assert_eq!(day.holding_pnl, 0.0);
        assert!((day.trading_pnl - 50.0).abs() < 1e-9);
        assert!((day.commission - 0.2).abs() < 1e-9);
        assert_eq!(day.slippage, 0.0);
        assert!((day.net_pnl - 49.8).abs() < 1e-9);
        assert_eq!(day.end_pos, 10.0);
    }

    #[test]
    fn holding_pnl_marks_carried_position() {
        let mut day = DailyResult::new(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(), 102.0);
        day.calculate_pnl(100.0, 5.0, 2.0, 0.0, 0.0);

        // 5 lots carried over a 2-point move at size 2.
        assert!((day.holding_pnl - 20.0).abs() < 1e-9);
        assert_eq!(day.trading_pnl, 0.0);
        assert!((day.net_pnl - 20.0).abs() < 1e-9);
    }

    #[test]
    fn short_trades_have_negative_pos_change() {
        let mut day = DailyResult::new(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 95.0);
        day.add_trade(trade(Direction::Short, 100.0, 4.0));
        day.calculate_pnl(100.0, 0.0, 1.0, 0.0, 0.0);

        // Sold at 100, closed at 95: +5 per lot.
        assert!((day.trading_pnl - 20.0).abs() < 1e-9);
        assert_eq!(day.end_pos, -4.0);
    }

    #[test]
    fn first_day_pre_close_falls_back_to_one() {
        let mut day = DailyResult::new(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 105.0);
        day.calculate_pnl(0.0, 0.0, 1.0, 0.0, 0.0);
        assert_eq!(day.pre_close, 1.0);
    }

    #[test]
    fn slippage_scales_with_volume_and_size() {
        let mut day = DailyResult::new(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 100.0);
        day.add_trade(trade(Direction::Long, 100.0, 3.0));
        day.calculate_pnl(100.0, 0.0, 10.0, 0.0, 0.5);
        assert!((day.slippage - 15.0).abs() < 1e-9);
    }

    #[test]
    fn recalculation_is_idempotent() {
        let mut day = DailyResult::new(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 105.0);
        day.add_trade(trade(Direction::Long, 100.0, 10.0));
        day.calculate_pnl(100.0, 0.0, 1.0, 0.0002, 0.0);
        let first = day.net_pnl;
        day.calculate_pnl(100.0, 0.0, 1.0, 0.0002, 0.0);
        assert_eq!(day.net_pnl, first);
        assert_eq!(day.end_pos, 10.0);
    }
}

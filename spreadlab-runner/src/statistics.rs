//! Aggregate performance statistics over the daily result chain.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::daily::DailyResult;

/// Trading days per year used for annualization.
pub const ANNUAL_DAYS: f64 = 240.0;

/// Summary risk/return metrics for one backtest run.
///
/// All-zero (with `None` dates) when the run produced no daily results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestStatistics {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub total_days: usize,
    pub profit_days: usize,
    pub loss_days: usize,

    pub capital: f64,
    pub end_balance: f64,

    pub max_drawdown: f64,
    pub max_ddpercent: f64,
    /// Days from the balance peak to the deepest trough after it.
    pub max_drawdown_duration: i64,

    pub total_net_pnl: f64,
    pub daily_net_pnl: f64,
    pub total_commission: f64,
    pub daily_commission: f64,
    pub total_slippage: f64,
    pub daily_slippage: f64,
    pub total_turnover: f64,
    pub daily_turnover: f64,
    pub total_trade_count: usize,
    pub daily_trade_count: f64,

    /// Percent return over the whole run.
    pub total_return: f64,
    pub annual_return: f64,
    /// Mean daily log-return, in percent.
    pub daily_return: f64,
    /// Stddev of daily log-returns, in percent.
    pub return_std: f64,
    pub sharpe_ratio: f64,
    pub return_drawdown_ratio: f64,
}

impl BacktestStatistics {
    /// Computes the full metric set from a chronologically ordered daily
    /// result chain (each day already carrying its net PnL).
    pub fn from_daily(daily: &[DailyResult], capital: f64) -> Self {
        if daily.is_empty() {
            return BacktestStatistics {
                capital,
                end_balance: capital,
                ..Default::default()
            };
        }

        let mut stats = BacktestStatistics {
            start_date: Some(daily[0].date),
            end_date: Some(daily[daily.len() - 1].date),
            total_days: daily.len(),
            capital,
            ..Default::default()
        };

        let mut balance = capital;
        let mut high_level = capital;
        let mut high_date = daily[0].date;
        let mut returns: Vec<f64> = Vec::with_capacity(daily.len());

        for day in daily {
            let pre_balance = if balance > 0.0 { balance } else { 1.0 };
            balance += day.net_pnl;
            returns.push((balance / pre_balance).max(f64::MIN_POSITIVE).ln());

            if day.net_pnl > 0.0 {
                stats.profit_days += 1;
            } else if day.net_pnl < 0.0 {
                stats.loss_days += 1;
            }

            if balance >= high_level {
                high_level = balance;
                high_date = day.date;
            } else {
                let drawdown = balance - high_level;
                if drawdown < stats.max_drawdown {
                    stats.max_drawdown = drawdown;
                    stats.max_ddpercent = if high_level > 0.0 {
                        drawdown / high_level * 100.0
                    } else {
                        0.0
                    };
                    stats.max_drawdown_duration = (day.date - high_date).num_days();
                }
            }

            stats.total_net_pnl += day.net_pnl;
            stats.total_commission += day.commission;
            stats.total_slippage += day.slippage;
            stats.total_turnover += day.turnover;
            stats.total_trade_count += day.trade_count;
        }

        stats.end_balance = balance;

        let days = stats.total_days as f64;
        stats.daily_net_pnl = stats.total_net_pnl / days;
        stats.daily_commission = stats.total_commission / days;
        stats.daily_slippage = stats.total_slippage / days;
        stats.daily_turnover = stats.total_turnover / days;
        stats.daily_trade_count = stats.total_trade_count as f64 / days;

        stats.total_return = (stats.end_balance / capital - 1.0) * 100.0;
        stats.annual_return = stats.total_return / days * ANNUAL_DAYS;

        let mean = returns.iter().sum::<f64>() / days;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / days;
        stats.daily_return = mean * 100.0;
        stats.return_std = variance.sqrt() * 100.0;

        stats.sharpe_ratio = if stats.return_std > 0.0 {
            stats.daily_return / stats.return_std * ANNUAL_DAYS.sqrt()
        } else {
            0.0
        };
        stats.return_drawdown_ratio = if stats.max_ddpercent < 0.0 {
            -stats.total_return / stats.max_ddpercent
        } else {
            0.0
        };

        stats
    }

    /// Looks a statistic up by name; the optimization target is selected
    /// this way from config.
    pub fn statistic(&self, name: &str) -> Option<f64> {
        let value = match name {
            "end_balance" => self.end_balance,
            "max_drawdown" => self.max_drawdown,
            "max_ddpercent" => self.max_ddpercent,
            "total_net_pnl" => self.total_net_pnl,
            "daily_net_pnl" => self.daily_net_pnl,
            "total_commission" => self.total_commission,
            "total_slippage" => self.total_slippage,
            "total_turnover" => self.total_turnover,
            "total_return" => self.total_return,
            "annual_return" => self.annual_return,
            "daily_return" => self.daily_return,
            "return_std" => self.return_std,
            "sharpe_ratio" => self.sharpe_ratio,
            "return_drawdown_ratio" => self.return_drawdown_ratio,
            _ => return None,
        };
        Some(value)
    }

    /// Logs the report at info level.
    pub fn log_report(&self) {
        info!(
            start = ?self.start_date,
            end = ?self.end_date,
            total_days = self.total_days,
            profit_days = self.profit_days,
            loss_days = self.loss_days,
            "backtest period"
        );
        info!(
            capital = self.capital,
            end_balance = self.end_balance,
            total_net_pnl = self.total_net_pnl,
            total_commission = self.total_commission,
            total_slippage = self.total_slippage,
            total_turnover = self.total_turnover,
            trades = self.total_trade_count,
            "backtest totals"
        );
        info!(
            total_return = self.total_return,
            annual_return = self.annual_return,
            max_drawdown = self.max_drawdown,
            max_ddpercent = self.max_ddpercent,
            max_drawdown_duration = self.max_drawdown_duration,
            sharpe_ratio = self.sharpe_ratio,
            return_drawdown_ratio = self.return_drawdown_ratio,
            "backtest performance"
        );
    }
}

use crate::error::{BacktestError, BacktestResult};
use crate::models::{ClosedPosition, PositionSide};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use statrs::statistics::Statistics;
use std::cmp::Ordering;

/// One ledger row with its commission-adjusted return and running equity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRow {
    pub side: PositionSide,
    pub open_time: DateTime<Utc>,
    pub open_price: Decimal,
    pub close_time: DateTime<Utc>,
    pub close_price: Decimal,
    pub profit_ratio: Decimal,
    pub equity: Decimal,
}

/// Descriptive statistics over the profit-ratio column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfitRatioSummary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; undefined for a single trade.
    pub std: Option<f64>,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestStatistics {
    pub commission_rate: Decimal,
    pub trades: Vec<TradeRow>,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub arithmetic_mean: Option<Decimal>,
    pub geometric_mean: Option<f64>,
    pub twr: Decimal,
    pub max_drawdown_ratio: Decimal,
    pub summary: Option<ProfitRatioSummary>,
}

impl BacktestStatistics {
    pub fn profit_ratios(&self) -> Vec<Decimal> {
        self.trades.iter().map(|row| row.profit_ratio).collect()
    }

    /// Equity after each trade, keyed by the trade's close time.
    pub fn equity_curve(&self) -> Vec<(DateTime<Utc>, Decimal)> {
        self.trades
            .iter()
            .map(|row| (row.close_time, row.equity))
            .collect()
    }

    /// A geometric mean below one means the system loses money over the run.
    pub fn is_profitable(&self) -> bool {
        self.geometric_mean.map(|mean| mean > 1.0).unwrap_or(false)
    }
}

pub fn validate_commission_rate(rate: Decimal) -> BacktestResult<Decimal> {
    if rate < Decimal::ZERO || rate >= Decimal::ONE {
        return Err(BacktestError::Configuration(format!(
            "commission rate {} must be within [0, 1)",
            rate
        )));
    }
    Ok(rate)
}

/// Multiplicative return of one trade with commission charged on both legs.
///
/// Long: `close·(1−c) / open·(1+c)`. Short: `open·(1+c) / close·(1−c)`.
pub fn profit_ratio(
    position: &ClosedPosition,
    commission_rate: Decimal,
) -> BacktestResult<Decimal> {
    if position.open_price <= Decimal::ZERO || position.close_price <= Decimal::ZERO {
        return Err(BacktestError::InvalidTradePrice {
            side: position.side,
            open_time: position.open_time,
            open_price: position.open_price,
            close_price: position.close_price,
        });
    }
    let entry_cost = position
        .open_price
        .checked_mul(Decimal::ONE + commission_rate)
        .ok_or(BacktestError::Overflow("entry cost"))?;
    let exit_proceeds = position
        .close_price
        .checked_mul(Decimal::ONE - commission_rate)
        .ok_or(BacktestError::Overflow("exit proceeds"))?;

    let ratio = match position.side {
        PositionSide::Long => exit_proceeds.checked_div(entry_cost),
        PositionSide::Short => entry_cost.checked_div(exit_proceeds),
    };
    ratio.ok_or(BacktestError::Overflow("profit ratio"))
}

/// Running product of profit ratios starting from one.
pub fn equity_series(profit_ratios: &[Decimal]) -> BacktestResult<Vec<Decimal>> {
    let mut equity = Decimal::ONE;
    let mut series = Vec::with_capacity(profit_ratios.len());
    for ratio in profit_ratios {
        equity = equity
            .checked_mul(*ratio)
            .ok_or(BacktestError::Overflow("equity"))?;
        series.push(equity);
    }
    Ok(series)
}

pub fn arithmetic_mean(profit_ratios: &[Decimal]) -> BacktestResult<Option<Decimal>> {
    if profit_ratios.is_empty() {
        return Ok(None);
    }
    let mut sum = Decimal::ZERO;
    for ratio in profit_ratios {
        sum = sum
            .checked_add(*ratio)
            .ok_or(BacktestError::Overflow("profit ratio sum"))?;
    }
    sum.checked_div(Decimal::from(profit_ratios.len()))
        .map(Some)
        .ok_or(BacktestError::Overflow("arithmetic mean"))
}

/// `exp(mean(ln(ratio)))`, evaluated in floating point.
pub fn geometric_mean(profit_ratios: &[Decimal]) -> Option<f64> {
    if profit_ratios.is_empty() {
        return None;
    }
    let log_sum: f64 = profit_ratios.iter().map(|ratio| to_f64(*ratio).ln()).sum();
    Some((log_sum / profit_ratios.len() as f64).exp())
}

pub struct PerformanceCalculator;

impl PerformanceCalculator {
    pub fn calculate(
        positions: &[ClosedPosition],
        commission_rate: Decimal,
    ) -> BacktestResult<BacktestStatistics> {
        let commission_rate = validate_commission_rate(commission_rate)?;

        let profit_ratios = positions
            .iter()
            .map(|position| profit_ratio(position, commission_rate))
            .collect::<BacktestResult<Vec<_>>>()?;
        let equity = equity_series(&profit_ratios)?;

        let trades: Vec<TradeRow> = positions
            .iter()
            .zip(profit_ratios.iter().zip(equity.iter()))
            .map(|(position, (&profit_ratio, &equity))| TradeRow {
                side: position.side,
                open_time: position.open_time,
                open_price: position.open_price,
                close_time: position.close_time,
                close_price: position.close_price,
                profit_ratio,
                equity,
            })
            .collect();

        let winning_trades = profit_ratios.iter().filter(|r| **r > Decimal::ONE).count();
        let losing_trades = profit_ratios.iter().filter(|r| **r < Decimal::ONE).count();
        let twr = equity.last().copied().unwrap_or(Decimal::ONE);

        Ok(BacktestStatistics {
            commission_rate,
            trades,
            winning_trades,
            losing_trades,
            arithmetic_mean: arithmetic_mean(&profit_ratios)?,
            geometric_mean: geometric_mean(&profit_ratios),
            twr,
            max_drawdown_ratio: Self::calculate_max_drawdown(&equity)?,
            summary: Self::describe(&profit_ratios),
        })
    }

    fn describe(profit_ratios: &[Decimal]) -> Option<ProfitRatioSummary> {
        if profit_ratios.is_empty() {
            return None;
        }
        let values: Vec<f64> = profit_ratios.iter().map(|ratio| to_f64(*ratio)).collect();
        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        let mean = values.clone().mean();
        let std = if values.len() > 1 {
            Some(values.std_dev())
        } else {
            None
        };

        Some(ProfitRatioSummary {
            count: sorted.len(),
            mean,
            std,
            min: sorted[0],
            q25: Self::quantile(&sorted, 0.25),
            median: Self::quantile(&sorted, 0.5),
            q75: Self::quantile(&sorted, 0.75),
            max: sorted[sorted.len() - 1],
        })
    }

    /// Linear interpolation between closest ranks over sorted values.
    fn quantile(sorted: &[f64], q: f64) -> f64 {
        let position = q * (sorted.len() - 1) as f64;
        let lower = position.floor() as usize;
        let upper = position.ceil() as usize;
        let fraction = position - lower as f64;
        sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
    }

    /// Largest peak-to-trough fall of the equity curve, as a fraction of the peak.
    fn calculate_max_drawdown(equity: &[Decimal]) -> BacktestResult<Decimal> {
        let mut peak = Decimal::ONE;
        let mut max_drawdown = Decimal::ZERO;

        for value in equity.iter().copied() {
            if value > peak {
                peak = value;
                continue;
            }
            let drawdown = (peak - value)
                .checked_div(peak)
                .ok_or(BacktestError::Overflow("drawdown"))?;
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
            }
        }

        Ok(max_drawdown)
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn trade(
        side: PositionSide,
        open_price: Decimal,
        close_price: Decimal,
        day: i64,
    ) -> ClosedPosition {
        let base = Utc.with_ymd_and_hms(2022, 2, 1, 0, 0, 0).unwrap();
        ClosedPosition {
            side,
            open_time: base + Duration::days(day),
            open_price,
            close_time: base + Duration::days(day + 1),
            close_price,
        }
    }

    #[test]
    fn long_ratio_without_commission_is_exact() {
        let position = trade(PositionSide::Long, dec!(100), dec!(110), 0);
        assert_eq!(profit_ratio(&position, Decimal::ZERO).unwrap(), dec!(1.1));
    }

    #[test]
    fn commission_is_charged_on_both_legs() {
        let commission = dec!(0.0005);
        let long = trade(PositionSide::Long, dec!(100), dec!(110), 0);
        let expected = dec!(1.1) * (Decimal::ONE - commission) / (Decimal::ONE + commission);
        let actual = profit_ratio(&long, commission).unwrap();
        assert!((actual - expected).abs() < dec!(0.000000000000000000001));

        let short = trade(PositionSide::Short, dec!(100), dec!(80), 0);
        let expected_short = dec!(100) * dec!(1.0005) / (dec!(80) * dec!(0.9995));
        let actual_short = profit_ratio(&short, commission).unwrap();
        assert!((actual_short - expected_short).abs() < dec!(0.000000000000000000001));
        assert!(actual_short < dec!(1.25));
    }

    #[test]
    fn zero_prices_are_rejected_instead_of_dividing() {
        let position = trade(PositionSide::Short, dec!(100), Decimal::ZERO, 0);
        assert!(matches!(
            profit_ratio(&position, Decimal::ZERO),
            Err(BacktestError::InvalidTradePrice { .. })
        ));
    }

    #[test]
    fn equity_compounds_without_drift() {
        let series = equity_series(&[dec!(1.1), dec!(0.9), dec!(1.2)]).unwrap();
        assert_eq!(series, vec![dec!(1.1), dec!(0.99), dec!(1.188)]);
    }

    #[test]
    fn geometric_mean_matches_log_average() {
        let mean = geometric_mean(&[dec!(1.1), dec!(0.9), dec!(1.2)]).unwrap();
        let expected = ((1.1_f64.ln() + 0.9_f64.ln() + 1.2_f64.ln()) / 3.0).exp();
        assert!((mean - expected).abs() < 1e-9);
    }

    #[test]
    fn calculates_full_statistics_for_a_ledger() {
        let positions = vec![
            trade(PositionSide::Long, dec!(100), dec!(110), 0),
            trade(PositionSide::Long, dec!(100), dec!(90), 2),
            trade(PositionSide::Short, dec!(120), dec!(100), 4),
        ];

        let stats = PerformanceCalculator::calculate(&positions, Decimal::ZERO).unwrap();

        assert_eq!(stats.profit_ratios(), vec![dec!(1.1), dec!(0.9), dec!(1.2)]);
        assert_eq!(stats.twr, dec!(1.188));
        let mean = stats.arithmetic_mean.unwrap();
        let expected = dec!(1.0666666666666666666666666667);
        assert!((mean - expected).abs() < dec!(0.0000000000000000000001));
        assert_eq!(stats.winning_trades, 2);
        assert_eq!(stats.losing_trades, 1);
        assert_eq!(stats.max_drawdown_ratio, dec!(0.1));
        assert!(stats.is_profitable());

        let curve = stats.equity_curve();
        assert_eq!(curve[1], (positions[1].close_time, dec!(0.99)));

        let summary = stats.summary.unwrap();
        assert_eq!(summary.count, 3);
        assert!((summary.min - 0.9).abs() < 1e-9);
        assert!((summary.max - 1.2).abs() < 1e-9);
        assert!((summary.median - 1.1).abs() < 1e-9);
        assert!((summary.q25 - 1.0).abs() < 1e-9);
        assert!((summary.q75 - 1.15).abs() < 1e-9);
        assert!((summary.std.unwrap() - 0.152_752_523_165_194_8).abs() < 1e-9);
    }

    #[test]
    fn empty_ledger_has_unit_twr_and_no_means() {
        let stats = PerformanceCalculator::calculate(&[], dec!(0.0005)).unwrap();
        assert!(stats.trades.is_empty());
        assert_eq!(stats.twr, Decimal::ONE);
        assert_eq!(stats.arithmetic_mean, None);
        assert_eq!(stats.geometric_mean, None);
        assert!(stats.summary.is_none());
        assert!(!stats.is_profitable());
    }

    #[test]
    fn rejects_out_of_range_commission() {
        assert!(matches!(
            PerformanceCalculator::calculate(&[], dec!(1)),
            Err(BacktestError::Configuration(_))
        ));
        assert!(validate_commission_rate(dec!(-0.01)).is_err());
    }
}

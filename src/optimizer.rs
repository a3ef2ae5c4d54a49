use crate::backtester::Backtester;
use crate::config::BacktestSettings;
use crate::data_context::MarketData;
use crate::error::{BacktestError, BacktestResult};
use crate::param_utils::parameter_signature;
use crate::strategy::create_strategy;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, Clone, Serialize)]
pub struct SweepResult {
    pub parameters: HashMap<String, f64>,
    pub signature: String,
    pub twr: Decimal,
    pub geometric_mean: Option<f64>,
    pub max_drawdown_ratio: Decimal,
    pub trade_count: usize,
}

/// Grid search over one strategy template, one backtest per parameter set.
pub struct ParameterSweep<'a> {
    data: &'a MarketData,
    settings: BacktestSettings,
    template_id: String,
}

impl<'a> ParameterSweep<'a> {
    pub fn new(
        data: &'a MarketData,
        settings: BacktestSettings,
        template_id: impl Into<String>,
    ) -> Self {
        Self {
            data,
            settings: BacktestSettings {
                show_progress: false,
                ..settings
            },
            template_id: template_id.into(),
        }
    }

    /// Every (short, long) pair with short < long, as `ma_crossover` parameters.
    pub fn crossover_grid(
        short_windows: &[usize],
        long_windows: &[usize],
    ) -> Vec<HashMap<String, f64>> {
        let mut grid = Vec::new();
        for &short in short_windows {
            for &long in long_windows {
                if short == 0 || short >= long {
                    continue;
                }
                let mut params = HashMap::new();
                params.insert("shortWindow".to_string(), short as f64);
                params.insert("longWindow".to_string(), long as f64);
                grid.push(params);
            }
        }
        grid
    }

    /// Runs every parameter set in parallel and returns successful results
    /// ordered by TWR, best first. Failed runs are logged and skipped.
    pub fn run(
        &self,
        parameter_sets: &[HashMap<String, f64>],
        show_progress: bool,
    ) -> Vec<SweepResult> {
        let started_at = Instant::now();
        info!(
            "Sweeping {} parameter set(s) for {} on {}",
            parameter_sets.len(),
            self.template_id,
            self.data.ticker()
        );

        let pb = if show_progress {
            ProgressBar::new(parameter_sets.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }

        let mut results: Vec<SweepResult> = parameter_sets
            .par_iter()
            .filter_map(|params| {
                let outcome = self.evaluate(params);
                pb.inc(1);
                match outcome {
                    Ok(result) => Some(result),
                    Err(err) => {
                        warn!(
                            "Skipping {} [{}]: {}",
                            self.template_id,
                            parameter_signature(params),
                            err
                        );
                        None
                    }
                }
            })
            .collect();
        pb.finish_and_clear();

        results.sort_by(|a, b| b.twr.cmp(&a.twr).then_with(|| a.signature.cmp(&b.signature)));
        info!(
            "Sweep finished: {}/{} parameter set(s) succeeded in {:.2}s",
            results.len(),
            parameter_sets.len(),
            started_at.elapsed().as_secs_f64()
        );
        results
    }

    pub fn evaluate(&self, params: &HashMap<String, f64>) -> BacktestResult<SweepResult> {
        if !self.data.has_data() {
            return Err(BacktestError::InsufficientData {
                required: 2,
                available: 0,
            });
        }
        let mut strategy = create_strategy(&self.template_id, params.clone())?;
        let mut backtester = Backtester::from_market_data(self.data, self.settings.clone())?;
        let stats = backtester.run(strategy.as_mut())?;
        Ok(SweepResult {
            parameters: params.clone(),
            signature: parameter_signature(params),
            twr: stats.twr,
            geometric_mean: stats.geometric_mean,
            max_drawdown_ratio: stats.max_drawdown_ratio,
            trade_count: stats.trades.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Candle;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn zigzag_data() -> MarketData {
        let base = Utc.with_ymd_and_hms(2021, 1, 4, 0, 0, 0).unwrap();
        let closes =
            [10, 11, 12, 13, 12, 11, 10, 9, 10, 11, 12, 13, 14, 13, 12, 11, 10, 11, 12, 13];
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, close)| {
                let close = Decimal::from(*close);
                Candle {
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: dec!(1),
                    time: base + Duration::days(i as i64),
                }
            })
            .collect();
        MarketData::from_candles(candles).unwrap()
    }

    #[test]
    fn grid_skips_invalid_pairs() {
        let grid = ParameterSweep::crossover_grid(&[0, 2, 5], &[3, 5]);
        let signatures: Vec<String> = grid.iter().map(parameter_signature).collect();
        assert_eq!(
            signatures,
            vec!["longWindow=3,shortWindow=2", "longWindow=5,shortWindow=2"]
        );
    }

    #[test]
    fn results_are_ranked_by_twr_and_failures_skipped() {
        let data = zigzag_data();
        let sweep = ParameterSweep::new(&data, BacktestSettings::default(), "ma_crossover");
        let mut sets = ParameterSweep::crossover_grid(&[1, 2], &[3, 4]);
        let mut bad = HashMap::new();
        bad.insert("shortWindow".to_string(), 6.0);
        bad.insert("longWindow".to_string(), 4.0);
        sets.push(bad);

        let results = sweep.run(&sets, false);

        assert_eq!(results.len(), 4);
        assert!(results.windows(2).all(|pair| pair[0].twr >= pair[1].twr));
        assert!(results.iter().any(|result| result.trade_count > 0));
    }

    #[test]
    fn unknown_template_fails_evaluation() {
        let data = zigzag_data();
        let sweep = ParameterSweep::new(&data, BacktestSettings::default(), "nope");
        assert!(matches!(
            sweep.evaluate(&HashMap::new()),
            Err(BacktestError::Configuration(_))
        ));
    }
}

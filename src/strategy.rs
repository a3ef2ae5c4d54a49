use crate::error::{BacktestError, BacktestResult};
use crate::market::Market;
use crate::models::Candle;
use std::collections::HashMap;

/// A trading strategy driven one candle at a time.
///
/// `on_candle` must return before the next candle is delivered and may issue
/// at most one market operation; the simulated market rejects a second one.
pub trait Strategy {
    fn get_template_id(&self) -> &str;

    /// Called once before the first candle of a run.
    fn on_start(&mut self, _market: &dyn Market) -> BacktestResult<()> {
        Ok(())
    }

    fn on_candle(&mut self, candle: &Candle, market: &mut dyn Market) -> BacktestResult<()>;
}

/// Wraps a strategy for the duration of one run and refuses candles until
/// `start` has been called.
pub struct StrategyHost<'a> {
    strategy: &'a mut dyn Strategy,
    started: bool,
}

impl<'a> StrategyHost<'a> {
    pub fn new(strategy: &'a mut dyn Strategy) -> Self {
        Self {
            strategy,
            started: false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn start(&mut self, market: &dyn Market) -> BacktestResult<()> {
        self.strategy.on_start(market)?;
        self.started = true;
        Ok(())
    }

    pub fn on_candle(&mut self, candle: &Candle, market: &mut dyn Market) -> BacktestResult<()> {
        if !self.started {
            return Err(BacktestError::NotStarted {
                template_id: self.strategy.get_template_id().to_string(),
            });
        }
        self.strategy.on_candle(candle, market)
    }
}

#[path = "strategies/ma_crossover.rs"]
pub mod ma_crossover;

pub use ma_crossover::MaCrossoverStrategy;

#[path = "strategies/ordered_sma.rs"]
pub mod ordered_sma;

pub use ordered_sma::OrderedSmaStrategy;

pub const TEMPLATE_IDS: [&str; 2] = ["ma_crossover", "ordered_sma"];

pub fn create_strategy(
    template_id: &str,
    parameters: HashMap<String, f64>,
) -> BacktestResult<Box<dyn Strategy + Send + Sync>> {
    match template_id {
        "ma_crossover" => Ok(Box::new(MaCrossoverStrategy::new(parameters)?)),
        "ordered_sma" => Ok(Box::new(OrderedSmaStrategy::new(parameters)?)),
        _ => Err(BacktestError::Configuration(format!(
            "Unknown strategy template: {} (expected one of {})",
            template_id,
            TEMPLATE_IDS.join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::SimulatedMarket;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct CountingStrategy {
        starts: usize,
        candles: usize,
    }

    impl Strategy for CountingStrategy {
        fn get_template_id(&self) -> &str {
            "counting"
        }

        fn on_start(&mut self, _market: &dyn Market) -> BacktestResult<()> {
            self.starts += 1;
            Ok(())
        }

        fn on_candle(&mut self, _candle: &Candle, _market: &mut dyn Market) -> BacktestResult<()> {
            self.candles += 1;
            Ok(())
        }
    }

    fn candle() -> Candle {
        Candle {
            open: dec!(1),
            high: dec!(1),
            low: dec!(1),
            close: dec!(1),
            volume: dec!(100),
            time: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn candles_before_start_are_refused() {
        let mut strategy = CountingStrategy {
            starts: 0,
            candles: 0,
        };
        let mut market = SimulatedMarket::new("TEST", dec!(1000), Decimal::ZERO);
        {
            let mut host = StrategyHost::new(&mut strategy);
            assert_eq!(
                host.on_candle(&candle(), &mut market),
                Err(BacktestError::NotStarted {
                    template_id: "counting".to_string()
                })
            );

            host.start(&market).unwrap();
            assert!(host.is_started());
            host.on_candle(&candle(), &mut market).unwrap();
        }
        assert_eq!(strategy.starts, 1);
        assert_eq!(strategy.candles, 1);
    }

    #[test]
    fn factory_knows_both_templates() {
        for template_id in TEMPLATE_IDS {
            let strategy = create_strategy(template_id, HashMap::new()).unwrap();
            assert_eq!(strategy.get_template_id(), template_id);
        }
        assert!(matches!(
            create_strategy("rsi", HashMap::new()),
            Err(BacktestError::Configuration(_))
        ));
    }
}

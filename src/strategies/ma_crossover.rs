use crate::error::{BacktestError, BacktestResult};
use crate::indicators::{crossover_signal, SmaSign};
use crate::market::Market;
use crate::models::*;
use crate::param_utils::get_param_usize_rounded_clamped;
use crate::price_history::{PriceHistory, SmaPoint};
use std::collections::HashMap;

/// Upper bound for either window parameter.
pub const MAX_SMA_WINDOW: usize = 10_000;

/// Buys when the short SMA crosses above the long SMA and sells on the way
/// back down.
pub struct MaCrossoverStrategy {
    template_id: String,
    short_window: usize,
    long_window: usize,
    history: PriceHistory,
    last_sign: Option<SmaSign>,
}

impl MaCrossoverStrategy {
    pub fn new(parameters: HashMap<String, f64>) -> BacktestResult<Self> {
        let short_window =
            get_param_usize_rounded_clamped(&parameters, "shortWindow", 2, 0, MAX_SMA_WINDOW);
        let long_window =
            get_param_usize_rounded_clamped(&parameters, "longWindow", 10, 0, MAX_SMA_WINDOW);
        if short_window == 0 || short_window >= long_window {
            return Err(BacktestError::Configuration(format!(
                "shortWindow ({}) must be positive and below longWindow ({})",
                short_window, long_window
            )));
        }
        Ok(Self {
            template_id: "ma_crossover".to_string(),
            short_window,
            long_window,
            history: PriceHistory::new(long_window)?,
            last_sign: None,
        })
    }

    pub fn windows(&self) -> (usize, usize) {
        (self.short_window, self.long_window)
    }

    fn moving_averages(&self) -> BacktestResult<Option<(SmaPoint, SmaPoint)>> {
        let short = match self.history.sma(self.short_window) {
            Ok(point) => point,
            Err(err) if err.is_recoverable() => return Ok(None),
            Err(err) => return Err(err),
        };
        let long = match self.history.sma(self.long_window) {
            Ok(point) => point,
            Err(err) if err.is_recoverable() => return Ok(None),
            Err(err) => return Err(err),
        };
        Ok(Some((short, long)))
    }
}

impl super::Strategy for MaCrossoverStrategy {
    fn get_template_id(&self) -> &str {
        &self.template_id
    }

    fn on_start(&mut self, _market: &dyn Market) -> BacktestResult<()> {
        self.history = PriceHistory::new(self.long_window)?;
        self.last_sign = None;
        Ok(())
    }

    fn on_candle(&mut self, candle: &Candle, market: &mut dyn Market) -> BacktestResult<()> {
        self.history.add(candle.close, candle.time);

        let Some((short, long)) = self.moving_averages()? else {
            return Ok(());
        };
        let diff = short
            .value
            .checked_sub(long.value)
            .ok_or(BacktestError::Overflow("SMA difference"))?;
        let sign = SmaSign::of(diff);

        let Some(prev) = self.last_sign.replace(sign) else {
            return Ok(());
        };
        // Above -> Equal -> Above repeats a signal; the position already matches it.
        match (crossover_signal(prev, sign), market.open_side()) {
            (SignalAction::Buy, Some(PositionSide::Long)) => Ok(()),
            (SignalAction::Sell, Some(PositionSide::Short)) => Ok(()),
            (SignalAction::Buy, _) => market.buy(),
            (SignalAction::Sell, _) => market.sell(),
            (SignalAction::Hold, _) => Ok(()),
        }
    }
}

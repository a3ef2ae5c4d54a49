use crate::error::BacktestResult;
use crate::indicators::{sma_ordering, SmaOrdering};
use crate::market::Market;
use crate::models::*;
use crate::price_history::PriceHistory;
use rust_decimal::Decimal;
use std::collections::HashMap;

const SMA_WINDOWS: [usize; 4] = [2, 8, 14, 20];

/// Trades the stacking order of four SMAs.
///
/// Long entry:  SMA(2) > SMA(8) > SMA(14) > SMA(20), exit when SMA(2) < SMA(8).
/// Short entry: SMA(2) < SMA(8) < SMA(14) < SMA(20), exit when SMA(2) > SMA(8).
pub struct OrderedSmaStrategy {
    template_id: String,
    history: PriceHistory,
}

impl OrderedSmaStrategy {
    pub fn new(_parameters: HashMap<String, f64>) -> BacktestResult<Self> {
        Ok(Self {
            template_id: "ordered_sma".to_string(),
            history: PriceHistory::new(Self::longest_window())?,
        })
    }

    fn longest_window() -> usize {
        SMA_WINDOWS[SMA_WINDOWS.len() - 1]
    }

    fn moving_averages(&self) -> BacktestResult<[Decimal; 4]> {
        let mut values = [Decimal::ZERO; 4];
        for (slot, window) in values.iter_mut().zip(SMA_WINDOWS) {
            *slot = self.history.sma(window)?.value;
        }
        Ok(values)
    }
}

impl super::Strategy for OrderedSmaStrategy {
    fn get_template_id(&self) -> &str {
        &self.template_id
    }

    fn on_start(&mut self, _market: &dyn Market) -> BacktestResult<()> {
        self.history = PriceHistory::new(Self::longest_window())?;
        Ok(())
    }

    fn on_candle(&mut self, candle: &Candle, market: &mut dyn Market) -> BacktestResult<()> {
        self.history.add(candle.close, candle.time);
        if !self.history.is_full() {
            return Ok(());
        }

        let smas = self.moving_averages()?;
        let (fast, second) = (smas[0], smas[1]);

        match market.open_side() {
            None => match sma_ordering(&smas) {
                SmaOrdering::StrictlyDescending => market.open_position(PositionSide::Long),
                SmaOrdering::StrictlyAscending => market.open_position(PositionSide::Short),
                SmaOrdering::Mixed => Ok(()),
            },
            Some(PositionSide::Long) if fast < second => market.close_position(),
            Some(PositionSide::Short) if fast > second => market.close_position(),
            Some(_) => Ok(()),
        }
    }
}

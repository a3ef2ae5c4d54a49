use crate::config::BacktestSettings;
use crate::data_context::{validate_feed, MarketData};
use crate::error::{BacktestError, BacktestResult, BacktestState};
use crate::market::SimulatedMarket;
use crate::models::{Candle, ClosedPosition};
use crate::performance::{validate_commission_rate, BacktestStatistics, PerformanceCalculator};
use crate::strategy::{Strategy, StrategyHost};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::time::Instant;

/// Replays a candle feed through a strategy against a [`SimulatedMarket`].
///
/// A decision taken while looking at candle `i` is filled at candle `i + 1`'s
/// open, stamped with candle `i`'s time. The final candle has no successor to
/// fill against and is therefore never dispatched.
pub struct Backtester {
    candles: Vec<Candle>,
    market: SimulatedMarket,
    settings: BacktestSettings,
    state: BacktestState,
}

impl Backtester {
    /// Materializes the feed once so progress reporting knows its length.
    pub fn from_candles<I>(
        ticker: impl Into<String>,
        candles: I,
        settings: BacktestSettings,
    ) -> BacktestResult<Self>
    where
        I: IntoIterator<Item = Candle>,
    {
        let candles: Vec<Candle> = candles.into_iter().collect();
        validate_feed(&candles)?;
        let commission_rate = validate_commission_rate(settings.commission_rate)?;
        let market = SimulatedMarket::new(ticker, settings.initial_balance, commission_rate);

        Ok(Self {
            candles,
            market,
            settings,
            state: BacktestState::Idle,
        })
    }

    pub fn from_market_data(data: &MarketData, settings: BacktestSettings) -> BacktestResult<Self> {
        Self::from_candles(data.ticker(), data.candles().iter().cloned(), settings)
    }

    pub fn state(&self) -> BacktestState {
        self.state
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn market(&self) -> &SimulatedMarket {
        &self.market
    }

    pub fn settings(&self) -> &BacktestSettings {
        &self.settings
    }

    /// Closed trades in close order.
    pub fn positions(&self) -> &[ClosedPosition] {
        self.market.positions()
    }

    /// Number of `on_candle` calls a full run makes.
    pub fn dispatch_count(&self) -> usize {
        self.candles.len().saturating_sub(1)
    }

    pub fn run(&mut self, strategy: &mut dyn Strategy) -> BacktestResult<BacktestStatistics> {
        if self.state != BacktestState::Idle {
            return Err(BacktestError::NotComplete { state: self.state });
        }
        self.state = BacktestState::Running;

        match self.replay(strategy) {
            Ok(()) => {
                self.state = BacktestState::Complete;
                self.statistics()
            }
            Err(err) => {
                self.state = BacktestState::Failed;
                Err(err)
            }
        }
    }

    pub fn statistics(&self) -> BacktestResult<BacktestStatistics> {
        if self.state != BacktestState::Complete {
            return Err(BacktestError::NotComplete { state: self.state });
        }
        PerformanceCalculator::calculate(self.market.positions(), self.market.commission_rate())
    }

    fn replay(&mut self, strategy: &mut dyn Strategy) -> BacktestResult<()> {
        let started_at = Instant::now();
        let template_id = strategy.get_template_id().to_string();
        info!(
            "Backtesting {} on {} over {} candle(s)",
            template_id,
            self.market.ticker(),
            self.candles.len()
        );

        let mut host = StrategyHost::new(strategy);
        host.start(&self.market)?;

        let progress = self.progress_bar();
        for pair in self.candles.windows(2) {
            let (current, next) = (&pair[0], &pair[1]);
            self.market.advance_clock(current.time, next.open);
            host.on_candle(current, &mut self.market)?;
            progress.inc(1);
        }
        progress.finish_and_clear();

        if let Some(position) = self.market.current_position() {
            warn!(
                "Feed ended with an open {} position from {} at {}; \
                 it is not part of the trade ledger",
                position.side, position.open_time, position.open_price
            );
        }
        info!(
            "Backtest of {} finished: {} trade(s) in {:.2}s",
            template_id,
            self.market.positions().len(),
            started_at.elapsed().as_secs_f64()
        );
        Ok(())
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.settings.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(self.dispatch_count() as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

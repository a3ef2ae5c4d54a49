use crate::error::{BacktestError, BacktestResult};
use crate::models::{ClosedPosition, PortfolioItem, Position, PositionSide};
use crate::performance::profit_ratio;
use chrono::{DateTime, Utc};
use log::debug;
use rust_decimal::Decimal;

/// Market access as seen by a strategy: read the clock and holdings, open or
/// close the single position. A live broker adapter implements the same trait.
pub trait Market {
    fn current_time(&self) -> Option<DateTime<Utc>>;
    fn current_price(&self) -> Option<Decimal>;
    fn get_balance(&self) -> BacktestResult<Decimal>;
    fn get_portfolio(&self) -> Vec<PortfolioItem>;
    fn open_side(&self) -> Option<PositionSide>;
    fn open_position(&mut self, side: PositionSide) -> BacktestResult<()>;
    fn close_position(&mut self) -> BacktestResult<()>;

    /// Close an open short, otherwise go long.
    fn buy(&mut self) -> BacktestResult<()> {
        match self.open_side() {
            Some(PositionSide::Short) => self.close_position(),
            _ => self.open_position(PositionSide::Long),
        }
    }

    /// Close an open long, otherwise go short.
    fn sell(&mut self) -> BacktestResult<()> {
        match self.open_side() {
            Some(PositionSide::Long) => self.close_position(),
            _ => self.open_position(PositionSide::Short),
        }
    }
}

/// Time and fill price the replay loop sets before each dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketClock {
    pub time: DateTime<Utc>,
    pub price: Decimal,
}

/// In-memory market for backtests. Holds at most one open position and an
/// append-only ledger of closed ones.
#[derive(Debug, Clone)]
pub struct SimulatedMarket {
    ticker: String,
    initial_balance: Decimal,
    commission_rate: Decimal,
    clock: Option<MarketClock>,
    current_position: Option<Position>,
    positions: Vec<ClosedPosition>,
    operation_issued: bool,
}

impl SimulatedMarket {
    pub fn new(
        ticker: impl Into<String>,
        initial_balance: Decimal,
        commission_rate: Decimal,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            initial_balance,
            commission_rate,
            clock: None,
            current_position: None,
            positions: Vec::new(),
            operation_issued: false,
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn commission_rate(&self) -> Decimal {
        self.commission_rate
    }

    pub fn clock(&self) -> Option<MarketClock> {
        self.clock
    }

    pub fn current_position(&self) -> Option<&Position> {
        self.current_position.as_ref()
    }

    /// Closed trades in close order.
    pub fn positions(&self) -> &[ClosedPosition] {
        &self.positions
    }

    /// Moves the clock forward and re-arms the one-operation-per-candle guard.
    pub(crate) fn advance_clock(&mut self, time: DateTime<Utc>, price: Decimal) {
        self.clock = Some(MarketClock { time, price });
        self.operation_issued = false;
    }

    fn claim_operation(&self) -> BacktestResult<MarketClock> {
        let clock = self.clock.ok_or_else(|| {
            BacktestError::Configuration(
                "market operations require the replay clock to be set".to_string(),
            )
        })?;
        if self.operation_issued {
            return Err(BacktestError::OperationLimitExceeded { time: clock.time });
        }
        Ok(clock)
    }
}

impl Market for SimulatedMarket {
    fn current_time(&self) -> Option<DateTime<Utc>> {
        self.clock.map(|clock| clock.time)
    }

    fn current_price(&self) -> Option<Decimal> {
        self.clock.map(|clock| clock.price)
    }

    fn get_balance(&self) -> BacktestResult<Decimal> {
        let mut balance = self.initial_balance;
        for position in &self.positions {
            let ratio = profit_ratio(position, self.commission_rate)?;
            balance = balance
                .checked_mul(ratio)
                .ok_or(BacktestError::Overflow("balance"))?;
        }
        Ok(balance)
    }

    fn get_portfolio(&self) -> Vec<PortfolioItem> {
        self.current_position
            .iter()
            .map(|position| PortfolioItem {
                ticker: self.ticker.clone(),
                side: position.side,
                lots: match position.side {
                    PositionSide::Long => 1,
                    PositionSide::Short => -1,
                },
                average_price: position.open_price,
            })
            .collect()
    }

    fn open_side(&self) -> Option<PositionSide> {
        self.current_position.as_ref().map(|position| position.side)
    }

    fn open_position(&mut self, side: PositionSide) -> BacktestResult<()> {
        if let Some(current) = self.current_position.as_ref() {
            return Err(BacktestError::PositionAlreadyOpen { side: current.side });
        }
        let clock = self.claim_operation()?;

        self.current_position = Some(Position::open(side, clock.time, clock.price));
        self.operation_issued = true;
        debug!("Open {} position at {} ({})", side, clock.time, clock.price);
        Ok(())
    }

    fn close_position(&mut self) -> BacktestResult<()> {
        if self.current_position.is_none() {
            return Err(BacktestError::NoOpenPosition);
        }
        let clock = self.claim_operation()?;
        let position = self
            .current_position
            .take()
            .ok_or(BacktestError::NoOpenPosition)?;

        let closed = position.close(clock.time, clock.price);
        debug!(
            "Close {} position at {} ({})",
            closed.side, clock.time, clock.price
        );
        self.positions.push(closed);
        self.operation_issued = true;
        Ok(())
    }
}

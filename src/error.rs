use crate::models::PositionSide;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

/// Lifecycle of a [`crate::backtester::Backtester`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BacktestState {
    Idle,
    Running,
    Complete,
    Failed,
}

impl BacktestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BacktestState::Idle => "idle",
            BacktestState::Running => "running",
            BacktestState::Complete => "complete",
            BacktestState::Failed => "failed",
        }
    }
}

impl fmt::Display for BacktestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BacktestError {
    #[error("a {side} position is already open")]
    PositionAlreadyOpen { side: PositionSide },

    #[error("no open position to close")]
    NoOpenPosition,

    #[error("strategy `{template_id}` received a candle before on_start")]
    NotStarted { template_id: String },

    /// Statistics requested before completion, or `run` called on a backtest
    /// that has already left `Idle`.
    #[error("backtest is {state}, not a completed run")]
    NotComplete { state: BacktestState },

    #[error("more than one market operation issued for the candle at {time}")]
    OperationLimitExceeded { time: DateTime<Utc> },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("insufficient data: {required} samples required, {available} available")]
    InsufficientData { required: usize, available: usize },

    #[error("candle feed is not strictly ordered: {current} does not follow {previous}")]
    UnorderedFeed {
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error(
        "{side} trade opened at {open_time} has a non-positive price \
         (open {open_price}, close {close_price})"
    )]
    InvalidTradePrice {
        side: PositionSide,
        open_time: DateTime<Utc>,
        open_price: Decimal,
        close_price: Decimal,
    },

    #[error("decimal overflow while computing {0}")]
    Overflow(&'static str),
}

impl BacktestError {
    /// Caller mistakes that abort a run and are never retried.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            BacktestError::PositionAlreadyOpen { .. }
                | BacktestError::NoOpenPosition
                | BacktestError::NotStarted { .. }
                | BacktestError::NotComplete { .. }
                | BacktestError::OperationLimitExceeded { .. }
                | BacktestError::Configuration(_)
        )
    }

    /// Expected conditions a strategy should skip over rather than propagate.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BacktestError::InsufficientData { .. })
    }
}

pub type BacktestResult<T> = std::result::Result<T, BacktestError>;

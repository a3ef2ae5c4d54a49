use anyhow::{anyhow, Result as AnyResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OHLCV price bar. Prices and volume stay exact decimals end to end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "long",
            PositionSide::Short => "short",
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directional bet. Open positions carry no close stamps; once both are set
/// the position is final and only lives in the trade ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub side: PositionSide,
    pub open_time: DateTime<Utc>,
    pub open_price: Decimal,
    pub close_time: Option<DateTime<Utc>>,
    pub close_price: Option<Decimal>,
}

impl Position {
    pub fn open(side: PositionSide, time: DateTime<Utc>, price: Decimal) -> Self {
        Self {
            side,
            open_time: time,
            open_price: price,
            close_time: None,
            close_price: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.close_time.is_some() && self.close_price.is_some()
    }

    pub(crate) fn close(self, time: DateTime<Utc>, price: Decimal) -> ClosedPosition {
        ClosedPosition {
            side: self.side,
            open_time: self.open_time,
            open_price: self.open_price,
            close_time: time,
            close_price: price,
        }
    }
}

impl From<ClosedPosition> for Position {
    fn from(closed: ClosedPosition) -> Self {
        Self {
            side: closed.side,
            open_time: closed.open_time,
            open_price: closed.open_price,
            close_time: Some(closed.close_time),
            close_price: Some(closed.close_price),
        }
    }
}

/// Ledger entry for a completed trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub side: PositionSide,
    pub open_time: DateTime<Utc>,
    pub open_price: Decimal,
    pub close_time: DateTime<Utc>,
    pub close_price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "USD")]
    Usd,
    #[serde(rename = "RUB")]
    Rub,
    #[serde(rename = "EUR")]
    Eur,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Rub => "RUB",
            Currency::Eur => "EUR",
        }
    }
}

impl FromStr for Currency {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> AnyResult<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "RUB" => Ok(Currency::Rub),
            "EUR" => Ok(Currency::Eur),
            other => Err(anyhow!("Unknown currency: {}", other)),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candle bucket size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1min")]
    Min1,
    #[serde(rename = "5min")]
    Min5,
    #[serde(rename = "10min")]
    Min10,
    #[serde(rename = "30min")]
    Min30,
    #[serde(rename = "hour")]
    Hour1,
    #[serde(rename = "day")]
    Day1,
    #[serde(rename = "week")]
    Week1,
    #[serde(rename = "month")]
    Month1,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Min1 => "1min",
            Interval::Min5 => "5min",
            Interval::Min10 => "10min",
            Interval::Min30 => "30min",
            Interval::Hour1 => "hour",
            Interval::Day1 => "day",
            Interval::Week1 => "week",
            Interval::Month1 => "month",
        }
    }
}

impl FromStr for Interval {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> AnyResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1min" => Ok(Interval::Min1),
            "5min" => Ok(Interval::Min5),
            "10min" => Ok(Interval::Min10),
            "30min" => Ok(Interval::Min30),
            "hour" => Ok(Interval::Hour1),
            "day" => Ok(Interval::Day1),
            "week" => Ok(Interval::Week1),
            "month" => Ok(Interval::Month1),
            other => Err(anyhow!("Unknown candle interval: {}", other)),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,
    pub ticker: String,
    pub figi: String,
    pub currency: Currency,
}

/// One holding as reported by a market facade. `lots` is signed: positive
/// for long exposure, negative for short.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioItem {
    pub ticker: String,
    pub side: PositionSide,
    pub lots: i64,
    pub average_price: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn closing_a_position_stamps_exit() {
        let open_time = Utc.with_ymd_and_hms(2021, 3, 1, 10, 0, 0).unwrap();
        let close_time = Utc.with_ymd_and_hms(2021, 3, 2, 10, 0, 0).unwrap();
        let position = Position::open(PositionSide::Short, open_time, dec!(101.5));
        assert!(!position.is_closed());

        let closed = position.close(close_time, dec!(99.25));
        assert_eq!(closed.side, PositionSide::Short);
        assert_eq!(closed.open_price, dec!(101.5));
        assert_eq!(closed.close_time, close_time);
        assert_eq!(closed.close_price, dec!(99.25));

        let as_position: Position = closed.into();
        assert!(as_position.is_closed());
    }

    #[test]
    fn interval_and_currency_round_trip_through_strings() {
        for interval in [Interval::Min1, Interval::Hour1, Interval::Month1] {
            assert_eq!(interval.as_str().parse::<Interval>().unwrap(), interval);
        }
        assert_eq!("rub".parse::<Currency>().unwrap(), Currency::Rub);
        assert!("2min".parse::<Interval>().is_err());
    }

    #[test]
    fn position_side_serializes_lowercase() {
        let json = serde_json::to_string(&PositionSide::Long).unwrap();
        assert_eq!(json, "\"long\"");
    }
}

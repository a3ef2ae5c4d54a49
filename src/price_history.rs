use crate::error::{BacktestError, BacktestResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceSample {
    pub time: DateTime<Utc>,
    pub price: Decimal,
}

/// Moving average value stamped with the time of the newest sample it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmaPoint {
    pub time: DateTime<Utc>,
    pub value: Decimal,
}

/// Rolling window over the most recent `capacity` closing prices.
///
/// Samples grow up to `capacity`; once full `head` points at the oldest slot,
/// which the next `add` overwrites.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    capacity: usize,
    samples: Vec<PriceSample>,
    head: usize,
}

impl PriceHistory {
    pub fn new(capacity: usize) -> BacktestResult<Self> {
        if capacity == 0 {
            return Err(BacktestError::Configuration(
                "price history capacity must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            capacity,
            samples: Vec::new(),
            head: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn add(&mut self, price: Decimal, time: DateTime<Utc>) {
        let sample = PriceSample { time, price };
        if self.samples.len() < self.capacity {
            self.samples.push(sample);
        } else {
            self.samples[self.head] = sample;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    pub fn latest(&self) -> Option<&PriceSample> {
        self.nth_oldest(self.samples.len().checked_sub(1)?)
    }

    /// Samples from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &PriceSample> + '_ {
        (0..self.samples.len()).filter_map(move |offset| self.nth_oldest(offset))
    }

    /// Arithmetic mean of the newest `window` prices.
    pub fn sma(&self, window: usize) -> BacktestResult<SmaPoint> {
        if window == 0 || window > self.capacity {
            return Err(BacktestError::Configuration(format!(
                "SMA window {} must be between 1 and the history capacity {}",
                window, self.capacity
            )));
        }
        let len = self.samples.len();
        if window > len {
            return Err(BacktestError::InsufficientData {
                required: window,
                available: len,
            });
        }

        let mut sum = Decimal::ZERO;
        for offset in len - window..len {
            let sample = self
                .nth_oldest(offset)
                .ok_or(BacktestError::InsufficientData {
                    required: window,
                    available: len,
                })?;
            sum = sum
                .checked_add(sample.price)
                .ok_or(BacktestError::Overflow("moving average sum"))?;
        }
        let value = sum
            .checked_div(Decimal::from(window))
            .ok_or(BacktestError::Overflow("moving average"))?;
        let time = self
            .latest()
            .map(|sample| sample.time)
            .ok_or(BacktestError::InsufficientData {
                required: window,
                available: len,
            })?;

        Ok(SmaPoint { time, value })
    }

    fn nth_oldest(&self, offset: usize) -> Option<&PriceSample> {
        let len = self.samples.len();
        if offset >= len {
            return None;
        }
        self.samples.get((self.head + offset) % len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 6, 1, 10, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    #[test]
    fn sma_over_full_window_and_after_eviction() {
        let mut history = PriceHistory::new(3).unwrap();
        history.add(dec!(10), at(0));
        history.add(dec!(20), at(1));
        history.add(dec!(30), at(2));

        let sma = history.sma(3).unwrap();
        assert_eq!(sma.value, dec!(20));
        assert_eq!(sma.time, at(2));

        history.add(dec!(40), at(3));
        assert_eq!(history.len(), 3);
        assert_eq!(history.sma(3).unwrap().value, dec!(30));
        assert_eq!(history.sma(3).unwrap().time, at(3));

        assert!(matches!(
            history.sma(4),
            Err(BacktestError::Configuration(_))
        ));
    }

    #[test]
    fn sma_reports_insufficient_data_before_window_fills() {
        let mut history = PriceHistory::new(5).unwrap();
        history.add(dec!(1), at(0));
        history.add(dec!(2), at(1));

        let err = history.sma(3).unwrap_err();
        assert_eq!(
            err,
            BacktestError::InsufficientData {
                required: 3,
                available: 2
            }
        );
        assert!(err.is_recoverable());
        assert_eq!(history.sma(2).unwrap().value, dec!(1.5));
    }

    #[test]
    fn iterates_oldest_first_across_wraparound() {
        let mut history = PriceHistory::new(3).unwrap();
        for (i, price) in [dec!(1), dec!(2), dec!(3), dec!(4), dec!(5)]
            .into_iter()
            .enumerate()
        {
            history.add(price, at(i as i64));
        }

        let prices: Vec<Decimal> = history.iter().map(|s| s.price).collect();
        assert_eq!(prices, vec![dec!(3), dec!(4), dec!(5)]);
        assert_eq!(history.latest().unwrap().time, at(4));
        assert_eq!(history.sma(2).unwrap().value, dec!(4.5));
    }

    #[test]
    fn huge_capacity_does_not_allocate_up_front() {
        let mut history = PriceHistory::new(usize::MAX).unwrap();
        history.add(dec!(7), at(0));
        assert_eq!(history.len(), 1);
        assert!(!history.is_full());
    }

    #[test]
    fn rejects_zero_capacity_and_zero_window() {
        assert!(PriceHistory::new(0).is_err());
        let history = PriceHistory::new(2).unwrap();
        assert!(matches!(
            history.sma(0),
            Err(BacktestError::Configuration(_))
        ));
    }
}

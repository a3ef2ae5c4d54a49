use crate::models::SignalAction;
use rust_decimal::Decimal;
use std::cmp::Ordering;

/// Side of the short SMA relative to the long SMA. `Equal` is a state of its
/// own so a crossing that passes through zero is resolved by the next sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmaSign {
    Below,
    Equal,
    Above,
}

impl SmaSign {
    pub fn of(diff: Decimal) -> Self {
        match diff.cmp(&Decimal::ZERO) {
            Ordering::Less => SmaSign::Below,
            Ordering::Equal => SmaSign::Equal,
            Ordering::Greater => SmaSign::Above,
        }
    }
}

/// Buy on an upward crossing, sell on a downward one.
///
/// | prev  | last  | action |
/// |-------|-------|--------|
/// | Below | Above | Buy    |
/// | Equal | Above | Buy    |
/// | Above | Below | Sell   |
/// | Equal | Below | Sell   |
/// | any   | Equal | Hold   |
/// | same  | same  | Hold   |
pub fn crossover_signal(prev: SmaSign, last: SmaSign) -> SignalAction {
    match (prev, last) {
        (SmaSign::Below | SmaSign::Equal, SmaSign::Above) => SignalAction::Buy,
        (SmaSign::Above | SmaSign::Equal, SmaSign::Below) => SignalAction::Sell,
        _ => SignalAction::Hold,
    }
}

/// How a set of SMAs, listed from the shortest window to the longest, is stacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmaOrdering {
    /// Every shorter SMA strictly above the next longer one.
    StrictlyDescending,
    /// Every shorter SMA strictly below the next longer one.
    StrictlyAscending,
    Mixed,
}

pub fn sma_ordering(values: &[Decimal]) -> SmaOrdering {
    if values.len() < 2 {
        return SmaOrdering::Mixed;
    }
    if values.windows(2).all(|pair| pair[0] > pair[1]) {
        SmaOrdering::StrictlyDescending
    } else if values.windows(2).all(|pair| pair[0] < pair[1]) {
        SmaOrdering::StrictlyAscending
    } else {
        SmaOrdering::Mixed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn sign_of_difference() {
        assert_eq!(SmaSign::of(dec!(-0.01)), SmaSign::Below);
        assert_eq!(SmaSign::of(dec!(0)), SmaSign::Equal);
        assert_eq!(SmaSign::of(dec!(10.5) - dec!(10.25)), SmaSign::Above);
    }

    #[test]
    fn crossings_through_zero_resolve_on_the_current_sign() {
        use SmaSign::*;
        assert_eq!(crossover_signal(Below, Above), SignalAction::Buy);
        assert_eq!(crossover_signal(Above, Below), SignalAction::Sell);
        assert_eq!(crossover_signal(Equal, Above), SignalAction::Buy);
        assert_eq!(crossover_signal(Equal, Below), SignalAction::Sell);
        assert_eq!(crossover_signal(Below, Equal), SignalAction::Hold);
        assert_eq!(crossover_signal(Above, Equal), SignalAction::Hold);
        assert_eq!(crossover_signal(Equal, Equal), SignalAction::Hold);
        assert_eq!(crossover_signal(Above, Above), SignalAction::Hold);
    }

    #[test]
    fn ordering_requires_strict_inequalities() {
        assert_eq!(
            sma_ordering(&[dec!(4), dec!(3), dec!(2), dec!(1)]),
            SmaOrdering::StrictlyDescending
        );
        assert_eq!(
            sma_ordering(&[dec!(1), dec!(2), dec!(3), dec!(4)]),
            SmaOrdering::StrictlyAscending
        );
        assert_eq!(
            sma_ordering(&[dec!(4), dec!(3), dec!(3), dec!(1)]),
            SmaOrdering::Mixed
        );
        assert_eq!(sma_ordering(&[dec!(1)]), SmaOrdering::Mixed);
    }
}

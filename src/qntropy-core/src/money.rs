//! Rounding policy for EUR values at reporting boundaries.

use rust_decimal::{Decimal, RoundingStrategy};

/// Round half-even to 2 fractional digits. Used only at reporting boundaries (CSV serialization);
/// internal computation keeps full precision.
pub fn round_eur(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// Absolute-value comparison against a tolerance, used throughout the reconciler and the
/// lot-sum-equals-balance invariant check.
pub fn within_tolerance(value: Decimal, tolerance: Decimal) -> bool {
    value.abs() <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_half_to_even() {
        assert_eq!(round_eur(dec!(1.005)), dec!(1.00));
        assert_eq!(round_eur(dec!(1.015)), dec!(1.02));
        assert_eq!(round_eur(dec!(2.675)), dec!(2.68));
    }

    #[test]
    fn tolerance_is_symmetric() {
        assert!(within_tolerance(dec!(-0.0000001), dec!(0.00001)));
        assert!(!within_tolerance(dec!(0.01), dec!(0.00001)));
    }
}

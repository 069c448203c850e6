// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fixed-precision monetary math.
//!
//! All monetary amounts are [`Decimal`]; binary floats never accumulate
//! money. Rounding is half-away-from-zero to two fractional digits.

use rust_decimal::{Decimal, RoundingStrategy};

/// Round a monetary amount to 2 fractional digits, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Total for a line item: `unit_price * quantity`, rounded to 2 digits.
pub fn line_total(unit_price: Decimal, quantity: u32) -> Decimal {
    round_money(unit_price * Decimal::from(quantity))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn rounds_half_away_from_zero() {
        // Banker's rounding would give 2.50 / -2.50 here.
        assert_eq!(round_money(dec("2.505")), dec("2.51"));
        assert_eq!(round_money(dec("-2.505")), dec("-2.51"));
        assert_eq!(round_money(dec("2.515")), dec("2.52"));
    }

    #[test]
    fn line_total_basic() {
        assert_eq!(line_total(dec("2.50"), 2), dec("5.00"));
        assert_eq!(line_total(dec("0.333"), 3), dec("1.00"));
        assert_eq!(line_total(dec("19.99"), 0), dec("0.00"));
    }

    #[test]
    fn round_is_idempotent() {
        let v = round_money(dec("10.987"));
        assert_eq!(round_money(v), v);
    }

    proptest! {
        #[test]
        fn rounded_values_have_at_most_two_decimals(cents in -1_000_000i64..1_000_000, qty in 0u32..1000) {
            let unit = Decimal::new(cents, 3); // three-decimal input prices
            let total = line_total(unit, qty);
            prop_assert!(total.scale() <= 2);
        }

        #[test]
        fn line_total_matches_integer_arithmetic_for_clean_prices(cents in 0i64..100_000, qty in 0u32..1000) {
            // Prices already at 2 decimals never need rounding.
            let unit = Decimal::new(cents, 2);
            let total = line_total(unit, qty);
            prop_assert_eq!(total, unit * Decimal::from(qty));
        }
    }
}

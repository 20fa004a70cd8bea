//! Money helpers
//!
//! All amounts are `Decimal`; the turnover counter works in integer cents.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Round half away from zero to two decimal places
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Amount in whole cents, `None` if it does not fit into `i64`
pub fn to_cents(value: Decimal) -> Option<i64> {
    (round2(value) * Decimal::ONE_HUNDRED).to_i64()
}

pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Net amount of a gross amount with `tax` percent included
pub fn net_from_gross(gross: Decimal, tax: Decimal) -> Decimal {
    round2(gross * Decimal::ONE_HUNDRED / (Decimal::ONE_HUNDRED + tax))
}

/// Format with two decimals and a decimal comma ("1234,50")
pub fn format_amount(value: Decimal) -> String {
    format!("{:.2}", round2(value)).replace('.', ",")
}

/// Format for the machine-readable code ("1234.50")
pub fn format_code_amount(value: Decimal) -> String {
    format!("{:.2}", round2(value))
}

/// Parse a canonical decimal as stored in TEXT columns
pub fn parse_amount(text: &str) -> Option<Decimal> {
    text.trim().parse::<Decimal>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_round2_half_away_from_zero() {
        assert_eq!(round2(Decimal::from_str("1.005").unwrap()), Decimal::from_str("1.01").unwrap());
        assert_eq!(round2(Decimal::from_str("-1.005").unwrap()), Decimal::from_str("-1.01").unwrap());
    }

    #[test]
    fn test_cents() {
        assert_eq!(to_cents(Decimal::from_str("12.34").unwrap()), Some(1234));
        assert_eq!(to_cents(Decimal::from_str("-0.5").unwrap()), Some(-50));
        assert_eq!(from_cents(-12345), Decimal::from_str("-123.45").unwrap());
    }

    #[test]
    fn test_net_from_gross() {
        assert_eq!(
            net_from_gross(Decimal::from_str("12.00").unwrap(), Decimal::from(20)),
            Decimal::from_str("10.00").unwrap()
        );
        assert_eq!(
            net_from_gross(Decimal::from_str("5.00").unwrap(), Decimal::ZERO),
            Decimal::from_str("5.00").unwrap()
        );
    }

    #[test]
    fn test_format() {
        assert_eq!(format_amount(Decimal::from_str("3.5").unwrap()), "3,50");
        assert_eq!(format_code_amount(Decimal::ZERO), "0.00");
        assert_eq!(format_code_amount(Decimal::from_str("-7.1").unwrap()), "-7.10");
        assert_eq!(parse_amount(" 4.20 "), Some(Decimal::from_str("4.20").unwrap()));
        assert_eq!(parse_amount("abc"), None);
    }
}

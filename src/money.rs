//! Monetary arithmetic.
//!
//! Prices and totals are integer minor units (the `_q` suffix everywhere else in
//! this crate). Quantities are decimals with at most three fractional digits.
//! `multiply` is the single primitive used for every line total so that
//! `sum(line totals) == order total` holds bitwise.

use rust_decimal::prelude::*;
use rust_decimal::RoundingStrategy;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("qty must have at most 3 fractional digits")]
    TooManyFractionalDigits,
    #[error("qty must be positive")]
    NonPositiveQty,
    #[error("amount overflowed i64 minor units")]
    Overflow,
}

/// Multiplies a quantity (≤3 fractional digits) by a unit price in minor units,
/// rounding half-to-even to the nearest integer minor unit.
pub fn multiply(qty: Decimal, unit_price_q: i64) -> Result<i64, MoneyError> {
    if qty.scale() > 3 {
        return Err(MoneyError::TooManyFractionalDigits);
    }
    if qty <= Decimal::ZERO {
        return Err(MoneyError::NonPositiveQty);
    }

    let price = Decimal::from(unit_price_q);
    let raw = qty * price;
    let rounded = raw.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven);
    rounded.to_i64().ok_or(MoneyError::Overflow)
}

/// Parses a caller-supplied qty from any source-convertible numeric JSON value,
/// enforcing the > 0 and ≤3-fractional-digit rules used throughout the engines.
pub fn parse_qty(value: &serde_json::Value) -> Result<Decimal, MoneyError> {
    let qty = match value {
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Decimal::from(i)
            } else if let Some(f) = n.as_f64() {
                Decimal::from_f64(f).ok_or(MoneyError::NonPositiveQty)?
            } else {
                return Err(MoneyError::NonPositiveQty);
            }
        }
        serde_json::Value::String(s) => {
            Decimal::from_str(s).map_err(|_| MoneyError::NonPositiveQty)?
        }
        _ => return Err(MoneyError::NonPositiveQty),
    };

    if qty.scale() > 3 {
        return Err(MoneyError::TooManyFractionalDigits);
    }
    if qty <= Decimal::ZERO {
        return Err(MoneyError::NonPositiveQty);
    }
    Ok(qty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_multiply() {
        assert_eq!(multiply(Decimal::new(2, 0), 500).unwrap(), 1000);
    }

    #[test]
    fn half_even_rounds_to_even_neighbor() {
        // 0.5 rounds to 0 (even), 1.5 rounds to 2 (even), 2.5 rounds to 2 (even).
        assert_eq!(multiply(Decimal::new(5, 1), 1).unwrap(), 0);
        assert_eq!(multiply(Decimal::new(15, 1), 1).unwrap(), 2);
        assert_eq!(multiply(Decimal::new(25, 1), 1).unwrap(), 2);
    }

    #[test]
    fn rejects_too_many_fractional_digits() {
        let qty = Decimal::new(1234, 4);
        assert_eq!(
            multiply(qty, 100).unwrap_err(),
            MoneyError::TooManyFractionalDigits
        );
    }

    #[test]
    fn rejects_non_positive_qty() {
        assert_eq!(
            multiply(Decimal::ZERO, 100).unwrap_err(),
            MoneyError::NonPositiveQty
        );
        assert_eq!(
            multiply(Decimal::new(-1, 0), 100).unwrap_err(),
            MoneyError::NonPositiveQty
        );
    }

    #[test]
    fn line_totals_sum_to_order_total() {
        let lines = [(Decimal::new(2, 0), 500i64), (Decimal::new(3, 0), 333i64)];
        let totals: Vec<i64> = lines
            .iter()
            .map(|(qty, price)| multiply(*qty, *price).unwrap())
            .collect();
        let sum: i64 = totals.iter().sum();
        assert_eq!(sum, 1000 + 999);
    }

    #[test]
    fn parse_qty_from_json_number_and_string() {
        assert_eq!(
            parse_qty(&serde_json::json!(2)).unwrap(),
            Decimal::new(2, 0)
        );
        assert_eq!(
            parse_qty(&serde_json::json!("1.5")).unwrap(),
            Decimal::new(15, 1)
        );
        assert!(parse_qty(&serde_json::json!(0)).is_err());
        assert!(parse_qty(&serde_json::json!("-1")).is_err());
    }
}

//! Decimal arithmetic utilities for financial calculations.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// Round a price down to the market tick size (bids never cross upward).
pub fn floor_to_tick(value: Decimal, tick_size: Decimal) -> Decimal {
    if tick_size <= Decimal::ZERO {
        return value;
    }
    (value / tick_size).floor() * tick_size
}

/// Round a price up to the market tick size (asks never cross downward).
pub fn ceil_to_tick(value: Decimal, tick_size: Decimal) -> Decimal {
    if tick_size <= Decimal::ZERO {
        return value;
    }
    (value / tick_size).ceil() * tick_size
}

/// Round down to lot size (quantity precision).
pub fn round_down_to_lot(value: Decimal, lot_size: Decimal) -> Decimal {
    if lot_size <= Decimal::ZERO {
        return value;
    }
    (value / lot_size).floor() * lot_size
}

/// Safe division that returns zero if divisor is zero.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

/// `10^decimals` as a decimal scale factor.
pub fn pow10(decimals: u8) -> Decimal {
    let mut scale = Decimal::ONE;
    for _ in 0..decimals {
        scale *= Decimal::TEN;
    }
    scale
}

/// Convert a raw on-chain token amount to a human-readable amount.
pub fn raw_to_readable(raw: u64, decimals: u8) -> Decimal {
    Decimal::from(raw) / pow10(decimals)
}

/// Convert a human-readable amount to raw token units, rounded to the nearest unit.
///
/// Negative or unrepresentable amounts map to zero.
pub fn readable_to_raw(amount: Decimal, decimals: u8) -> u64 {
    if amount <= Decimal::ZERO {
        return 0;
    }
    (amount * pow10(decimals)).round().to_u64().unwrap_or(0)
}

/// Lossy conversion for the floating-point tick math.
pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Convert back from floating point; NaN and infinities become `None`.
pub fn from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_f64(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_tick_rounding_direction() {
        assert_eq!(floor_to_tick(dec!(1.2345), dec!(0.01)), dec!(1.23));
        assert_eq!(ceil_to_tick(dec!(1.2345), dec!(0.01)), dec!(1.24));
        assert_eq!(ceil_to_tick(dec!(1.23), dec!(0.01)), dec!(1.23));
        assert_eq!(floor_to_tick(dec!(1.2345), Decimal::ZERO), dec!(1.2345));
    }

    #[test]
    fn test_round_down_to_lot() {
        assert_eq!(round_down_to_lot(dec!(1.567), dec!(0.001)), dec!(1.567));
        assert_eq!(round_down_to_lot(dec!(1.567), dec!(0.01)), dec!(1.56));
        assert_eq!(round_down_to_lot(dec!(1.567), dec!(0.1)), dec!(1.5));
    }

    #[test]
    fn test_raw_amount_conversion() {
        assert_eq!(raw_to_readable(1_500_000, 6), dec!(1.5));
        assert_eq!(readable_to_raw(dec!(1.5), 6), 1_500_000);
        assert_eq!(readable_to_raw(dec!(-3), 6), 0);
        assert_eq!(pow10(0), Decimal::ONE);
    }

    #[test]
    fn test_from_f64_rejects_non_finite() {
        assert!(from_f64(f64::NAN).is_none());
        assert!(from_f64(f64::INFINITY).is_none());
        assert_eq!(from_f64(0.5), Some(dec!(0.5)));
    }

    #[test]
    fn test_safe_div() {
        assert_eq!(safe_div(dec!(10), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(safe_div(dec!(10), dec!(4)), dec!(2.5));
    }
}

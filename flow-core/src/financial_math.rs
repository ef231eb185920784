//! Stateless fixed-precision decimal arithmetic.
//!
//! Every function here operates on [`rust_decimal::Decimal`], never `f64`:
//! ratio, sum, and comparison operations that feed a threshold must not lose
//! precision to binary floating point. Partial operations (division by
//! zero, statistics over an empty sample) return `None` rather than
//! substituting a default — callers must decide, and propagating `None`
//! through a detector's evaluation chain is what yields a clean
//! `insufficient_data` rejection instead of a crash or a silently wrong
//! zero.

use rust_decimal::Decimal;

/// Adds two quantities, returning `None` on overflow rather than panicking.
#[inline]
pub fn safe_add(a: Decimal, b: Decimal) -> Option<Decimal> {
    a.checked_add(b)
}

/// Multiplies two quantities (e.g. price * volume), returning `None` on
/// overflow.
#[inline]
pub fn multiply_quantities(a: Decimal, b: Decimal) -> Option<Decimal> {
    a.checked_mul(b)
}

/// Divides `a` by `b`, returning `None` when `b` is zero rather than
/// producing an infinity or NaN sentinel.
#[inline]
pub fn divide_quantities(a: Decimal, b: Decimal) -> Option<Decimal> {
    if b.is_zero() {
        None
    } else {
        a.checked_div(b)
    }
}

/// Absolute spread between two prices, rounded to `decimals` fractional
/// digits.
#[inline]
pub fn calculate_spread(p1: Decimal, p2: Decimal, decimals: u32) -> Decimal {
    (p1 - p2).abs().round_dp(decimals)
}

/// Arithmetic mean of a sample set. `None` when the input is empty — the
/// caller must propagate the absence, not substitute zero.
pub fn calculate_mean(xs: &[Decimal]) -> Option<Decimal> {
    if xs.is_empty() {
        return None;
    }
    let sum: Decimal = xs.iter().copied().sum();
    sum.checked_div(Decimal::from(xs.len() as u64))
}

/// Population standard deviation. `None` when the input is empty; returns
/// `Some(Decimal::ZERO)` for a single-element sample (zero variance).
pub fn calculate_std_dev(xs: &[Decimal]) -> Option<Decimal> {
    let mean = calculate_mean(xs)?;
    let variance_sum: Decimal = xs
        .iter()
        .map(|x| {
            let d = *x - mean;
            d * d
        })
        .sum();
    let variance = variance_sum.checked_div(Decimal::from(xs.len() as u64))?;
    variance.sqrt()
}

/// Midpoint between bid and ask, rounded to `decimals` fractional digits.
#[inline]
pub fn calculate_mid_price(bid: Decimal, ask: Decimal, decimals: u32) -> Decimal {
    ((bid + ask) / Decimal::TWO).round_dp(decimals)
}

/// Absolute value. Thin wrapper kept for parity with the rest of the
/// FinancialMath surface so callers never reach for `Decimal::abs` directly
/// and risk mixing in a float-based `abs` elsewhere.
#[inline]
pub fn calculate_abs(x: Decimal) -> Decimal {
    x.abs()
}

/// Rounds a price down to the nearest multiple of `tick_size`.
///
/// Used both to validate inbound trade prices (§4.4) and to compute zone
/// identifiers (§4.3): `floor(price / (tick_size * zone_ticks)) * tick_size
/// * zone_ticks` is exactly `align_to_tick(price, tick_size * zone_ticks)`.
pub fn align_to_tick(price: Decimal, tick_size: Decimal) -> Decimal {
    if tick_size.is_zero() {
        return price;
    }
    let units = (price / tick_size).floor();
    units * tick_size
}

/// True when `price` is an exact multiple of `tick_size`.
pub fn is_tick_aligned(price: Decimal, tick_size: Decimal) -> bool {
    if tick_size.is_zero() {
        return true;
    }
    let remainder = price % tick_size;
    remainder.is_zero()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn divide_by_zero_is_none() {
        assert_eq!(divide_quantities(dec!(10), dec!(0)), None);
    }

    #[test]
    fn divide_quantities_basic() {
        assert_eq!(divide_quantities(dec!(10), dec!(4)), Some(dec!(2.5)));
    }

    #[test]
    fn mean_of_empty_is_none() {
        assert_eq!(calculate_mean(&[]), None);
    }

    #[test]
    fn mean_basic() {
        let xs = [dec!(1), dec!(2), dec!(3)];
        assert_eq!(calculate_mean(&xs), Some(dec!(2)));
    }

    #[test]
    fn std_dev_of_constant_sample_is_zero() {
        let xs = [dec!(5), dec!(5), dec!(5)];
        assert_eq!(calculate_std_dev(&xs), Some(dec!(0)));
    }

    #[test]
    fn std_dev_of_empty_is_none() {
        assert_eq!(calculate_std_dev(&[]), None);
    }

    #[test]
    fn mid_price_basic() {
        assert_eq!(calculate_mid_price(dec!(100.00), dec!(100.02), 2), dec!(100.01));
    }

    #[test]
    fn align_to_tick_floors_towards_lower_multiple() {
        assert_eq!(align_to_tick(dec!(100.017), dec!(0.01)), dec!(100.01));
        assert_eq!(align_to_tick(dec!(100.00), dec!(0.01)), dec!(100.00));
    }

    #[test]
    fn tick_alignment_check() {
        assert!(is_tick_aligned(dec!(100.01), dec!(0.01)));
        assert!(!is_tick_aligned(dec!(100.015), dec!(0.01)));
    }

    #[test]
    fn safe_add_overflow_is_none() {
        assert_eq!(safe_add(Decimal::MAX, dec!(1)), None);
    }
}

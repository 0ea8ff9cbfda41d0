//! Overflow-aware product reduction over a vector of `f32` values.
//!
//! Every vector a client sends is reduced to a single value: the product of
//! its elements. When the product leaves the `f32` range the result is the
//! sentinel [`OVERFLOW`] (negative infinity), whatever the sign of the true
//! product would have been.

use tracing::{debug, warn};

/// Sentinel returned when a reduction overflows.
pub const OVERFLOW: f32 = f32::NEG_INFINITY;

/// Compute the product of `values`, left to right.
///
/// Returns `0.0` for an empty slice and [`OVERFLOW`] as soon as the next
/// multiplication would overflow, or an intermediate product is no longer
/// finite.
pub fn reduce(values: &[f32]) -> f32 {
    if values.is_empty() {
        warn!("Reduction requested for an empty vector");
        return 0.0;
    }

    debug!(len = values.len(), ?values, "Reducing vector");

    let mut product = 1.0f32;

    for &value in values {
        if would_overflow(product, value) {
            warn!(product, value, "Overflow detected before multiplication");
            return OVERFLOW;
        }

        product *= value;

        if !product.is_finite() {
            warn!(product, "Product is no longer finite");
            return OVERFLOW;
        }
    }

    debug!(product, "Reduction complete");
    product
}

/// Sign-based check of whether `acc * operand` leaves the `f32` range.
///
/// The negative-times-negative arm compares against `f32::MAX / operand`
/// rather than a mirrored bound; clients observe this exact behavior.
fn would_overflow(acc: f32, operand: f32) -> bool {
    if acc == 0.0 || operand == 0.0 {
        return false;
    }

    let max = f32::MAX;
    let min = f32::MIN;

    if acc > 0.0 && operand > 0.0 {
        acc > max / operand
    } else if acc < 0.0 && operand < 0.0 {
        acc < max / operand
    } else if acc > 0.0 && operand < 0.0 {
        operand < min / acc
    } else if acc < 0.0 && operand > 0.0 {
        acc < min / operand
    } else {
        // NaN operands fall through every comparison
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_product() {
        assert_eq!(reduce(&[2.0, 3.0, 4.0]), 24.0);
        assert_eq!(reduce(&[-2.0, 3.0]), -6.0);
        assert_eq!(reduce(&[-2.0, -3.0]), 6.0);
        assert_eq!(reduce(&[1.5]), 1.5);
    }

    #[test]
    fn test_empty_vector() {
        assert_eq!(reduce(&[]), 0.0);
    }

    #[test]
    fn test_zero_short_circuits_nothing() {
        assert_eq!(reduce(&[f32::MAX, 0.0, f32::MAX]), 0.0);
        assert_eq!(reduce(&[0.0, -5.0]), 0.0);
    }

    #[test]
    fn test_positive_overflow() {
        assert_eq!(reduce(&[f32::MAX, 2.0]), OVERFLOW);
        assert_eq!(reduce(&[1e20, 1e20]), OVERFLOW);
    }

    #[test]
    fn test_overflow_sentinel_ignores_sign() {
        // True product is hugely positive
        assert_eq!(reduce(&[-f32::MAX, -2.0]), OVERFLOW);
        // True product is hugely negative
        assert_eq!(reduce(&[f32::MAX, -2.0]), OVERFLOW);
        assert_eq!(reduce(&[-1e20, 1e20]), OVERFLOW);
    }

    #[test]
    fn test_overflow_mid_vector() {
        let mut values = vec![1e10f32; 5];
        values.push(1.0);
        assert_eq!(reduce(&values), OVERFLOW);
    }

    #[test]
    fn test_infinite_input_overflows() {
        assert_eq!(reduce(&[f32::INFINITY]), OVERFLOW);
        assert_eq!(reduce(&[2.0, f32::NEG_INFINITY]), OVERFLOW);
    }

    #[test]
    fn test_nan_input_is_not_finite() {
        assert_eq!(reduce(&[2.0, f32::NAN]), OVERFLOW);
    }

    #[test]
    fn test_largest_value_without_overflow() {
        assert_eq!(reduce(&[f32::MAX, 1.0]), f32::MAX);
        assert_eq!(reduce(&[f32::MIN, 1.0]), f32::MIN);
    }

    #[test]
    fn test_two_element_order_does_not_matter() {
        let samples = [
            0.5f32, -0.25, 3.0, -7.5, 1e-3, 12345.0, -1e10, 2.5e15, 0.0, -0.0,
        ];
        for &a in &samples {
            for &b in &samples {
                assert_eq!(
                    reduce(&[a, b]),
                    reduce(&[b, a]),
                    "reduce([{a}, {b}]) != reduce([{b}, {a}])"
                );
            }
        }
    }

    #[test]
    fn test_overflow_check_branches() {
        assert!(!would_overflow(0.0, f32::MAX));
        assert!(!would_overflow(f32::MAX, 0.0));
        assert!(would_overflow(f32::MAX, 1.5));
        assert!(would_overflow(-f32::MAX, -1.5));
        assert!(would_overflow(f32::MAX, -1.5));
        assert!(would_overflow(-f32::MAX, 1.5));
        assert!(!would_overflow(-2.0, -3.0));
        assert!(!would_overflow(f32::NAN, 2.0));
    }
}

//! Price rounding helpers.
//!
//! Every price and ratio comparison in the engine goes through these so
//! that floating drift never makes a price oscillate between cycles.

/// Rounds to two decimal places (half away from zero).
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Returns `true` if `a` and `b` are equal at two decimal places.
#[must_use]
pub fn same_price(a: f64, b: f64) -> bool {
    (round2(a) - round2(b)).abs() < f64::EPSILON
}

/// Direction marker used in price change log lines.
#[must_use]
pub fn direction_marker(old: f64, new: f64) -> char {
    if new > old { '\u{25B2}' } else { '\u{25BC}' }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round2_truncates_float_noise() {
        assert!((round2(0.1 + 0.2) - 0.3).abs() < 1e-12);
        assert!((round2(12.345_678) - 12.35).abs() < 1e-12);
        assert!((round2(-1.005_1) + 1.01).abs() < 1e-12);
    }

    #[test]
    fn same_price_ignores_sub_cent_drift() {
        assert!(same_price(5.0, 5.001));
        assert!(!same_price(5.0, 5.01));
    }

    #[test]
    fn marker_points_in_direction_of_change() {
        assert_eq!(direction_marker(1.0, 2.0), '\u{25B2}');
        assert_eq!(direction_marker(2.0, 1.0), '\u{25BC}');
    }
}

//! Core types and constants

use chrono::NaiveDate;

/// Unique identifier for a user (ledger owner)
pub type UserId = uuid::Uuid;

/// Unique identifier for a rate edge
pub type EdgeId = uuid::Uuid;

/// Exchange rate type
pub type Rate = f64;

/// Effective date of a rate edge
///
/// Rates are versioned at day granularity. Using a plain calendar date (no
/// time-of-day, no timezone) makes "the rate effective on 2024-01-01"
/// unambiguous for lookups, which is the normalization the rate store
/// relies on.
pub type EffectiveDate = NaiveDate;

/// Round a value to `decimal_places` using banker's rounding (half-even)
///
/// Applied everywhere converted amounts are displayed or summed, so the
/// same amount never rounds two different ways in two reports.
pub fn round_half_even(value: f64, decimal_places: u8) -> f64 {
    let scale = 10f64.powi(decimal_places as i32);
    (value * scale).round_ties_even() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_half_even() {
        // Exact binary ties round to the even neighbour
        assert_eq!(round_half_even(2.5, 0), 2.0);
        assert_eq!(round_half_even(3.5, 0), 4.0);
        assert_eq!(round_half_even(0.125, 2), 0.12);
        assert_eq!(round_half_even(0.375, 2), 0.38);
        assert_eq!(round_half_even(1.0, 2), 1.0);
    }

    #[test]
    fn test_round_zero_places() {
        // JPY-style currencies round to whole units
        assert_eq!(round_half_even(1234.56, 0), 1235.0);
        assert_eq!(round_half_even(-1234.56, 0), -1235.0);
    }
}

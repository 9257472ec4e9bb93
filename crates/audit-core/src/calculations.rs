//! Guarded arithmetic shared by every report.
//!
//! Each helper divides by a count that may legitimately be zero and returns
//! `0.0` (or `None` for "no data") instead of producing `NaN`/`inf`.

use chrono::NaiveDate;

use crate::time_utils::is_weekday;

/// `numerator / denominator`, or `0.0` when the denominator is zero.
pub fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    numerator / denominator
}

/// Arithmetic mean, or `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Round to two decimal places for presentation.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Average creations per productive working day.
///
/// Only days that are weekdays **and** have at least one creation count in the
/// denominator, so idle days and weekend spill-over do not dilute the figure.
/// Returns `0.0` when no day qualifies.
pub fn smart_average_per_day<I>(daily_creations: I) -> f64
where
    I: IntoIterator<Item = (NaiveDate, u32)>,
{
    let mut total = 0u64;
    let mut days = 0u64;
    for (date, count) in daily_creations {
        if count == 0 || !is_weekday(date) {
            continue;
        }
        total += u64::from(count);
        days += 1;
    }
    safe_div(total as f64, days as f64)
}

/// Manual-to-automatic ratio.
///
/// When there are no automatic creations the manual count itself is returned,
/// so a purely manual user reads as "N to nothing" rather than dividing by 0.
pub fn manual_vs_auto_ratio(manual: u32, automatic: u32) -> f64 {
    if automatic == 0 {
        return f64::from(manual);
    }
    f64::from(manual) / f64::from(automatic)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_safe_div_zero_denominator() {
        assert_eq!(safe_div(5.0, 0.0), 0.0);
        assert_eq!(safe_div(0.0, 0.0), 0.0);
        assert!((safe_div(6.0, 4.0) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[2.0, 4.0]), Some(3.0));
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.23456), 1.23);
        assert_eq!(round2(2.0 / 3.0), 0.67);
    }

    // ── smart_average_per_day ────────────────────────────────────────────────

    #[test]
    fn test_smart_average_excludes_zero_days_and_weekends() {
        let daily = vec![
            (date(2024, 1, 15), 4), // Monday
            (date(2024, 1, 16), 0), // Tuesday, idle
            (date(2024, 1, 17), 2), // Wednesday
            (date(2024, 1, 20), 9), // Saturday
        ];
        assert!((smart_average_per_day(daily) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_smart_average_no_qualifying_days_is_zero() {
        assert_eq!(smart_average_per_day(Vec::new()), 0.0);
        let weekend_only = vec![(date(2024, 1, 13), 3), (date(2024, 1, 14), 1)];
        assert_eq!(smart_average_per_day(weekend_only), 0.0);
    }

    // ── manual_vs_auto_ratio ─────────────────────────────────────────────────

    #[test]
    fn test_manual_vs_auto_ratio() {
        assert_eq!(manual_vs_auto_ratio(0, 0), 0.0);
        assert_eq!(manual_vs_auto_ratio(3, 0), 3.0);
        assert!((manual_vs_auto_ratio(3, 2) - 1.5).abs() < 1e-12);
    }
}

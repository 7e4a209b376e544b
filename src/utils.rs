// Utility functions
use chrono::NaiveDate;

/// Rounds to 2 decimal places for presentation stability.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Rounds to 4 decimal places (discount fractions, yields).
pub fn round4(v: f64) -> f64 {
    (v * 10000.0).round() / 10000.0
}

/// Parses an ISO `YYYY-MM-DD` date string, if possible.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

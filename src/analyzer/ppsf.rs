//! Price-per-square-foot metrics with recency-weighted market averaging.

use chrono::{Duration, NaiveDate, Utc};

use crate::model::{ComparableTransaction, PpsfResult};
use crate::utils::{round2, round4};

/// Harmonic weight decay horizon for comparable ages, in months.
const AGE_DECAY_MONTHS: f64 = 6.0;

pub struct PpsfCalculator {
    min_comparables: usize,
    max_age_months: i64,
}

impl Default for PpsfCalculator {
    fn default() -> Self {
        Self {
            min_comparables: 3,
            max_age_months: 24,
        }
    }
}

impl PpsfCalculator {
    pub fn new(min_comparables: usize, max_age_months: i64) -> Self {
        Self {
            min_comparables,
            max_age_months,
        }
    }

    /// Computes PPSF metrics for an asking price against a comparable set.
    ///
    /// Never fails: a non-positive floor area yields the zero result, and
    /// too few comparables yield the asking price alone with a depressed
    /// confidence score.
    pub fn compute(
        &self,
        asking_price: f64,
        floor_area_sqft: f64,
        comparables: &[ComparableTransaction],
    ) -> PpsfResult {
        if floor_area_sqft <= 0.0 {
            return PpsfResult {
                asking_ppsf: 0.0,
                market_ppsf: None,
                discount_pct: None,
                comparable_count: 0,
                confidence: 0.0,
            };
        }

        let asking_ppsf = asking_price / floor_area_sqft;
        let today = Utc::now().date_naive();
        let valid = self.filter_comparables(comparables, today);

        if valid.len() < self.min_comparables {
            return PpsfResult {
                asking_ppsf: round2(asking_ppsf),
                market_ppsf: None,
                discount_pct: None,
                comparable_count: valid.len(),
                confidence: round2(self.confidence(valid.len())),
            };
        }

        let market_ppsf = weighted_market_ppsf(&valid, today);
        let discount_pct = if market_ppsf > 0.0 {
            Some(round4((market_ppsf - asking_ppsf) / market_ppsf))
        } else {
            None
        };

        PpsfResult {
            asking_ppsf: round2(asking_ppsf),
            market_ppsf: Some(round2(market_ppsf)),
            discount_pct,
            comparable_count: valid.len(),
            confidence: round2(self.confidence(valid.len())),
        }
    }

    /// Drops comparables with a non-positive unit price or past the age
    /// cutoff. Applied even though the selector filters too.
    fn filter_comparables<'a>(
        &self,
        comparables: &'a [ComparableTransaction],
        today: NaiveDate,
    ) -> Vec<&'a ComparableTransaction> {
        let cutoff = today - Duration::days(self.max_age_months * 30);
        comparables
            .iter()
            .filter(|c| c.unit_price > 0.0 && c.transaction_date >= cutoff)
            .collect()
    }

    /// Piecewise-linear confidence in the sample size alone; monotonically
    /// non-decreasing in the comparable count.
    fn confidence(&self, count: usize) -> f64 {
        if count == 0 {
            0.0
        } else if count < self.min_comparables {
            0.3 * (count as f64 / self.min_comparables as f64)
        } else if count < 10 {
            0.3 + 0.5 * ((count - self.min_comparables) as f64 / 7.0)
        } else {
            (0.8 + 0.02 * (count - 10) as f64).min(1.0)
        }
    }
}

/// Recency-weighted mean unit price. Each comparable weighs
/// `1 / (1 + age_months / 6)` with the age measured in 30-day months.
fn weighted_market_ppsf(comparables: &[&ComparableTransaction], today: NaiveDate) -> f64 {
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;

    for comp in comparables {
        let age_days = (today - comp.transaction_date).num_days() as f64;
        let age_months = age_days / 30.0;
        let weight = 1.0 / (1.0 + age_months / AGE_DECAY_MONTHS);
        weighted_sum += comp.unit_price * weight;
        total_weight += weight;
    }

    if total_weight > 0.0 {
        weighted_sum / total_weight
    } else {
        0.0
    }
}

/// Unit price for a single sale, rounded to 2 decimals.
pub fn unit_price(price: f64, floor_area_sqft: f64) -> Option<f64> {
    if floor_area_sqft > 0.0 {
        Some(round2(price / floor_area_sqft))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn comparable(price: f64, area: f64, age_days: i64) -> ComparableTransaction {
        ComparableTransaction::new(
            None,
            "SW15 6EJ".into(),
            None,
            price,
            area,
            Utc::now().date_naive() - Duration::days(age_days),
        )
    }

    #[test]
    fn no_comparables_yields_asking_only() {
        let calc = PpsfCalculator::default();
        let result = calc.compute(500_000.0, 1000.0, &[]);

        assert_eq!(result.asking_ppsf, 500.0);
        assert_eq!(result.market_ppsf, None);
        assert_eq!(result.discount_pct, None);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn non_positive_floor_area_yields_zero_result() {
        let calc = PpsfCalculator::default();
        for area in [0.0, -10.0] {
            let result = calc.compute(500_000.0, area, &[comparable(550_000.0, 1000.0, 30)]);
            assert_eq!(result.asking_ppsf, 0.0);
            assert_eq!(result.confidence, 0.0);
            assert_eq!(result.comparable_count, 0);
        }
    }

    #[test]
    fn weighted_market_favours_recent_sales() {
        let calc = PpsfCalculator::default();
        let comps = vec![
            comparable(550_000.0, 1000.0, 30),
            comparable(520_000.0, 1000.0, 60),
            comparable(480_000.0, 1000.0, 90),
        ];

        let result = calc.compute(450_000.0, 1000.0, &comps);

        assert_eq!(result.asking_ppsf, 450.0);
        let market = result.market_ppsf.expect("three comparables suffice");
        assert!(market > 480.0 && market < 550.0);
        // Weighted toward the most recent sale, above the flat mean.
        assert!(market > (550.0 + 520.0 + 480.0) / 3.0);
        assert!(result.discount_pct.expect("market known") > 0.0);
    }

    #[test]
    fn below_minimum_count_withholds_market_price() {
        let calc = PpsfCalculator::default();
        let comps = vec![
            comparable(550_000.0, 1000.0, 30),
            comparable(520_000.0, 1000.0, 60),
        ];

        let result = calc.compute(450_000.0, 1000.0, &comps);

        assert_eq!(result.asking_ppsf, 450.0);
        assert_eq!(result.market_ppsf, None);
        assert_eq!(result.discount_pct, None);
        assert_eq!(result.comparable_count, 2);
        assert_eq!(result.confidence, 0.2);
    }

    #[test]
    fn stale_and_invalid_comparables_are_dropped() {
        let calc = PpsfCalculator::default();
        let comps = vec![
            comparable(550_000.0, 1000.0, 30),
            comparable(520_000.0, 1000.0, 25 * 30), // past the 24-month window
            comparable(480_000.0, 0.0, 30),         // zero unit price
        ];

        let result = calc.compute(450_000.0, 1000.0, &comps);
        assert_eq!(result.comparable_count, 1);
        assert_eq!(result.market_ppsf, None);
    }

    #[test]
    fn confidence_is_monotonic_in_count() {
        let calc = PpsfCalculator::default();
        let mut previous = -1.0;
        for count in 0..=20 {
            let c = calc.confidence(count);
            assert!(c >= previous, "confidence dipped at count {count}");
            assert!((0.0..=1.0).contains(&c));
            previous = c;
        }
        assert_eq!(calc.confidence(20), 1.0);
    }

    #[test]
    fn single_unit_price() {
        assert_eq!(unit_price(500_000.0, 1000.0), Some(500.0));
        assert_eq!(unit_price(500_000.0, 0.0), None);
    }
}

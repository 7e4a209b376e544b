//! Bargain index scoring and priority classification.
//!
//! Pure, deterministic scoring: no clock, no I/O, no hidden state.

use crate::model::{BargainScore, EpcRating, Priority, PropertyType};
use crate::utils::{round2, round4};

/// Undervalued index at or above which a subject can rank HIGH.
const HIGH_PRIORITY_THRESHOLD: f64 = 0.15;
/// Undervalued index at or above which a subject ranks at least MEDIUM.
const MEDIUM_PRIORITY_THRESHOLD: f64 = 0.05;
/// Confidence required in addition to the index for HIGH.
const HIGH_CONFIDENCE_GATE: f64 = 0.5;

/// A 20%-or-greater discount saturates the price sub-score.
const PRICE_SCORE_SATURATION: f64 = 0.20;

pub struct BargainCalculator;

/// Inputs to a bargain score, all optional except the comparable count.
#[derive(Debug, Default, Clone)]
pub struct BargainInputs {
    pub ppsf_discount: Option<f64>,
    pub comparable_count: usize,
    pub epc_rating: Option<EpcRating>,
    pub property_type: Option<PropertyType>,
    pub asking_price: Option<f64>,
    /// Area price trend in [-1, 1]; positive = rising prices.
    pub area_price_trend: Option<f64>,
}

impl BargainCalculator {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, inputs: &BargainInputs) -> BargainScore {
        let price_score = price_score(inputs.ppsf_discount);
        let area_score = area_score(inputs.area_price_trend);
        let condition_score = condition_score(inputs.epc_rating);

        let confidence = confidence(
            inputs.ppsf_discount.is_some(),
            inputs.comparable_count,
            inputs.epc_rating.is_some(),
        );

        // The raw discount is the headline number. The sub-scores are
        // reported for diagnostics but never blended into it.
        let undervalued_index = inputs.ppsf_discount.unwrap_or(0.0);

        let priority = classify(undervalued_index, confidence);
        let projected_yield = estimate_yield(inputs.property_type, inputs.epc_rating);
        let value_uplift = estimate_value_uplift(
            undervalued_index,
            inputs.epc_rating,
            inputs.area_price_trend,
        );

        BargainScore {
            undervalued_index: round4(undervalued_index),
            priority,
            confidence: round2(confidence),
            projected_yield: projected_yield.map(round4),
            value_uplift_potential: value_uplift.map(round2),
            price_score: round2(price_score),
            area_score: round2(area_score),
            condition_score: round2(condition_score),
        }
    }
}

fn price_score(ppsf_discount: Option<f64>) -> f64 {
    match ppsf_discount {
        Some(d) => (d / PRICE_SCORE_SATURATION).clamp(0.0, 1.0),
        None => 0.0,
    }
}

fn area_score(area_price_trend: Option<f64>) -> f64 {
    match area_price_trend {
        // Map [-1, 1] onto [0, 1]; rising prices favour investment.
        Some(trend) => ((trend + 1.0) / 2.0).clamp(0.0, 1.0),
        None => 0.5,
    }
}

fn condition_score(epc: Option<EpcRating>) -> f64 {
    match epc {
        Some(EpcRating::A) => 1.0,
        Some(EpcRating::B) => 0.9,
        Some(EpcRating::C) => 0.75,
        Some(EpcRating::D) => 0.6,
        Some(EpcRating::E) => 0.4,
        Some(EpcRating::F) => 0.2,
        Some(EpcRating::G) => 0.1,
        None => 0.5,
    }
}

/// Additive point system over data availability, capped at 1.0.
fn confidence(has_discount: bool, comparable_count: usize, has_epc: bool) -> f64 {
    let mut confidence: f64 = 0.0;

    if has_discount {
        confidence += 0.4;
    }

    if comparable_count >= 10 {
        confidence += 0.35;
    } else if comparable_count >= 5 {
        confidence += 0.25;
    } else if comparable_count >= 3 {
        confidence += 0.15;
    }

    if has_epc {
        confidence += 0.15;
    }

    if has_discount && comparable_count >= 5 && has_epc {
        confidence += 0.1;
    }

    confidence.min(1.0)
}

/// HIGH requires both the index threshold and the confidence gate; the
/// gate intentionally does not apply to the MEDIUM boundary.
fn classify(undervalued_index: f64, confidence: f64) -> Priority {
    if undervalued_index >= HIGH_PRIORITY_THRESHOLD && confidence >= HIGH_CONFIDENCE_GATE {
        Priority::High
    } else if undervalued_index >= MEDIUM_PRIORITY_THRESHOLD {
        Priority::Medium
    } else {
        Priority::Low
    }
}

/// UK average rental yields by property type, adjusted for EPC band.
fn estimate_yield(property_type: Option<PropertyType>, epc: Option<EpcRating>) -> Option<f64> {
    let base = match property_type? {
        PropertyType::Flat => 0.052,
        PropertyType::Terraced => 0.045,
        PropertyType::SemiDetached => 0.042,
        PropertyType::Detached => 0.038,
    };

    let adjustment = match epc {
        Some(EpcRating::A) => 1.10,
        Some(EpcRating::B) => 1.05,
        Some(EpcRating::C) => 1.0,
        Some(EpcRating::D) => 0.95,
        Some(EpcRating::E) => 0.90,
        Some(EpcRating::F) => 0.85,
        Some(EpcRating::G) => 0.80,
        None => 1.0,
    };

    Some(base * adjustment)
}

/// Potential value increase: the undervaluation itself, plus EPC
/// improvement headroom, plus a slice of any positive area momentum.
fn estimate_value_uplift(
    undervalued_index: f64,
    epc: Option<EpcRating>,
    area_trend: Option<f64>,
) -> Option<f64> {
    if undervalued_index <= 0.0 {
        return None;
    }

    let mut uplift = undervalued_index;

    uplift += match epc {
        Some(EpcRating::A) => 0.0,
        Some(EpcRating::B) => 0.02,
        Some(EpcRating::C) => 0.04,
        Some(EpcRating::D) => 0.06,
        Some(EpcRating::E) => 0.08,
        Some(EpcRating::F) => 0.10,
        Some(EpcRating::G) => 0.12,
        None => 0.0,
    };

    if let Some(trend) = area_trend {
        if trend > 0.0 {
            uplift += trend * 0.05;
        }
    }

    Some(uplift)
}

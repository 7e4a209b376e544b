// Core value types: addresses, comparables, analysis results.
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::utils::round2;

/// UK property classification as used by the Land Registry price paid data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    Detached,
    SemiDetached,
    Terraced,
    Flat,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Detached => "Detached",
            PropertyType::SemiDetached => "Semi-Detached",
            PropertyType::Terraced => "Terraced",
            PropertyType::Flat => "Flat",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Detached" => Some(PropertyType::Detached),
            "Semi-Detached" => Some(PropertyType::SemiDetached),
            "Terraced" => Some(PropertyType::Terraced),
            "Flat" => Some(PropertyType::Flat),
            _ => None,
        }
    }
}

/// Energy Performance Certificate band, A (best) to G (worst).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpcRating {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
}

impl EpcRating {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Some(EpcRating::A),
            "B" => Some(EpcRating::B),
            "C" => Some(EpcRating::C),
            "D" => Some(EpcRating::D),
            "E" => Some(EpcRating::E),
            "F" => Some(EpcRating::F),
            "G" => Some(EpcRating::G),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EpcRating::A => "A",
            EpcRating::B => "B",
            EpcRating::C => "C",
            EpcRating::D => "D",
            EpcRating::E => "E",
            EpcRating::F => "F",
            EpcRating::G => "G",
        }
    }
}

/// BS7666-style address components, as parsed from free text or returned
/// structured by the Land Registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredAddress {
    /// Primary Addressable Object Name (house number or building name).
    pub paon: Option<String>,
    /// Secondary Addressable Object Name (flat / unit).
    pub saon: Option<String>,
    pub street: Option<String>,
    pub town: Option<String>,
    pub postcode: Option<String>,
}

/// A subject property eligible for analysis.
#[derive(Debug, Clone)]
pub struct SubjectRecord {
    pub uprn: String,
    pub address: StructuredAddress,
    pub property_type: Option<PropertyType>,
    pub floor_area_sqft: Option<f64>,
    pub epc_rating: Option<EpcRating>,
}

/// A historical sale reduced to the fields the valuation engine needs.
/// The unit price is derived once at construction and never recomputed.
#[derive(Debug, Clone)]
pub struct ComparableTransaction {
    pub uprn: Option<String>,
    pub postcode: String,
    pub property_type: Option<PropertyType>,
    pub price_paid: f64,
    pub floor_area_sqft: f64,
    pub transaction_date: NaiveDate,
    pub unit_price: f64,
}

impl ComparableTransaction {
    pub fn new(
        uprn: Option<String>,
        postcode: String,
        property_type: Option<PropertyType>,
        price_paid: f64,
        floor_area_sqft: f64,
        transaction_date: NaiveDate,
    ) -> Self {
        let unit_price = if floor_area_sqft > 0.0 {
            round2(price_paid / floor_area_sqft)
        } else {
            0.0
        };
        Self {
            uprn,
            postcode,
            property_type,
            price_paid,
            floor_area_sqft,
            transaction_date,
            unit_price,
        }
    }
}

/// A raw sale row as returned by the Land Registry, before UPRN resolution.
/// The address arrives already structured.
#[derive(Debug, Clone)]
pub struct SaleRecord {
    pub address: StructuredAddress,
    pub property_type: Option<PropertyType>,
    pub price_paid: f64,
    pub transaction_date: NaiveDate,
}

/// Price-per-square-foot metrics for one subject.
#[derive(Debug, Clone, PartialEq)]
pub struct PpsfResult {
    pub asking_ppsf: f64,
    /// Recency-weighted market average; absent when fewer comparables than
    /// the configured minimum were usable.
    pub market_ppsf: Option<f64>,
    /// Fraction below market. Positive = subject is cheaper than market.
    pub discount_pct: Option<f64>,
    pub comparable_count: usize,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "High" => Some(Priority::High),
            "Medium" => Some(Priority::Medium),
            "Low" => Some(Priority::Low),
            _ => None,
        }
    }
}

/// Composite bargain analysis for one subject.
#[derive(Debug, Clone, PartialEq)]
pub struct BargainScore {
    /// Headline score: the raw PPSF discount fraction (0.0 when unknown).
    /// The component sub-scores below are diagnostic and deliberately not
    /// blended into this number.
    pub undervalued_index: f64,
    pub priority: Priority,
    pub confidence: f64,
    pub projected_yield: Option<f64>,
    pub value_uplift_potential: Option<f64>,
    pub price_score: f64,
    pub area_score: f64,
    pub condition_score: f64,
}

/// Full analysis output for one subject. Superseded, never mutated, on
/// re-analysis; the storage upsert keeps at most one live row per subject.
#[derive(Debug, Clone)]
pub struct PropertyAnalysis {
    pub uprn: String,
    pub ppsf: PpsfResult,
    pub bargain: BargainScore,
    pub comparables: Vec<ComparableTransaction>,
    pub calculated_at: DateTime<Utc>,
}

/// Outcome of a district-wide batch run: best-effort partial success.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub analyses: Vec<PropertyAnalysis>,
    /// Subjects enumerated but not analyzable yet (no quote, no floor area).
    pub skipped: usize,
    /// Subjects whose fetch or persist failed; logged, never fatal.
    pub failed: usize,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(String),
    #[error("request timed out")]
    Timeout,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<StorageError> for ProviderError {
    fn from(e: StorageError) -> Self {
        ProviderError::Backend(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    #[error("record not found")]
    NotFound,
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Database(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

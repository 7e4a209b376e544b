use serde::Deserialize;
use std::fs;

/// One postcode district to ingest and analyze, e.g. "SW15".
#[derive(Debug, Clone, Deserialize)]
pub struct RegionConfig {
    pub district: String,
    #[serde(default = "default_transaction_limit")]
    pub transaction_limit: usize,
    #[serde(default = "default_max_age_months")]
    pub max_age_months: i64,
}

/// Tuning knobs for the valuation engine.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_min_comparables")]
    pub min_comparables: usize,
    #[serde(default = "default_max_age_months")]
    pub max_age_months: i64,
    #[serde(default = "default_comparable_limit")]
    pub comparable_limit: usize,
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_comparables: default_min_comparables(),
            max_age_months: default_max_age_months(),
            comparable_limit: default_comparable_limit(),
            match_threshold: default_match_threshold(),
            batch_concurrency: default_batch_concurrency(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub regions: Vec<RegionConfig>,
    pub check_interval_seconds: u64,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_land_registry_endpoint")]
    pub land_registry_endpoint: String,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

fn default_transaction_limit() -> usize {
    500
}

fn default_min_comparables() -> usize {
    3
}

fn default_max_age_months() -> i64 {
    24
}

fn default_comparable_limit() -> usize {
    50
}

fn default_match_threshold() -> f64 {
    crate::matcher::MATCH_THRESHOLD
}

fn default_batch_concurrency() -> usize {
    4
}

fn default_database_path() -> String {
    "data.db".to_string()
}

fn default_land_registry_endpoint() -> String {
    "https://landregistry.data.gov.uk/landregistry/query".to_string()
}

fn default_request_timeout_seconds() -> u64 {
    30
}

pub fn load_config(path: &str) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{
                "regions": [{"district": "SW15"}],
                "check_interval_seconds": 3600
            }"#,
        )
        .unwrap();

        assert_eq!(config.regions[0].district, "SW15");
        assert_eq!(config.regions[0].transaction_limit, 500);
        assert_eq!(config.analysis.min_comparables, 3);
        assert_eq!(config.analysis.max_age_months, 24);
        assert_eq!(config.analysis.match_threshold, 0.7);
        assert_eq!(config.database_path, "data.db");
    }
}

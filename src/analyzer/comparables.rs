//! Comparable selection: filters and ranks historical sales around a
//! subject into a bounded evidence set.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::debug;

use crate::matcher;
use crate::model::{ComparableTransaction, PropertyType, ProviderError, SubjectRecord};
use crate::provider::TransactionProvider;

/// Comparables must sit within this fraction of the subject's floor area.
const FLOOR_AREA_TOLERANCE: f64 = 0.25;

pub struct ComparableSelector {
    provider: Arc<dyn TransactionProvider>,
}

impl ComparableSelector {
    pub fn new(provider: Arc<dyn TransactionProvider>) -> Self {
        Self { provider }
    }

    /// Selects comparables for a postcode sector, most recent first,
    /// truncated to `limit`. All filters apply conjunctively; an empty
    /// result is a normal outcome, never an error.
    pub async fn select(
        &self,
        postcode_sector: &str,
        property_type: Option<PropertyType>,
        floor_area_sqft: Option<f64>,
        max_age_months: i64,
        limit: usize,
    ) -> Result<Vec<ComparableTransaction>, ProviderError> {
        let pool = self
            .provider
            .transactions_in_sector(postcode_sector, max_age_months, limit)
            .await?;

        let cutoff = Utc::now().date_naive() - Duration::days(max_age_months * 30);
        let area_band = floor_area_sqft.filter(|a| *a > 0.0).map(|a| {
            (
                a * (1.0 - FLOOR_AREA_TOLERANCE),
                a * (1.0 + FLOOR_AREA_TOLERANCE),
            )
        });

        let mut selected: Vec<ComparableTransaction> = pool
            .into_iter()
            .filter(|t| t.postcode.starts_with(postcode_sector))
            .filter(|t| t.transaction_date >= cutoff)
            .filter(|t| property_type.is_none_or(|p| t.property_type == Some(p)))
            .filter(|t| {
                area_band.is_none_or(|(min, max)| {
                    t.floor_area_sqft >= min && t.floor_area_sqft <= max
                })
            })
            .collect();

        selected.sort_by(|a, b| b.transaction_date.cmp(&a.transaction_date));
        selected.truncate(limit);

        debug!(
            sector = postcode_sector,
            count = selected.len(),
            "selected comparables"
        );
        Ok(selected)
    }

    /// Selects comparables for a subject using its own postcode sector,
    /// type and floor area. A subject without a resolvable sector yields
    /// an empty set.
    pub async fn select_for_subject(
        &self,
        subject: &SubjectRecord,
        max_age_months: i64,
        limit: usize,
    ) -> Result<Vec<ComparableTransaction>, ProviderError> {
        let sector = subject
            .address
            .postcode
            .as_deref()
            .and_then(matcher::postcode_sector);

        let Some(sector) = sector else {
            debug!(uprn = %subject.uprn, "subject has no resolvable postcode sector");
            return Ok(Vec::new());
        };

        self.select(
            &sector,
            subject.property_type,
            subject.floor_area_sqft,
            max_age_months,
            limit,
        )
        .await
    }
}

//! Analysis orchestration: comparables -> PPSF -> bargain score -> upsert.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::analyzer::bargain::{BargainCalculator, BargainInputs};
use crate::analyzer::comparables::ComparableSelector;
use crate::analyzer::ppsf::PpsfCalculator;
use crate::config::AnalysisConfig;
use crate::model::{AnalysisError, BatchOutcome, PropertyAnalysis};
use crate::provider::{MetricsSink, PropertyProvider, QuoteProvider, TransactionProvider};

pub struct AnalysisService {
    properties: Arc<dyn PropertyProvider>,
    quotes: Arc<dyn QuoteProvider>,
    selector: ComparableSelector,
    ppsf: PpsfCalculator,
    bargain: BargainCalculator,
    sink: Option<Arc<dyn MetricsSink>>,
    cfg: AnalysisConfig,
}

impl AnalysisService {
    pub fn new(
        properties: Arc<dyn PropertyProvider>,
        quotes: Arc<dyn QuoteProvider>,
        transactions: Arc<dyn TransactionProvider>,
        sink: Option<Arc<dyn MetricsSink>>,
        cfg: AnalysisConfig,
    ) -> Self {
        let ppsf = PpsfCalculator::new(cfg.min_comparables, cfg.max_age_months);
        Self {
            properties,
            quotes,
            selector: ComparableSelector::new(transactions),
            ppsf,
            bargain: BargainCalculator::new(),
            sink,
            cfg,
        }
    }

    /// Runs the full pipeline for one subject.
    ///
    /// Returns `Ok(None)` for the expected not-analyzable-yet cases:
    /// unknown subject, no active quote, or no usable floor area. Only
    /// collaborator failures surface as errors.
    pub async fn analyze_one(
        &self,
        uprn: &str,
        area_price_trend: Option<f64>,
    ) -> Result<Option<PropertyAnalysis>, AnalysisError> {
        let Some(subject) = self.properties.subject(uprn).await? else {
            debug!(uprn, "subject not found, skipping analysis");
            return Ok(None);
        };

        let Some(asking_price) = self.quotes.active_quote(uprn).await? else {
            debug!(uprn, "no active quote, skipping analysis");
            return Ok(None);
        };

        let floor_area = subject.floor_area_sqft.filter(|a| *a > 0.0);
        let Some(floor_area) = floor_area else {
            debug!(uprn, "no usable floor area, skipping analysis");
            return Ok(None);
        };

        let comparables = self
            .selector
            .select_for_subject(&subject, self.cfg.max_age_months, self.cfg.comparable_limit)
            .await?;

        let ppsf = self.ppsf.compute(asking_price, floor_area, &comparables);

        let bargain = self.bargain.score(&BargainInputs {
            ppsf_discount: ppsf.discount_pct,
            comparable_count: ppsf.comparable_count,
            epc_rating: subject.epc_rating,
            property_type: subject.property_type,
            asking_price: Some(asking_price),
            area_price_trend,
        });

        let analysis = PropertyAnalysis {
            uprn: subject.uprn.clone(),
            ppsf,
            bargain,
            comparables,
            calculated_at: Utc::now(),
        };

        if let Some(sink) = &self.sink {
            sink.upsert_analysis(&analysis).await?;
        }

        info!(
            uprn,
            asking_ppsf = analysis.ppsf.asking_ppsf,
            discount = ?analysis.ppsf.discount_pct,
            priority = analysis.bargain.priority.as_str(),
            "analysis complete"
        );

        Ok(Some(analysis))
    }

    /// Analyzes every analyzable subject in a postcode district.
    ///
    /// Best-effort: a single subject's failure is logged and counted but
    /// never aborts the batch. Subjects run concurrently up to the
    /// configured worker bound.
    pub async fn analyze_batch(&self, district: &str) -> Result<BatchOutcome, AnalysisError> {
        let subjects = self.properties.subjects_in_district(district).await?;
        info!(district, subjects = subjects.len(), "starting batch analysis");

        let results = stream::iter(subjects)
            .map(|subject| async move {
                let outcome = self.analyze_one(&subject.uprn, None).await;
                (subject.uprn, outcome)
            })
            .buffer_unordered(self.cfg.batch_concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        let mut outcome = BatchOutcome::default();
        for (uprn, result) in results {
            match result {
                Ok(Some(analysis)) => outcome.analyses.push(analysis),
                Ok(None) => outcome.skipped += 1,
                Err(e) => {
                    warn!(uprn = %uprn, error = %e, "subject analysis failed");
                    outcome.failed += 1;
                }
            }
        }

        info!(
            district,
            analyzed = outcome.analyses.len(),
            skipped = outcome.skipped,
            failed = outcome.failed,
            "batch analysis complete"
        );
        Ok(outcome)
    }
}

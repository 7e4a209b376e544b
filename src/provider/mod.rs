// Collaborator seams: subject, quote, transaction and metrics roles.
//
// The valuation engine only ever talks to the outside world through these
// traits, so every component can be tested with in-memory fakes.

pub mod land_registry;

use async_trait::async_trait;

use crate::model::{
    ComparableTransaction, PropertyAnalysis, ProviderError, StorageError, SubjectRecord,
};

pub use land_registry::LandRegistryClient;

/// Source of subject property records.
#[async_trait]
pub trait PropertyProvider: Send + Sync {
    async fn subject(&self, uprn: &str) -> Result<Option<SubjectRecord>, ProviderError>;

    /// All subjects in a postcode district that hold an active quote and a
    /// usable floor area.
    async fn subjects_in_district(
        &self,
        district: &str,
    ) -> Result<Vec<SubjectRecord>, ProviderError>;
}

/// Source of the active asking price for a subject, when one exists.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn active_quote(&self, uprn: &str) -> Result<Option<f64>, ProviderError>;
}

/// Source of historical sales for a postcode sector.
#[async_trait]
pub trait TransactionProvider: Send + Sync {
    async fn transactions_in_sector(
        &self,
        sector: &str,
        max_age_months: i64,
        limit: usize,
    ) -> Result<Vec<ComparableTransaction>, ProviderError>;
}

/// Persistence collaborator: stages an upsert of the analysis keyed by the
/// subject identifier. At most one live metrics record per subject.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn upsert_analysis(&self, analysis: &PropertyAnalysis) -> Result<(), StorageError>;
}

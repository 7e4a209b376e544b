// Storage module: rusqlite persistence plus the async gateway that
// exposes it through the provider trait seams.

pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::model::{
    ComparableTransaction, PropertyAnalysis, ProviderError, StorageError, SubjectRecord,
};
use crate::provider::{MetricsSink, PropertyProvider, QuoteProvider, TransactionProvider};

pub use sqlite::{SqliteStorage, StoredMetrics};

/// Cloneable handle sharing one SQLite connection across tasks.
#[derive(Clone)]
pub struct StorageHandle {
    inner: Arc<Mutex<SqliteStorage>>,
}

impl StorageHandle {
    pub fn new(storage: SqliteStorage) -> Self {
        Self {
            inner: Arc::new(Mutex::new(storage)),
        }
    }

    /// Runs a closure against the locked storage.
    pub async fn with<R>(&self, f: impl FnOnce(&SqliteStorage) -> R) -> R {
        let guard = self.inner.lock().await;
        f(&guard)
    }
}

#[async_trait]
impl PropertyProvider for StorageHandle {
    async fn subject(&self, uprn: &str) -> Result<Option<SubjectRecord>, ProviderError> {
        Ok(self.inner.lock().await.get_property(uprn)?)
    }

    async fn subjects_in_district(
        &self,
        district: &str,
    ) -> Result<Vec<SubjectRecord>, ProviderError> {
        Ok(self.inner.lock().await.properties_in_district(district)?)
    }
}

#[async_trait]
impl QuoteProvider for StorageHandle {
    async fn active_quote(&self, uprn: &str) -> Result<Option<f64>, ProviderError> {
        Ok(self.inner.lock().await.active_quote(uprn)?)
    }
}

#[async_trait]
impl TransactionProvider for StorageHandle {
    async fn transactions_in_sector(
        &self,
        sector: &str,
        max_age_months: i64,
        limit: usize,
    ) -> Result<Vec<ComparableTransaction>, ProviderError> {
        Ok(self
            .inner
            .lock()
            .await
            .transactions_in_sector(sector, max_age_months, limit)?)
    }
}

#[async_trait]
impl MetricsSink for StorageHandle {
    async fn upsert_analysis(&self, analysis: &PropertyAnalysis) -> Result<(), StorageError> {
        self.inner.lock().await.upsert_analysis(analysis)
    }
}

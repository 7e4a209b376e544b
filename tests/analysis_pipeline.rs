//! End-to-end exercises of the analysis orchestration, with in-memory
//! fake collaborators and with the real SQLite storage.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;

use bargain_scout::analyzer::AnalysisService;
use bargain_scout::config::AnalysisConfig;
use bargain_scout::model::{
    ComparableTransaction, EpcRating, Priority, PropertyAnalysis, PropertyType, ProviderError,
    SaleRecord, StorageError, StructuredAddress, SubjectRecord,
};
use bargain_scout::provider::{MetricsSink, PropertyProvider, QuoteProvider, TransactionProvider};
use bargain_scout::storage::{SqliteStorage, StorageHandle};

struct FakeProperties(HashMap<String, SubjectRecord>);

#[async_trait]
impl PropertyProvider for FakeProperties {
    async fn subject(&self, uprn: &str) -> Result<Option<SubjectRecord>, ProviderError> {
        Ok(self.0.get(uprn).cloned())
    }

    async fn subjects_in_district(
        &self,
        district: &str,
    ) -> Result<Vec<SubjectRecord>, ProviderError> {
        let mut subjects: Vec<SubjectRecord> = self
            .0
            .values()
            .filter(|s| {
                s.address
                    .postcode
                    .as_deref()
                    .is_some_and(|p| p.starts_with(district))
            })
            .cloned()
            .collect();
        subjects.sort_by(|a, b| a.uprn.cmp(&b.uprn));
        Ok(subjects)
    }
}

struct FakeQuotes {
    quotes: HashMap<String, f64>,
    failing_uprn: Option<String>,
}

#[async_trait]
impl QuoteProvider for FakeQuotes {
    async fn active_quote(&self, uprn: &str) -> Result<Option<f64>, ProviderError> {
        if self.failing_uprn.as_deref() == Some(uprn) {
            return Err(ProviderError::Timeout);
        }
        Ok(self.quotes.get(uprn).copied())
    }
}

struct FakeTransactions(Vec<ComparableTransaction>);

#[async_trait]
impl TransactionProvider for FakeTransactions {
    async fn transactions_in_sector(
        &self,
        _sector: &str,
        _max_age_months: i64,
        _limit: usize,
    ) -> Result<Vec<ComparableTransaction>, ProviderError> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
struct RecordingSink(Mutex<Vec<String>>);

#[async_trait]
impl MetricsSink for RecordingSink {
    async fn upsert_analysis(&self, analysis: &PropertyAnalysis) -> Result<(), StorageError> {
        self.0.lock().await.push(analysis.uprn.clone());
        Ok(())
    }
}

fn subject(uprn: &str, postcode: &str, floor_area: Option<f64>) -> SubjectRecord {
    SubjectRecord {
        uprn: uprn.into(),
        address: StructuredAddress {
            paon: Some("42".into()),
            saon: None,
            street: Some("HIGH STREET".into()),
            town: Some("LONDON".into()),
            postcode: Some(postcode.into()),
        },
        property_type: Some(PropertyType::Terraced),
        floor_area_sqft: floor_area,
        epc_rating: Some(EpcRating::C),
    }
}

fn comparable(postcode: &str, unit_price: f64, age_days: i64) -> ComparableTransaction {
    ComparableTransaction::new(
        None,
        postcode.into(),
        Some(PropertyType::Terraced),
        unit_price * 1000.0,
        1000.0,
        Utc::now().date_naive() - Duration::days(age_days),
    )
}

fn service(
    properties: FakeProperties,
    quotes: FakeQuotes,
    transactions: FakeTransactions,
    sink: Arc<RecordingSink>,
) -> AnalysisService {
    AnalysisService::new(
        Arc::new(properties),
        Arc::new(quotes),
        Arc::new(transactions),
        Some(sink),
        AnalysisConfig::default(),
    )
}

#[tokio::test]
async fn unknown_subject_is_not_an_error() {
    let sink = Arc::new(RecordingSink::default());
    let svc = service(
        FakeProperties(HashMap::new()),
        FakeQuotes {
            quotes: HashMap::new(),
            failing_uprn: None,
        },
        FakeTransactions(Vec::new()),
        sink.clone(),
    );

    let result = svc.analyze_one("100000000000", None).await.unwrap();
    assert!(result.is_none());
    assert!(sink.0.lock().await.is_empty());
}

#[tokio::test]
async fn missing_quote_or_floor_area_skips_analysis() {
    let mut properties = HashMap::new();
    properties.insert("1".to_string(), subject("1", "SW15 6EJ", Some(1000.0)));
    properties.insert("2".to_string(), subject("2", "SW15 6AB", None));

    let mut quotes = HashMap::new();
    // Subject 2 has a quote but no floor area; subject 1 has neither.
    quotes.insert("2".to_string(), 500_000.0);

    let sink = Arc::new(RecordingSink::default());
    let svc = service(
        FakeProperties(properties),
        FakeQuotes {
            quotes,
            failing_uprn: None,
        },
        FakeTransactions(Vec::new()),
        sink.clone(),
    );

    assert!(svc.analyze_one("1", None).await.unwrap().is_none());
    assert!(svc.analyze_one("2", None).await.unwrap().is_none());
    assert!(sink.0.lock().await.is_empty());
}

#[tokio::test]
async fn full_pipeline_scores_and_persists() {
    let mut properties = HashMap::new();
    properties.insert("1".to_string(), subject("1", "SW15 6EJ", Some(1000.0)));

    let mut quotes = HashMap::new();
    quotes.insert("1".to_string(), 430_000.0);

    let comps = vec![
        comparable("SW15 6AA", 550.0, 20),
        comparable("SW15 6AB", 545.0, 40),
        comparable("SW15 6AC", 540.0, 60),
        comparable("SW15 6AD", 535.0, 80),
        comparable("SW15 6AE", 530.0, 100),
    ];

    let sink = Arc::new(RecordingSink::default());
    let svc = service(
        FakeProperties(properties),
        FakeQuotes {
            quotes,
            failing_uprn: None,
        },
        FakeTransactions(comps),
        sink.clone(),
    );

    let analysis = svc
        .analyze_one("1", None)
        .await
        .unwrap()
        .expect("subject is analyzable");

    assert_eq!(analysis.ppsf.asking_ppsf, 430.0);
    assert_eq!(analysis.ppsf.comparable_count, 5);
    let market = analysis.ppsf.market_ppsf.expect("enough comparables");
    assert!(market > 530.0 && market < 550.0);

    // Asking ~20% under a ~540 market with five comparables and an EPC:
    // the full HIGH path.
    assert!(analysis.bargain.undervalued_index >= 0.15);
    assert!(analysis.bargain.confidence >= 0.5);
    assert_eq!(analysis.bargain.priority, Priority::High);
    assert_eq!(
        analysis.bargain.projected_yield,
        Some(0.045) // Terraced base, EPC C adjustment 1.0
    );

    assert_eq!(sink.0.lock().await.as_slice(), ["1"]);
}

#[tokio::test]
async fn batch_isolates_per_subject_failures() {
    let mut properties = HashMap::new();
    properties.insert("1".to_string(), subject("1", "SW15 6EJ", Some(1000.0)));
    properties.insert("2".to_string(), subject("2", "SW15 6AB", Some(1000.0)));
    properties.insert("3".to_string(), subject("3", "SW15 6CD", Some(1000.0)));

    let mut quotes = HashMap::new();
    quotes.insert("1".to_string(), 450_000.0);
    // Subject 2's quote lookup blows up; subject 3 simply has no quote.

    let sink = Arc::new(RecordingSink::default());
    let svc = service(
        FakeProperties(properties),
        FakeQuotes {
            quotes,
            failing_uprn: Some("2".to_string()),
        },
        FakeTransactions(Vec::new()),
        sink.clone(),
    );

    let outcome = svc.analyze_batch("SW15").await.unwrap();

    assert_eq!(outcome.analyses.len(), 1);
    assert_eq!(outcome.analyses[0].uprn, "1");
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.skipped, 1);
}

#[tokio::test]
async fn sqlite_backed_pipeline_end_to_end() {
    let storage = StorageHandle::new(SqliteStorage::new(":memory:").unwrap());

    let make = |uprn: &str, paon: &str, postcode: &str| SubjectRecord {
        uprn: uprn.into(),
        address: StructuredAddress {
            paon: Some(paon.into()),
            saon: None,
            street: Some("HIGH STREET".into()),
            town: Some("LONDON".into()),
            postcode: Some(postcode.into()),
        },
        property_type: Some(PropertyType::Terraced),
        floor_area_sqft: Some(1000.0),
        epc_rating: Some(EpcRating::C),
    };

    storage
        .with(|db| {
            db.save_property(&make("1000", "42", "SW15 6EJ"))?;
            db.save_property(&make("1001", "44", "SW15 6AB"))?;
            db.save_property(&make("1002", "46", "SW15 6CD"))?;
            db.save_property(&make("1003", "48", "SW15 6EF"))?;
            db.save_quote("1000", 450_000.0)
        })
        .await
        .unwrap();

    // Three sector sales resolve against the seeded properties.
    let sales = [
        ("44", "SW15 6AB", 550_000.0, 30),
        ("46", "SW15 6CD", 520_000.0, 60),
        ("48", "SW15 6EF", 480_000.0, 90),
    ];
    for (paon, postcode, price, age_days) in sales {
        let sale = SaleRecord {
            address: StructuredAddress {
                paon: Some(paon.into()),
                saon: None,
                street: Some("HIGH ST".into()),
                town: Some("LONDON".into()),
                postcode: Some(postcode.into()),
            },
            property_type: Some(PropertyType::Terraced),
            price_paid: price,
            transaction_date: Utc::now().date_naive() - Duration::days(age_days),
        };
        let resolved = storage.with(|db| db.record_sale(&sale, 0.7)).await.unwrap();
        assert!(resolved, "sale at {paon} should resolve");
    }

    let svc = AnalysisService::new(
        Arc::new(storage.clone()),
        Arc::new(storage.clone()),
        Arc::new(storage.clone()),
        Some(Arc::new(storage.clone())),
        AnalysisConfig::default(),
    );

    let outcome = svc.analyze_batch("SW15").await.unwrap();
    assert_eq!(outcome.analyses.len(), 1);
    assert_eq!(outcome.failed, 0);

    let stored = storage
        .with(|db| db.get_metrics("1000"))
        .await
        .unwrap()
        .expect("metrics were persisted");

    assert_eq!(stored.asking_ppsf, 450.0);
    let market = stored.market_ppsf.expect("three comparables");
    assert!(market > 480.0 && market < 550.0);
    assert!(stored.undervalued_index > 0.0);
    assert_eq!(stored.priority, Priority::Medium);
    assert_eq!(stored.comparable_count, 3);
}

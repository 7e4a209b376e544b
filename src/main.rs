use std::sync::Arc;

use bargain_scout::analyzer::AnalysisService;
use bargain_scout::config::{AppConfig, RegionConfig, load_config};
use bargain_scout::provider::LandRegistryClient;
use bargain_scout::storage::{SqliteStorage, StorageHandle};
use chrono::{Duration as ChronoDuration, Utc};
use futures::future::join_all;
use tokio::time::{Duration, sleep};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load configuration from file
    let config: Arc<AppConfig> = match load_config("config.json") {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            error!("Config load error: {}", e);
            return;
        }
    };

    // Initialize storage (SQLite) with async access
    let storage = match SqliteStorage::new(&config.database_path) {
        Ok(s) => StorageHandle::new(s),
        Err(e) => {
            error!("Failed to initialize storage: {:?}", e);
            return;
        }
    };

    let client = match LandRegistryClient::new(
        &config.land_registry_endpoint,
        config.request_timeout_seconds,
    ) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Failed to build land registry client: {}", e);
            return;
        }
    };

    let service = Arc::new(AnalysisService::new(
        Arc::new(storage.clone()),
        Arc::new(storage.clone()),
        Arc::new(storage.clone()),
        Some(Arc::new(storage.clone())),
        config.analysis.clone(),
    ));

    info!("bargain-scout started, {} region(s) configured", config.regions.len());

    // Main processing loop
    loop {
        info!("Entering main loop...");

        let tasks: Vec<_> = config
            .regions
            .iter()
            .map(|region| {
                process_region(
                    region,
                    client.clone(),
                    storage.clone(),
                    service.clone(),
                    config.clone(),
                )
            })
            .collect();
        join_all(tasks).await;

        info!(
            "Waiting for timer ({}s) or shutdown...",
            config.check_interval_seconds
        );
        tokio::select! {
            _ = sleep(Duration::from_secs(config.check_interval_seconds)) => {
                info!("Timer triggered.");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested, letting in-flight work finish.");
                break;
            }
        }
    }
}

/// Runs one region through the full pipeline: fetch recent Land Registry
/// sales, resolve them against known properties, then re-analyze every
/// analyzable subject in the district.
async fn process_region(
    region: &RegionConfig,
    client: Arc<LandRegistryClient>,
    storage: StorageHandle,
    service: Arc<AnalysisService>,
    config: Arc<AppConfig>,
) {
    info!("Processing region: {}", region.district);

    let min_date = Utc::now().date_naive() - ChronoDuration::days(region.max_age_months * 30);
    let sales = match client
        .query_transactions(&region.district, None, Some(min_date), region.transaction_limit)
        .await
    {
        Ok(sales) => sales,
        Err(e) => {
            warn!("Land registry query failed for {}: {}", region.district, e);
            return;
        }
    };
    info!("Fetched {} sales for {}", sales.len(), region.district);

    let threshold = config.analysis.match_threshold;
    let mut resolved = 0usize;
    for sale in &sales {
        match storage.with(|db| db.record_sale(sale, threshold)).await {
            Ok(true) => resolved += 1,
            Ok(false) => {}
            Err(e) => warn!("Failed to record sale: {:?}", e),
        }
    }
    info!(
        "Recorded {} sales ({} resolved to known properties)",
        sales.len(),
        resolved
    );

    let outcome = match service.analyze_batch(&region.district).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("Batch analysis failed for {}: {}", region.district, e);
            return;
        }
    };

    info!(
        "Region {}: {} analyzed, {} skipped, {} failed",
        region.district,
        outcome.analyses.len(),
        outcome.skipped,
        outcome.failed
    );

    match storage.with(|db| db.top_opportunities(5)).await {
        Ok(top) => {
            for metrics in top {
                info!(
                    "Opportunity {}: {:.1}% below market ({} comparables, confidence {:.2})",
                    metrics.uprn,
                    metrics.undervalued_index * 100.0,
                    metrics.comparable_count,
                    metrics.confidence
                );
            }
        }
        Err(e) => warn!("Failed to list opportunities: {:?}", e),
    }

    info!("Finished processing region: {}", region.district);
}

//! Application state wiring.
//!
//! Everything is constructor-injected: pool → repositories → registry →
//! services → orchestrator. No globals; handlers receive the state as an
//! axum extractor.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use quotehub_core::calendar::CalendarService;
use quotehub_core::config::AppConfig;
use quotehub_core::gaps::GapEngine;
use quotehub_core::market_data::MarketDataService;
use quotehub_core::pipeline::{
    DownloadPlanner, PipelineConfig, PipelineOrchestrator, ProgressJournal,
};
use quotehub_core::quotes::QuoteQueryService;
use quotehub_core::reports::ReportWriter;
use quotehub_core::store::{
    CalendarStore, InstrumentStore, MaintenanceStore, QuoteStore, UpdateRecordStore,
};
use quotehub_market_data::provider::{EastMoneyAdapter, TushareAdapter, YahooAdapter};
use quotehub_market_data::{ProviderAdapter, ProviderRegistry};
use quotehub_storage_sqlite::calendar::CalendarRepository;
use quotehub_storage_sqlite::db::{init, spawn_writer};
use quotehub_storage_sqlite::instruments::InstrumentRepository;
use quotehub_storage_sqlite::maintenance::MaintenanceRepository;
use quotehub_storage_sqlite::quotes::QuoteRepository;
use quotehub_storage_sqlite::updates::UpdateRecordRepository;

/// The shared application state.
pub struct AppState {
    pub config: AppConfig,
    pub query: Arc<QuoteQueryService>,
    pub market_data: Arc<MarketDataService>,
    pub calendar: Arc<CalendarService>,
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub gap_engine: Arc<GapEngine>,
    pub instruments: Arc<dyn InstrumentStore>,
    pub quotes: Arc<dyn QuoteStore>,
    pub calendar_store: Arc<dyn CalendarStore>,
    pub updates: Arc<dyn UpdateRecordStore>,
    pub maintenance: Arc<dyn MaintenanceStore>,
}

/// Build every component from the configuration. Must run inside a tokio
/// runtime (the writer actor and scheduler spawn tasks).
pub fn build_state(config: AppConfig) -> anyhow::Result<Arc<AppState>> {
    let pool = init(&config.database.db_path)
        .with_context(|| format!("opening database {}", config.database.db_path))?;
    let writer = spawn_writer(pool.clone());

    let instruments: Arc<dyn InstrumentStore> =
        Arc::new(InstrumentRepository::new(pool.clone(), writer.clone()));
    let quotes: Arc<dyn QuoteStore> =
        Arc::new(QuoteRepository::new(pool.clone(), writer.clone()));
    let calendar_repo = Arc::new(CalendarRepository::new(pool.clone(), writer.clone()));
    let updates: Arc<dyn UpdateRecordStore> =
        Arc::new(UpdateRecordRepository::new(pool.clone(), writer.clone()));
    let maintenance: Arc<dyn MaintenanceStore> = Arc::new(MaintenanceRepository::new(
        pool,
        config.database.db_path.clone(),
    ));

    let registry = Arc::new(ProviderRegistry::new(
        build_adapters(&config),
        config.routing_config()?,
    ));

    let calendar = Arc::new(CalendarService::new(calendar_repo.clone()));
    let market_data = Arc::new(MarketDataService::new(
        registry,
        instruments.clone(),
        calendar_repo.clone(),
        calendar.clone(),
    ));

    let gap_engine = Arc::new(GapEngine::new(
        instruments.clone(),
        quotes.clone(),
        calendar.clone(),
        market_data.clone(),
    ));

    let planner = DownloadPlanner::new(calendar.clone(), config.data.download_chunk_days);
    let journal = ProgressJournal::new(
        std::path::Path::new(&config.data.data_dir).join("download_progress.json"),
    );
    let reports = ReportWriter::new(&config.data.data_dir);
    let pipeline_config = PipelineConfig {
        batch_size: config.data.batch_size,
        chunk_days: config.data.download_chunk_days,
        max_concurrent: config.data.max_concurrent,
        ..PipelineConfig::default()
    };

    let orchestrator = Arc::new(PipelineOrchestrator::new(
        market_data.clone(),
        planner,
        instruments.clone(),
        quotes.clone(),
        updates.clone(),
        maintenance.clone(),
        gap_engine.clone(),
        journal,
        reports,
        pipeline_config,
    ));

    let query = Arc::new(QuoteQueryService::new(instruments.clone(), quotes.clone()));

    Ok(Arc::new(AppState {
        config,
        query,
        market_data,
        calendar,
        orchestrator,
        gap_engine,
        instruments,
        quotes,
        calendar_store: calendar_repo,
        updates,
        maintenance,
    }))
}

/// Instantiate the adapters for every enabled source.
fn build_adapters(config: &AppConfig) -> Vec<Arc<dyn ProviderAdapter>> {
    let mut adapters: Vec<Arc<dyn ProviderAdapter>> = Vec::new();

    if let Some(source) = config.source("tushare") {
        let token = source.api_token.clone().unwrap_or_default();
        if token.is_empty() {
            warn!("tushare enabled without an API token; calls will be rejected upstream");
        }
        adapters.push(Arc::new(TushareAdapter::new(token, source.rate_limit())));
    }
    if let Some(source) = config.source("eastmoney") {
        adapters.push(Arc::new(EastMoneyAdapter::new(source.rate_limit())));
    }
    if let Some(source) = config.source("yahoo") {
        match YahooAdapter::new(source.rate_limit()) {
            Ok(adapter) => adapters.push(Arc::new(adapter)),
            Err(e) => warn!("Yahoo adapter unavailable: {}", e),
        }
    }

    info!("Initialized {} provider adapters", adapters.len());
    adapters
}

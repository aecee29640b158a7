//! Data management endpoints: downloads, updates, progress, validation.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use quotehub_core::pipeline::DownloadSpec;
use quotehub_core::store::QuoteFilter;
use quotehub_core::time::session_now;
use quotehub_core::{Error as CoreError, InstrumentId};

use crate::error::ApiResult;
use crate::state::AppState;

use super::parse_exchanges;

#[derive(Debug, Deserialize)]
struct DownloadRequest {
    exchanges: Option<Vec<String>>,
    /// A named exchange group from the config's market presets.
    preset: Option<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    quality_threshold: Option<f64>,
    resume: Option<bool>,
    force_update_calendar: Option<bool>,
}

/// Enqueue a historical download. Returns an acknowledgement with the
/// parameters; progress is observable at `/data/download/progress`.
async fn download_historical(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DownloadRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    if state.orchestrator.is_running() {
        return Err(CoreError::InvalidInput("download already in progress".into()).into());
    }

    let exchanges = match &request.preset {
        Some(preset) => state
            .config
            .data
            .market_presets
            .get(preset)
            .cloned()
            .ok_or_else(|| CoreError::InvalidInput(format!("unknown preset {:?}", preset)))?,
        None => parse_exchanges(&state, request.exchanges.as_ref())?,
    };

    let spec = DownloadSpec {
        exchanges: exchanges.clone(),
        start: request.start_date,
        end: request.end_date,
        quality_threshold: request.quality_threshold,
        resume: request.resume.unwrap_or(true),
        force_update_calendar: request.force_update_calendar,
    };

    let parameters = json!({
        "exchanges": exchanges.iter().map(|e| e.code()).collect::<Vec<_>>(),
        "start_date": request.start_date,
        "end_date": request.end_date,
        "resume": spec.resume,
    });

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator.run(spec).await {
            tracing::error!("Background download failed: {}", e);
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "success": true,
            "task_type": "historical_download",
            "parameters": parameters,
            "timestamp": session_now().to_rfc3339(),
        })),
    ))
}

#[derive(Debug, Deserialize)]
struct UpdateRequest {
    exchanges: Option<Vec<String>>,
    target_date: Option<NaiveDate>,
}

/// Enqueue an incremental daily update.
async fn update_data(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    if state.orchestrator.is_running() {
        return Err(CoreError::InvalidInput("download already in progress".into()).into());
    }

    let exchanges = parse_exchanges(&state, request.exchanges.as_ref())?;
    let parameters = json!({
        "exchanges": exchanges.iter().map(|e| e.code()).collect::<Vec<_>>(),
        "target_date": request.target_date,
    });

    let orchestrator = state.orchestrator.clone();
    let target = request.target_date;
    tokio::spawn(async move {
        if let Err(e) = orchestrator.run_daily_update(exchanges, target).await {
            tracing::error!("Background daily update failed: {}", e);
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "success": true,
            "task_type": "daily_update",
            "parameters": parameters,
            "timestamp": session_now().to_rfc3339(),
        })),
    ))
}

/// Orchestrator progress snapshot.
async fn download_progress(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<serde_json::Value>> {
    let progress = state.orchestrator.progress_snapshot();
    let recent_errors: Vec<&String> = progress.errors.iter().rev().take(10).collect();

    Ok(Json(json!({
        "batch_id": progress.batch_id,
        "is_running": state.orchestrator.is_running(),
        "total_instruments": progress.total_instruments,
        "processed_instruments": progress.processed_instruments,
        "successful_downloads": progress.successful_downloads,
        "failed_downloads": progress.failed_downloads,
        "total_quotes": progress.total_quotes,
        "quality_issues": progress.quality_issues,
        "current_exchange": progress.current_exchange,
        "current_batch": progress.current_batch,
        "total_batches": progress.total_batches,
        "progress_percentage": progress.progress_percentage(),
        "success_rate": progress.success_rate(),
        "rate_quotes_per_second": progress.rate(),
        "eta_seconds": progress.eta_seconds(),
        "elapsed_seconds": progress.elapsed_seconds(),
        "recent_errors": recent_errors,
    })))
}

/// Cancel the in-flight run, if any.
async fn cancel_download(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<serde_json::Value>> {
    state.orchestrator.cancel();
    Ok(Json(json!({
        "success": true,
        "was_running": state.orchestrator.is_running(),
    })))
}

#[derive(Debug, Deserialize)]
struct ValidateRequest {
    instrument_id: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

/// Validate stored rows for one instrument and window: invariant
/// violations, expected-vs-stored coverage, quality distribution.
async fn validate_data(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ValidateRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let instrument_id = InstrumentId::parse_any(&request.instrument_id)
        .map_err(|e| CoreError::InvalidInput(e.to_string()))?;

    let rows = state.quotes.query(&QuoteFilter::range(
        instrument_id.clone(),
        request.start_date,
        request.end_date,
    ))?;

    let mut violations = 0usize;
    for row in &rows {
        let body_high = row.open.max(row.close);
        let body_low = row.open.min(row.close);
        let ordered = row.high >= body_high
            && body_low >= row.low
            && row.low >= rust_decimal::Decimal::ZERO;
        let score_ok = (0.0..=1.0).contains(&row.quality_score);
        if !ordered || row.volume < 0 || !score_ok {
            violations += 1;
        }
    }

    let expected = state
        .calendar
        .trading_days_in(instrument_id.exchange(), request.start_date, request.end_date)
        .await
        .map(|days| days.len())
        .unwrap_or(0);

    let mean_score = if rows.is_empty() {
        None
    } else {
        Some(rows.iter().map(|r| r.quality_score).sum::<f64>() / rows.len() as f64)
    };
    let latest_stored_day = state.quotes.latest_day(&instrument_id)?;

    Ok(Json(json!({
        "instrument_id": instrument_id.canonical(),
        "start_date": request.start_date,
        "end_date": request.end_date,
        "stored_rows": rows.len(),
        "expected_trading_days": expected,
        "missing_days": expected.saturating_sub(rows.len()),
        "invariant_violations": violations,
        "mean_quality_score": mean_score,
        "latest_stored_day": latest_stored_day,
        "valid": violations == 0,
    })))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/data/download/historical", post(download_historical))
        .route("/data/update", post(update_data))
        .route("/data/download/progress", get(download_progress))
        .route("/data/download/cancel", post(cancel_download))
        .route("/data/validate", post(validate_data))
}

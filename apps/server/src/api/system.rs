//! Health, statistics and system status endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use quotehub_core::store::StoreStats;
use quotehub_core::time::session_now;

use crate::error::ApiResult;
use crate::state::AppState;

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": session_now().to_rfc3339(),
    }))
}

async fn stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<StoreStats>> {
    Ok(Json(state.maintenance.snapshot_stats()?))
}

async fn system_status(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<serde_json::Value>> {
    let progress = state.orchestrator.progress_snapshot();
    let providers = state.market_data.health_check_all().await;
    let history = state.config.monitor.max_history_size.min(20) as i64;
    let recent_updates = state.updates.recent(history)?;
    let stats = state.maintenance.snapshot_stats()?;

    Ok(Json(json!({
        "timestamp": session_now().to_rfc3339(),
        "download": {
            "is_running": state.orchestrator.is_running(),
            "batch_id": progress.batch_id,
            "processed_instruments": progress.processed_instruments,
            "total_instruments": progress.total_instruments,
            "progress_percentage": progress.progress_percentage(),
        },
        "providers": providers,
        "store": {
            "total_instruments": stats.total_instruments,
            "total_quotes": stats.total_quotes,
            "earliest_quote_day": stats.earliest_quote_day,
            "latest_quote_day": stats.latest_quote_day,
        },
        "recent_updates": recent_updates,
    })))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/system/status", get(system_status))
}

//! Gap discovery and repair endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use quotehub_core::gaps::{Gap, GapFillFilter, GapFillOutcome, GapSeverity};
use quotehub_core::time::session_today;
use quotehub_core::{Error as CoreError, InstrumentId};

use crate::error::ApiResult;
use crate::state::AppState;

use super::parse_exchanges;

fn parse_severity(s: &str) -> Result<GapSeverity, CoreError> {
    match s {
        "low" => Ok(GapSeverity::Low),
        "medium" => Ok(GapSeverity::Medium),
        "high" => Ok(GapSeverity::High),
        "critical" => Ok(GapSeverity::Critical),
        other => Err(CoreError::InvalidInput(format!(
            "unknown severity {:?}",
            other
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct GapsParams {
    exchange: Option<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    severity: Option<String>,
}

async fn list_gaps(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GapsParams>,
) -> ApiResult<Json<Vec<Gap>>> {
    let exchange_list = params.exchange.map(|e| vec![e]);
    let exchanges = parse_exchanges(&state, exchange_list.as_ref())?;
    let end = params.end_date.unwrap_or_else(session_today);

    let mut gaps = state
        .gap_engine
        .detect(&exchanges, params.start_date, end)
        .await?;

    if let Some(severity) = params.severity.as_deref() {
        let severity = parse_severity(severity)?;
        gaps.retain(|g| g.severity == severity);
    }

    Ok(Json(gaps))
}

#[derive(Debug, Deserialize)]
struct FillRequest {
    exchanges: Option<Vec<String>>,
    instrument_ids: Option<Vec<String>>,
    severities: Option<Vec<String>>,
    gap_types: Option<Vec<String>>,
    max_gap_days: Option<i64>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    dry_run: Option<bool>,
}

async fn fill_gaps(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FillRequest>,
) -> ApiResult<Json<GapFillOutcome>> {
    let exchanges = match &request.exchanges {
        Some(codes) => Some(parse_exchanges(&state, Some(codes))?),
        None => None,
    };
    let instrument_ids = request
        .instrument_ids
        .map(|ids| {
            ids.iter()
                .map(|id| {
                    InstrumentId::parse_any(id)
                        .map_err(|e| CoreError::InvalidInput(e.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;
    let severities = request
        .severities
        .map(|list| {
            list.iter()
                .map(|s| parse_severity(s))
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;

    let filter = GapFillFilter {
        exchanges,
        instrument_ids,
        severities,
        gap_types: request.gap_types,
        max_days: request.max_gap_days,
        start: request.start_date,
        end: request.end_date,
        dry_run: request.dry_run.unwrap_or(false),
    };

    Ok(Json(state.gap_engine.fill(&filter).await?))
}

/// Quality report: gap totals by severity and exchange, plus the worst
/// affected instruments.
async fn gaps_report(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GapsParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let exchange_list = params.exchange.map(|e| vec![e]);
    let exchanges = parse_exchanges(&state, exchange_list.as_ref())?;
    let end = params.end_date.unwrap_or_else(session_today);

    let gaps = state
        .gap_engine
        .detect(&exchanges, params.start_date, end)
        .await?;

    let mut by_severity: BTreeMap<&str, usize> = BTreeMap::new();
    let mut by_exchange: BTreeMap<String, usize> = BTreeMap::new();
    let mut missing_by_instrument: BTreeMap<String, usize> = BTreeMap::new();
    for gap in &gaps {
        *by_severity.entry(gap.severity.as_str()).or_default() += 1;
        *by_exchange
            .entry(gap.exchange.code().to_string())
            .or_default() += 1;
        *missing_by_instrument
            .entry(gap.instrument_id.canonical())
            .or_default() += gap.missing_dates.len();
    }

    let mut top_affected: Vec<(String, usize)> = missing_by_instrument.into_iter().collect();
    top_affected.sort_by(|a, b| b.1.cmp(&a.1));
    top_affected.truncate(10);

    Ok(Json(json!({
        "generated_at": quotehub_core::time::session_now().to_rfc3339(),
        "total_gaps": gaps.len(),
        "by_severity": by_severity,
        "by_exchange": by_exchange,
        "top_affected": top_affected
            .into_iter()
            .map(|(id, missing)| json!({ "instrument_id": id, "missing_days": missing }))
            .collect::<Vec<_>>(),
    })))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/gaps", get(list_gaps))
        .route("/gaps/fill", post(fill_gaps))
        .route("/gaps/report", get(gaps_report))
}

//! Quote endpoints.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;

use quotehub_core::models::DailyQuote;
use quotehub_core::quotes::{QuotePayload, QuoteRequest, ResponseFormat};
use quotehub_core::store::Page;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct DailyParams {
    instrument_id: Option<String>,
    symbol: Option<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    tradestatus: Option<i32>,
    min_volume: Option<i64>,
    min_quality_score: Option<f64>,
    include_suspended: Option<bool>,
    include_quality: Option<bool>,
    return_format: Option<ResponseFormat>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn daily_quotes(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DailyParams>,
) -> ApiResult<Response> {
    let page = params.limit.map(|limit| Page {
        limit: Some(limit.clamp(1, 10_000)),
        offset: params.offset.unwrap_or(0).max(0),
    });

    let request = QuoteRequest {
        instrument_id: params.instrument_id,
        symbol: params.symbol,
        start: params.start_date,
        end: params.end_date,
        tradestatus: params.tradestatus,
        min_volume: params.min_volume,
        min_quality_score: params.min_quality_score,
        include_suspended: params.include_suspended.unwrap_or(true),
        include_quality: params.include_quality.unwrap_or(true),
        format: params.return_format.unwrap_or_default(),
        page,
    };

    match state.query.get_quotes(&request)? {
        QuotePayload::Rows(body) => Ok(Json(body).into_response()),
        QuotePayload::Csv(text) => Ok((
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
            text,
        )
            .into_response()),
    }
}

#[derive(Debug, Deserialize)]
struct LatestParams {
    /// Comma-separated canonical ids.
    instrument_ids: String,
    lookback_days: Option<i64>,
}

async fn latest_quotes(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LatestParams>,
) -> ApiResult<Json<Vec<DailyQuote>>> {
    let ids: Vec<String> = params
        .instrument_ids
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    Ok(Json(
        state.query.get_latest_quotes(&ids, params.lookback_days)?,
    ))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/quotes/daily", get(daily_quotes))
        .route("/quotes/latest", get(latest_quotes))
}

//! Trading calendar endpoints.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use quotehub_core::models::TradingCalendarEntry;
use quotehub_core::time::session_today;

use crate::error::ApiResult;
use crate::state::AppState;

use super::parse_exchange;

#[derive(Debug, Deserialize)]
struct CalendarParams {
    exchange: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    /// When true, only open days are returned.
    only_trading: Option<bool>,
}

async fn trading_calendar(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CalendarParams>,
) -> ApiResult<Json<Vec<TradingCalendarEntry>>> {
    let exchange = parse_exchange(&params.exchange)?;

    // Full rows straight from the store so closure reasons survive. An
    // unknown window reads as empty here; refreshes happen on the write
    // paths.
    let rows = state
        .calendar_store
        .entries(exchange, params.start_date, params.end_date)?;
    let rows = if params.only_trading.unwrap_or(false) {
        rows.into_iter().filter(|r| r.is_trading_day).collect()
    } else {
        rows
    };
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
struct DayParams {
    exchange: String,
    date: Option<NaiveDate>,
}

async fn next_trading_day(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DayParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let exchange = parse_exchange(&params.exchange)?;
    let date = params.date.unwrap_or_else(session_today);
    let next = state.calendar.next_trading_day(exchange, date).await?;

    Ok(Json(json!({
        "exchange": exchange.code(),
        "date": date,
        "next_trading_day": next,
    })))
}

async fn previous_trading_day(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DayParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let exchange = parse_exchange(&params.exchange)?;
    let date = params.date.unwrap_or_else(session_today);
    let previous = state.calendar.previous_trading_day(exchange, date).await?;

    Ok(Json(json!({
        "exchange": exchange.code(),
        "date": date,
        "previous_trading_day": previous,
    })))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/calendar/trading", get(trading_calendar))
        .route("/calendar/trading/next", get(next_trading_day))
        .route("/calendar/trading/previous", get(previous_trading_day))
}

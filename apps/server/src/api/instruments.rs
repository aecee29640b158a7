//! Instrument endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;

use quotehub_core::models::{Instrument, InstrumentStatus};
use quotehub_core::quotes::InstrumentQuery;
use quotehub_core::store::{InstrumentFilter, InstrumentSort, Page};

use crate::error::ApiResult;
use crate::state::AppState;

use super::parse_exchange;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
struct InstrumentsParams {
    exchange: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    industry: Option<String>,
    sector: Option<String>,
    market: Option<String>,
    status: Option<String>,
    is_active: Option<bool>,
    is_st: Option<bool>,
    listed_after: Option<NaiveDate>,
    listed_before: Option<NaiveDate>,
    sort: Option<InstrumentSort>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn list_instruments(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InstrumentsParams>,
) -> ApiResult<Json<Vec<Instrument>>> {
    let exchange = params
        .exchange
        .as_deref()
        .map(parse_exchange)
        .transpose()?;

    let filter = InstrumentFilter {
        exchange,
        kind: params.kind,
        industry: params.industry,
        sector: params.sector,
        market: params.market,
        status: params.status.as_deref().map(InstrumentStatus::parse),
        is_active: params.is_active,
        is_st: params.is_st,
        listed_after: params.listed_after,
        listed_before: params.listed_before,
    };
    let page = Page {
        limit: Some(params.limit.unwrap_or(100).clamp(1, 1_000)),
        offset: params.offset.unwrap_or(0).max(0),
    };

    let instruments = state.query.get_instruments(&InstrumentQuery {
        filter,
        sort: params.sort.unwrap_or_default(),
        page,
    })?;
    Ok(Json(instruments))
}

async fn get_instrument(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Instrument>> {
    Ok(Json(state.query.get_instrument_by_id(&id)?))
}

async fn get_instrument_by_symbol(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> ApiResult<Json<Instrument>> {
    Ok(Json(state.query.get_instrument_by_symbol(&symbol)?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/instruments", get(list_instruments))
        .route("/instruments/{id}", get(get_instrument))
        .route("/instruments/symbol/{symbol}", get(get_instrument_by_symbol))
}

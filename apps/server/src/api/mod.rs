//! HTTP query façade, versioned at `/api/v1`.

mod calendar;
mod data;
mod gaps;
mod instruments;
mod quotes;
mod system;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .merge(instruments::router())
        .merge(quotes::router())
        .merge(data::router())
        .merge(gaps::router())
        .merge(calendar::router())
        .merge(system::router());

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Parse a canonical exchange code from a query/body string.
pub(crate) fn parse_exchange(code: &str) -> Result<quotehub_core::Exchange, crate::error::ApiError> {
    quotehub_core::Exchange::from_code(code)
        .map_err(|e| quotehub_core::Error::InvalidInput(e.to_string()).into())
}

/// Parse a comma-separated or repeated exchange list; `None` means the
/// caller wants every routed exchange.
pub(crate) fn parse_exchanges(
    state: &AppState,
    codes: Option<&Vec<String>>,
) -> Result<Vec<quotehub_core::Exchange>, crate::error::ApiError> {
    match codes {
        Some(codes) if !codes.is_empty() => codes
            .iter()
            .map(|c| parse_exchange(c))
            .collect(),
        _ => Ok(state
            .config
            .routing_config()
            .map(|r| r.tables.keys().copied().collect())
            .unwrap_or_else(|_| vec![quotehub_core::Exchange::Sse, quotehub_core::Exchange::Szse])),
    }
}

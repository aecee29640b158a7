//! The provider adapter trait.
//!
//! Implement [`ProviderAdapter`] to add support for a new upstream quote
//! source. The registry consults the adapter's capabilities and the routing
//! tables to decide when to call it; the adapter itself only knows how to
//! translate between its API and the crate's row types.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::errors::MarketDataError;
use crate::models::{CalendarDay, Exchange, InstrumentId, ProviderInstrument, RawDailyQuote};

use super::capabilities::{ProviderCapabilities, RateLimit};

/// A single upstream data source.
///
/// Optional capabilities default to `NotSupported`; a backup-only source
/// implements just [`fetch_daily`](Self::fetch_daily).
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Unique identifier, a constant like `"TUSHARE"`.
    ///
    /// Used for logging, rate limiting and circuit breaker tracking.
    fn id(&self) -> &'static str;

    /// What this provider can do.
    fn capabilities(&self) -> ProviderCapabilities;

    /// Rate limiting and retry configuration.
    fn rate_limit(&self) -> RateLimit;

    /// Enumerate the instruments listed on an exchange.
    async fn list_instruments(
        &self,
        exchange: Exchange,
    ) -> Result<Vec<ProviderInstrument>, MarketDataError> {
        let _ = exchange;
        Err(MarketDataError::NotSupported {
            operation: "list_instruments",
            provider: self.id().to_string(),
        })
    }

    /// Fetch daily bars for one instrument over an inclusive date range.
    ///
    /// `symbol` is the provider-facing symbol (which may differ from the
    /// canonical one); rows must come back keyed by the canonical
    /// `instrument_id` and ordered by day ascending.
    async fn fetch_daily(
        &self,
        instrument_id: &InstrumentId,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawDailyQuote>, MarketDataError>;

    /// Fetch the trading calendar for an exchange over an inclusive range.
    async fn fetch_calendar(
        &self,
        exchange: Exchange,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CalendarDay>, MarketDataError> {
        let _ = (exchange, start, end);
        Err(MarketDataError::NotSupported {
            operation: "fetch_calendar",
            provider: self.id().to_string(),
        })
    }

    /// Cheap liveness probe. The default assumes healthy.
    async fn health_check(&self) -> Result<(), MarketDataError> {
        Ok(())
    }
}

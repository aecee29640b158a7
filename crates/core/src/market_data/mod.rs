//! Store-aware face of the provider registry.
//!
//! The registry routes and fails over; this service adds the policies that
//! need the store: the instrument-list cache rule, and calendar refreshes
//! that upsert into the store and invalidate the calendar memo.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use log::{info, warn};

use quotehub_market_data::{Exchange, InstrumentId, ProviderRegistry, RawDailyQuote};

use crate::calendar::CalendarService;
use crate::constants::{INSTRUMENT_CACHE_MAX_AGE_HOURS, INSTRUMENT_CACHE_MIN_ROWS};
use crate::errors::Result;
use crate::models::{Instrument, TradingCalendarEntry};
use crate::store::{CalendarStore, InstrumentFilter, InstrumentSort, InstrumentStore, Page};

/// Market data operations that combine providers with the store.
pub struct MarketDataService {
    registry: Arc<ProviderRegistry>,
    instruments: Arc<dyn InstrumentStore>,
    calendar_store: Arc<dyn CalendarStore>,
    calendar: Arc<CalendarService>,
}

impl MarketDataService {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        instruments: Arc<dyn InstrumentStore>,
        calendar_store: Arc<dyn CalendarStore>,
        calendar: Arc<CalendarService>,
    ) -> Self {
        Self {
            registry,
            instruments,
            calendar_store,
            calendar,
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// The instruments of an exchange, served from the store when the
    /// cache is trustworthy.
    ///
    /// Cache rule: at least [`INSTRUMENT_CACHE_MIN_ROWS`] stored rows whose
    /// newest `updated_at` is younger than 24 hours — otherwise refresh
    /// from the primary provider. A failed refresh falls back to whatever
    /// the store has.
    pub async fn instrument_list(
        &self,
        exchange: Exchange,
        force_refresh: bool,
    ) -> Result<Vec<Instrument>> {
        if !force_refresh {
            let count = self.instruments.count_by_exchange(exchange)?;
            if count >= INSTRUMENT_CACHE_MIN_ROWS {
                let fresh_enough = self
                    .instruments
                    .latest_update(exchange)?
                    .map(|at| Utc::now() - at < Duration::hours(INSTRUMENT_CACHE_MAX_AGE_HOURS))
                    .unwrap_or(false);
                if fresh_enough {
                    info!("Using cached instrument list for {} ({} rows)", exchange, count);
                    return self.stored_list(exchange);
                }
                info!("Instrument cache for {} is stale, refreshing", exchange);
            } else if count > 0 {
                warn!(
                    "Instrument cache for {} has only {} rows, refreshing",
                    exchange, count
                );
            }
        }

        let listed = self.registry.list_instruments(exchange).await;
        if listed.is_empty() {
            warn!(
                "Provider listing for {} unavailable, serving stored instruments",
                exchange
            );
            return self.stored_list(exchange);
        }

        let instruments: Vec<Instrument> =
            listed.into_iter().map(Instrument::from_provider).collect();
        let written = self.instruments.upsert_instruments(&instruments).await?;
        info!("Refreshed {} instruments for {}", written, exchange);

        self.stored_list(exchange)
    }

    fn stored_list(&self, exchange: Exchange) -> Result<Vec<Instrument>> {
        self.instruments.list(
            &InstrumentFilter::active_on(exchange),
            InstrumentSort::Symbol,
            Page::all(),
        )
    }

    /// Daily bars through the routing/failover chain.
    pub async fn fetch_daily(
        &self,
        instrument_id: &InstrumentId,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawDailyQuote>> {
        Ok(self
            .registry
            .fetch_daily(instrument_id, symbol, start, end)
            .await?)
    }

    /// Refresh the stored trading calendar from the primary provider and
    /// invalidate the in-process memo. Returns the rows written.
    pub async fn update_trading_calendar(
        &self,
        exchange: Exchange,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<usize> {
        let days = self.registry.fetch_calendar(exchange, start, end).await;
        if days.is_empty() {
            warn!("Calendar refresh for {} returned nothing", exchange);
            return Ok(0);
        }

        let source = self
            .registry
            .routing()
            .table(exchange)
            .map(|t| t.primary.clone())
            .unwrap_or_default();
        let entries: Vec<TradingCalendarEntry> = days
            .into_iter()
            .map(|d| TradingCalendarEntry::from_provider(d, &source))
            .collect();

        let written = self.calendar_store.upsert_calendar(&entries).await?;
        self.calendar.invalidate(exchange).await;
        info!("Updated {} calendar rows for {}", written, exchange);
        Ok(written)
    }

    /// Probe every provider.
    pub async fn health_check_all(&self) -> HashMap<String, bool> {
        self.registry.health_check_all().await
    }
}

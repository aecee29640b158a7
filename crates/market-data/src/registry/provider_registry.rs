//! Provider registry: routing, failover, rate limiting, validation.
//!
//! The registry is the only caller of provider adapters. For each request
//! it walks the exchange's routing chain (primary, then backups), applying
//! per-provider rate limits, bounded-backoff retries, circuit breaking and
//! the payload gate. The registry never invents data: when every routed
//! provider comes back empty, the result is empty.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use log::{debug, info, warn};

use super::{CircuitBreaker, PayloadValidator, RateLimiter, RoutingConfig};
use crate::errors::{MarketDataError, RetryClass};
use crate::models::{CalendarDay, Exchange, InstrumentId, ProviderInstrument, RawDailyQuote};
use crate::provider::ProviderAdapter;

/// Upper bound for a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Deadline for a single health probe.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Orchestrates all upstream providers.
pub struct ProviderRegistry {
    providers: HashMap<&'static str, Arc<dyn ProviderAdapter>>,
    routing: RoutingConfig,
    rate_limiter: RateLimiter,
    circuit_breaker: CircuitBreaker,
    validator: PayloadValidator,
}

impl ProviderRegistry {
    /// Build a registry. Rate limits are taken from each adapter's
    /// declared [`rate_limit`](ProviderAdapter::rate_limit).
    pub fn new(providers: Vec<Arc<dyn ProviderAdapter>>, routing: RoutingConfig) -> Self {
        let rate_limiter = RateLimiter::new();
        let mut by_id = HashMap::new();
        for provider in providers {
            rate_limiter.configure(provider.id(), provider.rate_limit());
            by_id.insert(provider.id(), provider);
        }

        Self {
            providers: by_id,
            routing,
            rate_limiter,
            circuit_breaker: CircuitBreaker::new(),
            validator: PayloadValidator::new(),
        }
    }

    pub fn routing(&self) -> &RoutingConfig {
        &self.routing
    }

    pub fn provider_ids(&self) -> Vec<&'static str> {
        self.providers.keys().copied().collect()
    }

    /// Fetch daily bars with failover.
    ///
    /// Tries the exchange's primary, then each backup in order. The first
    /// provider returning a validated non-empty batch wins. A provider
    /// coming back empty is not an error; if nobody errors and nobody has
    /// rows, the result is `Ok(vec![])`.
    pub async fn fetch_daily(
        &self,
        instrument_id: &InstrumentId,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawDailyQuote>, MarketDataError> {
        let exchange = instrument_id.exchange();
        let table = self
            .routing
            .table(exchange)
            .ok_or(MarketDataError::NoProvidersForExchange(exchange))?;

        let mut last_error: Option<MarketDataError> = None;
        let mut saw_clean_empty = false;

        for provider_id in table.chain() {
            let adapter = match self.daily_capable(provider_id, exchange) {
                Some(adapter) => adapter,
                None => continue,
            };

            if !self.circuit_breaker.is_allowed(provider_id) {
                debug!("Circuit open for '{}', skipping", provider_id);
                last_error.get_or_insert(MarketDataError::CircuitOpen {
                    provider: provider_id.to_string(),
                });
                continue;
            }

            match self
                .call_with_retry(adapter.as_ref(), instrument_id, symbol, start, end)
                .await
            {
                Ok(rows) if rows.is_empty() => {
                    self.circuit_breaker.record_success(provider_id);
                    debug!(
                        "'{}' returned no rows for {} {}..{}, trying next",
                        provider_id, instrument_id, start, end
                    );
                    saw_clean_empty = true;
                }
                Ok(rows) => match self.validator.validate_daily(provider_id, &rows, instrument_id)
                {
                    Ok(()) => {
                        self.circuit_breaker.record_success(provider_id);
                        debug!(
                            "Fetched {} rows for {} from '{}'",
                            rows.len(),
                            instrument_id,
                            provider_id
                        );
                        return Ok(rows);
                    }
                    Err(e) => {
                        self.circuit_breaker.record_failure(provider_id);
                        last_error = Some(e);
                    }
                },
                Err(e) => {
                    match e.retry_class() {
                        RetryClass::Never => return Err(e),
                        RetryClass::WithBackoff | RetryClass::CircuitOpen => {
                            // Backoff budget is already spent; count the
                            // failure and move down the chain.
                            self.circuit_breaker.record_failure(provider_id);
                        }
                        RetryClass::NextProvider => {}
                    }
                    debug!("'{}' failed for {}: {}", provider_id, instrument_id, e);
                    last_error = Some(e);
                }
            }
        }

        if saw_clean_empty {
            Ok(vec![])
        } else if let Some(error) = last_error {
            Err(error)
        } else {
            Ok(vec![])
        }
    }

    /// Enumerate an exchange's instruments. Primary only: backup sources
    /// do not carry complete listings, so their output would be misleading.
    /// Failure yields an empty list for the caller to interpret.
    pub async fn list_instruments(&self, exchange: Exchange) -> Vec<ProviderInstrument> {
        let Some(adapter) = self.primary_for(exchange, |c| c.supports_instrument_list) else {
            warn!("No listing-capable primary for {}", exchange);
            return vec![];
        };
        let provider_id = adapter.id();

        self.rate_limiter.acquire(provider_id).await;
        match adapter.list_instruments(exchange).await {
            Ok(rows) => match self.validator.validate_listing(provider_id, &rows, exchange) {
                Ok(()) => {
                    self.circuit_breaker.record_success(provider_id);
                    info!("Listed {} instruments for {} via '{}'", rows.len(), exchange, provider_id);
                    rows
                }
                Err(e) => {
                    self.circuit_breaker.record_failure(provider_id);
                    warn!("Instrument listing rejected for {}: {}", exchange, e);
                    vec![]
                }
            },
            Err(e) => {
                self.circuit_breaker.record_failure(provider_id);
                warn!("Instrument listing failed for {}: {}", exchange, e);
                vec![]
            }
        }
    }

    /// Fetch the trading calendar. Primary only; failure yields an empty
    /// list for the caller to interpret.
    pub async fn fetch_calendar(
        &self,
        exchange: Exchange,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<CalendarDay> {
        let Some(adapter) = self.primary_for(exchange, |c| c.supports_calendar) else {
            warn!("No calendar-capable primary for {}", exchange);
            return vec![];
        };
        let provider_id = adapter.id();

        self.rate_limiter.acquire(provider_id).await;
        match adapter.fetch_calendar(exchange, start, end).await {
            Ok(days) => {
                self.circuit_breaker.record_success(provider_id);
                days
            }
            Err(e) => {
                self.circuit_breaker.record_failure(provider_id);
                warn!("Calendar fetch failed for {}: {}", exchange, e);
                vec![]
            }
        }
    }

    /// Probe every registered provider with a short deadline.
    pub async fn health_check_all(&self) -> HashMap<String, bool> {
        let mut health = HashMap::new();
        for (id, adapter) in &self.providers {
            let healthy = matches!(
                tokio::time::timeout(HEALTH_TIMEOUT, adapter.health_check()).await,
                Ok(Ok(()))
            );
            health.insert(id.to_string(), healthy);
        }
        health
    }

    /// One provider call with the adapter's retry budget applied to
    /// transient faults.
    async fn call_with_retry(
        &self,
        adapter: &dyn ProviderAdapter,
        instrument_id: &InstrumentId,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawDailyQuote>, MarketDataError> {
        let limits = adapter.rate_limit();
        let provider_id = adapter.id();
        let mut attempt = 0u32;

        loop {
            self.rate_limiter.acquire(provider_id).await;

            match adapter.fetch_daily(instrument_id, symbol, start, end).await {
                Ok(rows) => return Ok(rows),
                Err(e) if e.retry_class() == RetryClass::WithBackoff && attempt < limits.retries => {
                    let backoff =
                        (limits.retry_backoff * 2u32.saturating_pow(attempt)).min(MAX_BACKOFF);
                    debug!(
                        "Transient fault from '{}' (attempt {}/{}), backing off {:?}: {}",
                        provider_id,
                        attempt + 1,
                        limits.retries,
                        backoff,
                        e
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn daily_capable(
        &self,
        provider_id: &str,
        exchange: Exchange,
    ) -> Option<&Arc<dyn ProviderAdapter>> {
        let adapter = self.providers.get(provider_id)?;
        let caps = adapter.capabilities();
        (caps.supports_daily && caps.supports_exchange(exchange)).then_some(adapter)
    }

    fn primary_for(
        &self,
        exchange: Exchange,
        capable: impl Fn(&crate::provider::ProviderCapabilities) -> bool,
    ) -> Option<&Arc<dyn ProviderAdapter>> {
        let table = self.routing.table(exchange)?;
        let adapter = self.providers.get(table.primary.as_str())?;
        let caps = adapter.capabilities();
        (capable(&caps) && caps.supports_exchange(exchange)).then_some(adapter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderCapabilities, RateLimit};
    use crate::registry::RoutingTable;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted adapter for registry tests.
    struct ScriptedAdapter {
        id: &'static str,
        calls: AtomicUsize,
        behavior: Behavior,
    }

    enum Behavior {
        Rows(Vec<RawDailyQuote>),
        Empty,
        Transient,
        InvertedPayload,
    }

    impl ScriptedAdapter {
        fn new(id: &'static str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                id,
                calls: AtomicUsize::new(0),
                behavior,
            })
        }
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        fn id(&self) -> &'static str {
            self.id
        }

        fn capabilities(&self) -> ProviderCapabilities {
            ProviderCapabilities {
                exchanges: &[Exchange::Sse, Exchange::Szse],
                supports_instrument_list: false,
                supports_daily: true,
                supports_calendar: false,
            }
        }

        fn rate_limit(&self) -> RateLimit {
            RateLimit {
                per_minute: 10_000,
                per_hour: 100_000,
                per_day: 1_000_000,
                retries: 1,
                retry_backoff: Duration::from_millis(1),
            }
        }

        async fn fetch_daily(
            &self,
            instrument_id: &InstrumentId,
            _symbol: &str,
            start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<RawDailyQuote>, MarketDataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Rows(rows) => Ok(rows.clone()),
                Behavior::Empty => Ok(vec![]),
                Behavior::Transient => Err(MarketDataError::Timeout {
                    provider: self.id.to_string(),
                }),
                Behavior::InvertedPayload => Ok(vec![{
                    let mut bar = RawDailyQuote::bar(
                        start,
                        instrument_id.clone(),
                        dec!(10),
                        dec!(9), // high < low
                        dec!(10),
                        dec!(9.5),
                        1_000,
                        self.id,
                    );
                    bar.tradestatus = 1;
                    bar
                }]),
            }
        }
    }

    fn test_id() -> InstrumentId {
        InstrumentId::new("600000", Exchange::Sse).unwrap()
    }

    fn good_rows() -> Vec<RawDailyQuote> {
        vec![RawDailyQuote::bar(
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            test_id(),
            dec!(10.0),
            dec!(11.0),
            dec!(9.5),
            dec!(10.8),
            1_000_000,
            "BACKUP",
        )]
    }

    fn registry_with(
        primary: Arc<ScriptedAdapter>,
        backup: Arc<ScriptedAdapter>,
    ) -> ProviderRegistry {
        let mut routing = RoutingConfig::default();
        routing.set(
            Exchange::Sse,
            RoutingTable::new(primary.id, &[backup.id]),
        );
        ProviderRegistry::new(vec![primary, backup], routing)
    }

    #[tokio::test]
    async fn test_failover_to_backup_on_transient() {
        let primary = ScriptedAdapter::new("PRIMARY", Behavior::Transient);
        let backup = ScriptedAdapter::new("BACKUP", Behavior::Rows(good_rows()));
        let registry = registry_with(primary.clone(), backup.clone());

        let rows = registry
            .fetch_daily(
                &test_id(),
                "600000",
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source, "BACKUP");
        // Primary was retried once before failover.
        assert_eq!(primary.calls.load(Ordering::SeqCst), 2);
        assert_eq!(backup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_payload_fails_over_then_errors() {
        let primary = ScriptedAdapter::new("PRIMARY", Behavior::InvertedPayload);
        let backup = ScriptedAdapter::new("BACKUP", Behavior::InvertedPayload);
        let registry = registry_with(primary, backup);

        let result = registry
            .fetch_daily(
                &test_id(),
                "600000",
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            )
            .await;

        assert!(matches!(
            result,
            Err(MarketDataError::PayloadInvalid { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_everywhere_is_ok_empty() {
        let primary = ScriptedAdapter::new("PRIMARY", Behavior::Empty);
        let backup = ScriptedAdapter::new("BACKUP", Behavior::Empty);
        let registry = registry_with(primary, backup);

        let rows = registry
            .fetch_daily(
                &test_id(),
                "600000",
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            )
            .await
            .unwrap();

        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_unrouted_exchange_is_an_error() {
        let primary = ScriptedAdapter::new("PRIMARY", Behavior::Empty);
        let backup = ScriptedAdapter::new("BACKUP", Behavior::Empty);
        let registry = registry_with(primary, backup);
        let overseas = InstrumentId::new("AAPL", Exchange::Nasdaq).unwrap();

        let result = registry
            .fetch_daily(
                &overseas,
                "AAPL",
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            )
            .await;

        assert!(matches!(
            result,
            Err(MarketDataError::NoProvidersForExchange(Exchange::Nasdaq))
        ));
    }
}

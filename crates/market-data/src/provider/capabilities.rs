//! Provider capabilities and rate limiting configuration.

use std::time::Duration;

use crate::models::Exchange;

/// Describes what an upstream provider can do.
///
/// Providers may implement only part of the surface: a backup-only source
/// typically supplies daily bars and nothing else. The registry uses these
/// flags to decide which provider can serve which request.
#[derive(Clone, Debug)]
pub struct ProviderCapabilities {
    /// Exchanges this provider can serve at all.
    pub exchanges: &'static [Exchange],

    /// Whether the provider can enumerate the instruments of an exchange.
    pub supports_instrument_list: bool,

    /// Whether the provider supplies daily OHLCV bars.
    pub supports_daily: bool,

    /// Whether the provider supplies the trading calendar.
    pub supports_calendar: bool,
}

impl ProviderCapabilities {
    pub fn supports_exchange(&self, exchange: Exchange) -> bool {
        self.exchanges.contains(&exchange)
    }
}

/// Rate limiting and retry configuration for a provider.
///
/// The per-window counts are hard caps enforced by the registry's rate
/// limiter; `retries`/`retry_backoff` drive the bounded exponential backoff
/// applied to transient faults before failing over.
#[derive(Clone, Debug)]
pub struct RateLimit {
    /// Maximum requests allowed in any sliding 60-second window.
    pub per_minute: u32,

    /// Maximum requests allowed in any sliding one-hour window.
    pub per_hour: u32,

    /// Maximum requests allowed in any sliding 24-hour window.
    pub per_day: u32,

    /// Retries on transient faults before failing over.
    pub retries: u32,

    /// Base delay for exponential backoff between retries.
    pub retry_backoff: Duration,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            per_minute: 30,
            per_hour: 500,
            per_day: 5_000,
            retries: 3,
            retry_backoff: Duration::from_secs(2),
        }
    }
}

//! Error types and retry classification for the market data crate.

mod retry;

pub use retry::RetryClass;

use thiserror::Error;

use crate::models::Exchange;

/// Errors that can occur while talking to upstream quote providers.
///
/// Each variant is classified into a [`RetryClass`] via
/// [`retry_class`](Self::retry_class), which tells the registry whether to
/// retry the same provider, fail over to the next one, or give up.
#[derive(Error, Debug)]
pub enum MarketDataError {
    /// The input was not a well-formed instrument id in either spelling.
    #[error("Invalid instrument id: {input}")]
    InvalidInstrumentId { input: String },

    /// The provider does not know the requested symbol.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// The symbol exists but has no quotes in the requested period.
    #[error("No data for date range")]
    NoDataForRange,

    /// The provider rate limited the request (HTTP 429 semantics).
    #[error("Rate limited: {provider}")]
    RateLimited { provider: String },

    /// The request to the provider timed out.
    #[error("Timeout: {provider}")]
    Timeout { provider: String },

    /// A provider-specific error occurred; the next provider may succeed.
    #[error("Provider error: {provider} - {message}")]
    ProviderError { provider: String, message: String },

    /// The provider returned rows that failed the payload gate.
    #[error("Invalid payload from {provider}: {message}")]
    PayloadInvalid { provider: String, message: String },

    /// The provider does not implement the requested capability.
    #[error("Operation '{operation}' not supported by provider {provider}")]
    NotSupported {
        operation: &'static str,
        provider: String,
    },

    /// The circuit breaker is open for this provider.
    #[error("Circuit open: {provider}")]
    CircuitOpen { provider: String },

    /// No provider is routed for the exchange.
    #[error("No providers routed for exchange {0}")]
    NoProvidersForExchange(Exchange),

    /// Every routed provider was tried and all failed.
    #[error("All providers failed")]
    AllProvidersFailed,

    /// A network error occurred while communicating with a provider.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl MarketDataError {
    /// Returns the retry classification for this error.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            // Terminal for this provider and every other one.
            Self::InvalidInstrumentId { .. }
            | Self::NoProvidersForExchange(_)
            | Self::AllProvidersFailed => RetryClass::Never,

            // The symbol may be known to another provider, but retrying the
            // same one won't help.
            Self::SymbolNotFound(_) | Self::NoDataForRange | Self::NotSupported { .. } => {
                RetryClass::NextProvider
            }

            // Transient: retry the same provider with backoff first.
            Self::RateLimited { .. } | Self::Timeout { .. } | Self::Network(_) => {
                RetryClass::WithBackoff
            }

            // Provider-level faults: count against the circuit, then move on.
            Self::ProviderError { .. } | Self::PayloadInvalid { .. } => RetryClass::NextProvider,

            Self::CircuitOpen { .. } => RetryClass::CircuitOpen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_id_never_retries() {
        let error = MarketDataError::InvalidInstrumentId {
            input: "bogus".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::Never);
    }

    #[test]
    fn test_rate_limited_retries_with_backoff() {
        let error = MarketDataError::RateLimited {
            provider: "TUSHARE".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    }

    #[test]
    fn test_timeout_retries_with_backoff() {
        let error = MarketDataError::Timeout {
            provider: "EASTMONEY".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    }

    #[test]
    fn test_payload_invalid_fails_over() {
        let error = MarketDataError::PayloadInvalid {
            provider: "TUSHARE".to_string(),
            message: "high < low".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::NextProvider);
    }

    #[test]
    fn test_provider_error_fails_over() {
        let error = MarketDataError::ProviderError {
            provider: "YAHOO".to_string(),
            message: "internal".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::NextProvider);
    }

    #[test]
    fn test_circuit_open_class() {
        let error = MarketDataError::CircuitOpen {
            provider: "TUSHARE".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::CircuitOpen);
    }
}

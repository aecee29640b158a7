//! Payload validation gate.
//!
//! Runs before a provider's result is accepted. A cheap sample check: only
//! the first few rows are inspected, but any violation rejects the whole
//! batch and triggers failover to the next provider.

use log::warn;
use rust_decimal::Decimal;

use crate::errors::MarketDataError;
use crate::models::{Exchange, InstrumentId, ProviderInstrument, RawDailyQuote};

/// Rows sampled from a daily batch.
const DAILY_SAMPLE: usize = 5;

/// Rows sampled from an instrument listing.
const LISTING_SAMPLE: usize = 10;

/// Validates provider payloads before they are accepted.
pub struct PayloadValidator;

impl PayloadValidator {
    pub fn new() -> Self {
        Self
    }

    /// Gate a daily-bar batch.
    ///
    /// The first ≤5 rows must carry positive OHLC prices, `high >= low`,
    /// and the instrument id that was requested.
    pub fn validate_daily(
        &self,
        provider: &str,
        rows: &[RawDailyQuote],
        expected: &InstrumentId,
    ) -> Result<(), MarketDataError> {
        for row in rows.iter().take(DAILY_SAMPLE) {
            if row.instrument_id != *expected {
                return self.reject(
                    provider,
                    format!(
                        "instrument mismatch: expected {}, got {}",
                        expected, row.instrument_id
                    ),
                );
            }

            let prices = [row.open, row.high, row.low, row.close];
            if prices.iter().any(|p| *p <= Decimal::ZERO) {
                return self.reject(
                    provider,
                    format!(
                        "non-positive price on {}: open={} high={} low={} close={}",
                        row.day, row.open, row.high, row.low, row.close
                    ),
                );
            }

            if row.high < row.low {
                return self.reject(
                    provider,
                    format!("high {} below low {} on {}", row.high, row.low, row.day),
                );
            }
        }

        Ok(())
    }

    /// Gate an instrument listing: the first ≤10 rows must carry a symbol
    /// and a name and belong to the requested exchange.
    pub fn validate_listing(
        &self,
        provider: &str,
        rows: &[ProviderInstrument],
        exchange: Exchange,
    ) -> Result<(), MarketDataError> {
        if rows.is_empty() {
            return self.reject(provider, "empty instrument listing".to_string());
        }

        for row in rows.iter().take(LISTING_SAMPLE) {
            if row.symbol.is_empty() || row.name.is_empty() {
                return self.reject(
                    provider,
                    format!("listing row missing symbol or name: {:?}", row.instrument_id),
                );
            }
            if row.exchange != exchange {
                return self.reject(
                    provider,
                    format!(
                        "listing exchange mismatch: expected {}, got {}",
                        exchange, row.exchange
                    ),
                );
            }
        }

        Ok(())
    }

    fn reject(&self, provider: &str, message: String) -> Result<(), MarketDataError> {
        warn!("Payload from '{}' rejected: {}", provider, message);
        Err(MarketDataError::PayloadInvalid {
            provider: provider.to_string(),
            message,
        })
    }
}

impl Default for PayloadValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn id() -> InstrumentId {
        InstrumentId::new("600000", Exchange::Sse).unwrap()
    }

    fn bar(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> RawDailyQuote {
        RawDailyQuote::bar(
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            id(),
            open,
            high,
            low,
            close,
            1_000_000,
            "TEST",
        )
    }

    #[test]
    fn test_valid_batch_passes() {
        let validator = PayloadValidator::new();
        let rows = vec![bar(dec!(10.0), dec!(11.0), dec!(9.5), dec!(10.8))];
        assert!(validator.validate_daily("TEST", &rows, &id()).is_ok());
    }

    #[test]
    fn test_inverted_high_low_rejected() {
        let validator = PayloadValidator::new();
        let rows = vec![bar(dec!(10.0), dec!(9.0), dec!(10.0), dec!(9.5))];
        let err = validator.validate_daily("TEST", &rows, &id()).unwrap_err();
        assert!(matches!(err, MarketDataError::PayloadInvalid { .. }));
    }

    #[test]
    fn test_non_positive_price_rejected() {
        let validator = PayloadValidator::new();
        let rows = vec![bar(dec!(0), dec!(11.0), dec!(9.5), dec!(10.8))];
        assert!(validator.validate_daily("TEST", &rows, &id()).is_err());
    }

    #[test]
    fn test_wrong_instrument_rejected() {
        let validator = PayloadValidator::new();
        let other = InstrumentId::new("600004", Exchange::Sse).unwrap();
        let rows = vec![bar(dec!(10.0), dec!(11.0), dec!(9.5), dec!(10.8))];
        assert!(validator.validate_daily("TEST", &rows, &other).is_err());
    }

    #[test]
    fn test_only_sample_is_checked() {
        let validator = PayloadValidator::new();
        let mut rows = vec![bar(dec!(10.0), dec!(11.0), dec!(9.5), dec!(10.8)); 6];
        // A bad row beyond the sample is not the gate's business; the
        // quality stage rejects it row-wise later.
        rows[5].high = dec!(1);
        rows[5].low = dec!(2);
        assert!(validator.validate_daily("TEST", &rows, &id()).is_ok());
    }

    #[test]
    fn test_empty_daily_batch_passes_gate() {
        // Emptiness is a routing decision (try the next provider), not a
        // payload defect.
        let validator = PayloadValidator::new();
        assert!(validator.validate_daily("TEST", &[], &id()).is_ok());
    }

    #[test]
    fn test_empty_listing_rejected() {
        let validator = PayloadValidator::new();
        assert!(validator
            .validate_listing("TEST", &[], Exchange::Sse)
            .is_err());
    }
}

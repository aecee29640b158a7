//! Canonical instrument identifiers.

use serde::{Deserialize, Serialize};

use super::Exchange;
use crate::errors::MarketDataError;

/// A tradable instrument identified by `(symbol, exchange)`.
///
/// The identifier has two string projections:
///
/// - canonical: `600000.SSE` — used on the wire, in the database and in
///   every public interface;
/// - native: `600000.SH` — the legacy spelling some upstream providers use
///   for A-share symbols.
///
/// Both projections round-trip losslessly.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstrumentId {
    symbol: String,
    exchange: Exchange,
}

impl InstrumentId {
    /// Build an id from its parts. The symbol must be non-empty
    /// alphanumeric (dots excluded; they separate symbol from exchange).
    pub fn new(symbol: &str, exchange: Exchange) -> Result<Self, MarketDataError> {
        if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(MarketDataError::InvalidInstrumentId {
                input: format!("{}.{}", symbol, exchange.code()),
            });
        }
        Ok(Self {
            symbol: symbol.to_ascii_uppercase(),
            exchange,
        })
    }

    /// Parse the canonical form `SYMBOL.EXCHANGE_CODE`.
    pub fn parse_canonical(input: &str) -> Result<Self, MarketDataError> {
        let (symbol, code) = Self::split(input)?;
        Self::new(symbol, Exchange::from_code(code)?)
    }

    /// Parse the storage-native form `SYMBOL.{SH,SZ,...}`.
    pub fn parse_native(input: &str) -> Result<Self, MarketDataError> {
        let (symbol, code) = Self::split(input)?;
        Self::new(symbol, Exchange::from_native_code(code)?)
    }

    /// Parse either spelling. Canonical wins on ambiguity (there is none:
    /// the code sets are disjoint apart from shared members).
    pub fn parse_any(input: &str) -> Result<Self, MarketDataError> {
        Self::parse_canonical(input).or_else(|_| Self::parse_native(input))
    }

    fn split(input: &str) -> Result<(&str, &str), MarketDataError> {
        let mut parts = input.splitn(2, '.');
        match (parts.next(), parts.next()) {
            (Some(symbol), Some(code)) if !symbol.is_empty() && !code.is_empty() => {
                Ok((symbol, code))
            }
            _ => Err(MarketDataError::InvalidInstrumentId {
                input: input.to_string(),
            }),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn exchange(&self) -> Exchange {
        self.exchange
    }

    /// Canonical projection, e.g. `600000.SSE`.
    pub fn canonical(&self) -> String {
        format!("{}.{}", self.symbol, self.exchange.code())
    }

    /// Storage-native projection, e.g. `600000.SH`.
    pub fn native(&self) -> String {
        format!("{}.{}", self.symbol, self.exchange.native_code())
    }
}

impl std::fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.symbol, self.exchange.code())
    }
}

impl TryFrom<String> for InstrumentId {
    type Error = MarketDataError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        InstrumentId::parse_any(&value)
    }
}

impl From<InstrumentId> for String {
    fn from(id: InstrumentId) -> String {
        id.canonical()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_round_trip() {
        for input in ["600000.SSE", "000001.SZSE", "832000.BSE", "AAPL.NASDAQ"] {
            let id = InstrumentId::parse_canonical(input).unwrap();
            assert_eq!(id.canonical(), input);
            assert_eq!(InstrumentId::parse_native(&id.native()).unwrap(), id);
        }
    }

    #[test]
    fn test_native_round_trip() {
        let id = InstrumentId::parse_native("600000.SH").unwrap();
        assert_eq!(id.exchange(), Exchange::Sse);
        assert_eq!(id.canonical(), "600000.SSE");
        assert_eq!(id.native(), "600000.SH");
    }

    #[test]
    fn test_parse_any_accepts_both() {
        let canonical = InstrumentId::parse_any("000001.SZSE").unwrap();
        let native = InstrumentId::parse_any("000001.SZ").unwrap();
        assert_eq!(canonical, native);
    }

    #[test]
    fn test_symbol_normalized_to_uppercase() {
        let id = InstrumentId::parse_any("aapl.nasdaq").unwrap();
        assert_eq!(id.canonical(), "AAPL.NASDAQ");
    }

    #[test]
    fn test_malformed_rejected() {
        for input in ["600000", "600000.", ".SSE", "600000.LSE", "60.00.SSE", ""] {
            assert!(
                InstrumentId::parse_any(input).is_err(),
                "expected rejection for {:?}",
                input
            );
        }
    }
}

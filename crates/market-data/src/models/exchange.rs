//! Exchange identifiers.
//!
//! Two spellings exist for the A-share exchanges: the canonical codes
//! (`SSE`, `SZSE`) used everywhere inside the platform and on the wire,
//! and the native codes (`SH`, `SZ`) some upstream providers expect in
//! instrument symbols. Conversion is total in both directions.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;

/// A supported exchange.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Exchange {
    /// Shanghai Stock Exchange.
    Sse,
    /// Shenzhen Stock Exchange.
    Szse,
    /// Beijing Stock Exchange.
    Bse,
    /// Hong Kong Exchanges and Clearing.
    Hkex,
    /// NASDAQ.
    Nasdaq,
    /// New York Stock Exchange.
    Nyse,
}

impl Exchange {
    /// All supported exchanges, in canonical order.
    pub const ALL: [Exchange; 6] = [
        Exchange::Sse,
        Exchange::Szse,
        Exchange::Bse,
        Exchange::Hkex,
        Exchange::Nasdaq,
        Exchange::Nyse,
    ];

    /// Canonical exchange code (`SSE`, `SZSE`, ...).
    pub fn code(&self) -> &'static str {
        match self {
            Exchange::Sse => "SSE",
            Exchange::Szse => "SZSE",
            Exchange::Bse => "BSE",
            Exchange::Hkex => "HKEX",
            Exchange::Nasdaq => "NASDAQ",
            Exchange::Nyse => "NYSE",
        }
    }

    /// Storage-native exchange code (`SH`, `SZ`, otherwise the canonical code).
    pub fn native_code(&self) -> &'static str {
        match self {
            Exchange::Sse => "SH",
            Exchange::Szse => "SZ",
            other => other.code(),
        }
    }

    /// Parse a canonical code. Case-insensitive.
    pub fn from_code(code: &str) -> Result<Exchange, MarketDataError> {
        match code.to_ascii_uppercase().as_str() {
            "SSE" => Ok(Exchange::Sse),
            "SZSE" => Ok(Exchange::Szse),
            "BSE" => Ok(Exchange::Bse),
            "HKEX" => Ok(Exchange::Hkex),
            "NASDAQ" => Ok(Exchange::Nasdaq),
            "NYSE" => Ok(Exchange::Nyse),
            _ => Err(MarketDataError::InvalidInstrumentId {
                input: code.to_string(),
            }),
        }
    }

    /// Parse a storage-native code (`SH`, `SZ`, or any canonical code).
    pub fn from_native_code(code: &str) -> Result<Exchange, MarketDataError> {
        match code.to_ascii_uppercase().as_str() {
            "SH" => Ok(Exchange::Sse),
            "SZ" => Ok(Exchange::Szse),
            other => Exchange::from_code(other),
        }
    }

    /// The session zone all quote times are interpreted in.
    ///
    /// The platform stores civil dates in the market session zone; for the
    /// default A-share deployment this is UTC+8, and the overseas exchanges
    /// are normalized into the same zone at the adapter boundary.
    pub fn session_zone(&self) -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).expect("UTC+8 is a valid offset")
    }

    /// Whether this is one of the mainland A-share exchanges.
    pub fn is_a_share(&self) -> bool {
        matches!(self, Exchange::Sse | Exchange::Szse | Exchange::Bse)
    }
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Exchange {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Exchange::from_code(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        for exchange in Exchange::ALL {
            assert_eq!(Exchange::from_code(exchange.code()).unwrap(), exchange);
            assert_eq!(
                Exchange::from_native_code(exchange.native_code()).unwrap(),
                exchange
            );
        }
    }

    #[test]
    fn test_native_codes_for_a_shares() {
        assert_eq!(Exchange::Sse.native_code(), "SH");
        assert_eq!(Exchange::Szse.native_code(), "SZ");
        assert_eq!(Exchange::Bse.native_code(), "BSE");
        assert_eq!(Exchange::Nasdaq.native_code(), "NASDAQ");
    }

    #[test]
    fn test_native_parse_accepts_canonical() {
        assert_eq!(Exchange::from_native_code("SSE").unwrap(), Exchange::Sse);
        assert_eq!(Exchange::from_native_code("sh").unwrap(), Exchange::Sse);
    }

    #[test]
    fn test_unknown_code_rejected() {
        assert!(Exchange::from_code("LSE").is_err());
        assert!(Exchange::from_native_code("XX").is_err());
    }
}

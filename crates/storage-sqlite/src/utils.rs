//! Small storage helpers.
//!
//! Dates are stored as `%Y-%m-%d` TEXT, instants as RFC 3339 TEXT; these
//! helpers keep the codecs in one place.

use chrono::{DateTime, NaiveDate, Utc};

pub fn fmt_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

pub fn fmt_datetime(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

/// Tolerant instant parse: an unreadable stamp degrades to "now" instead
/// of poisoning the row.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// SQLite's bind-parameter budget is finite; keep `IN (...)` lists and
/// multi-row inserts comfortably under it.
pub const SQLITE_CHUNK: usize = 500;

/// Split a slice into SQLite-sized chunks.
pub fn chunk_for_sqlite<T>(items: &[T]) -> impl Iterator<Item = &[T]> {
    items.chunks(SQLITE_CHUNK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunking() {
        let items: Vec<u32> = (0..1_201).collect();
        let chunks: Vec<&[u32]> = chunk_for_sqlite(&items).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 500);
        assert_eq!(chunks[2].len(), 201);
    }
}

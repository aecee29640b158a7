//! Download progress accounting.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_PROGRESS_ERRORS;
use crate::time::{new_batch_id, session_now};

/// The orchestrator's counters. This is also the durable journal payload:
/// what gets persisted after every batch is exactly this struct.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    /// Timestamp-shaped id unique to one run.
    pub batch_id: String,

    pub total_instruments: usize,
    pub processed_instruments: usize,
    pub successful_downloads: usize,
    pub failed_downloads: usize,
    pub total_quotes: usize,
    pub quality_issues: usize,
    pub data_gaps_detected: usize,

    pub current_exchange: String,
    pub current_batch: usize,
    pub total_batches: usize,

    pub start_time: DateTime<FixedOffset>,

    /// Rolling error buffer, newest last, capped at 50.
    pub errors: Vec<String>,
}

impl DownloadProgress {
    pub fn new() -> Self {
        Self {
            batch_id: new_batch_id(),
            total_instruments: 0,
            processed_instruments: 0,
            successful_downloads: 0,
            failed_downloads: 0,
            total_quotes: 0,
            quality_issues: 0,
            data_gaps_detected: 0,
            current_exchange: String::new(),
            current_batch: 0,
            total_batches: 0,
            start_time: session_now(),
            errors: Vec::new(),
        }
    }

    pub fn progress_percentage(&self) -> f64 {
        if self.total_instruments == 0 {
            return 0.0;
        }
        self.processed_instruments as f64 / self.total_instruments as f64 * 100.0
    }

    pub fn success_rate(&self) -> f64 {
        if self.processed_instruments == 0 {
            return 0.0;
        }
        self.successful_downloads as f64 / self.processed_instruments as f64 * 100.0
    }

    /// 0-100 score derived from the share of quality issues.
    pub fn data_quality_score(&self) -> f64 {
        if self.total_quotes == 0 {
            return 0.0;
        }
        (100.0 - self.quality_issues as f64 / self.total_quotes as f64 * 100.0).clamp(0.0, 100.0)
    }

    pub fn elapsed_seconds(&self) -> i64 {
        (session_now() - self.start_time).num_seconds().max(0)
    }

    /// Quotes per second over the run so far.
    pub fn rate(&self) -> f64 {
        let elapsed = self.elapsed_seconds();
        if elapsed <= 0 {
            return 0.0;
        }
        self.total_quotes as f64 / elapsed as f64
    }

    /// Seconds until completion at the current pace, when computable.
    pub fn eta_seconds(&self) -> Option<i64> {
        if self.processed_instruments == 0 || self.total_instruments <= self.processed_instruments {
            return None;
        }
        let per_instrument = self.elapsed_seconds() as f64 / self.processed_instruments as f64;
        let remaining = (self.total_instruments - self.processed_instruments) as f64;
        Some((per_instrument * remaining) as i64)
    }

    /// Append a timestamped error, keeping only the newest 50.
    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors
            .push(format!("[{}] {}", session_now().format("%H:%M:%S"), error.into()));
        if self.errors.len() > MAX_PROGRESS_ERRORS {
            let excess = self.errors.len() - MAX_PROGRESS_ERRORS;
            self.errors.drain(..excess);
        }
    }

    /// Whether a prior run left enough state to continue from.
    pub fn is_resumable(&self) -> bool {
        self.total_instruments > 0 && self.processed_instruments > 0
    }
}

impl Default for DownloadProgress {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentages() {
        let mut p = DownloadProgress::new();
        assert_eq!(p.progress_percentage(), 0.0);

        p.total_instruments = 200;
        p.processed_instruments = 50;
        p.successful_downloads = 40;
        assert!((p.progress_percentage() - 25.0).abs() < 1e-9);
        assert!((p.success_rate() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_quality_score() {
        let mut p = DownloadProgress::new();
        assert_eq!(p.data_quality_score(), 0.0);

        p.total_quotes = 1_000;
        p.quality_issues = 50;
        assert!((p.data_quality_score() - 95.0).abs() < 1e-9);

        p.quality_issues = 5_000;
        assert_eq!(p.data_quality_score(), 0.0);
    }

    #[test]
    fn test_error_ring_caps_at_50() {
        let mut p = DownloadProgress::new();
        for i in 0..80 {
            p.add_error(format!("error {}", i));
        }
        assert_eq!(p.errors.len(), MAX_PROGRESS_ERRORS);
        // Oldest were dropped.
        assert!(p.errors[0].contains("error 30"));
        assert!(p.errors.last().unwrap().contains("error 79"));
    }

    #[test]
    fn test_resumable_needs_both_counters() {
        let mut p = DownloadProgress::new();
        assert!(!p.is_resumable());
        p.total_instruments = 10;
        assert!(!p.is_resumable());
        p.processed_instruments = 3;
        assert!(p.is_resumable());
    }
}

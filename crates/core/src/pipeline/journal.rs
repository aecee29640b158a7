//! Durable progress journal.
//!
//! A single JSON document holding the latest [`DownloadProgress`]. Writes
//! go to a temp file in the same directory followed by an atomic rename,
//! so a crash mid-write leaves either the old snapshot or the new one,
//! never a torn file.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::errors::{Error, Result};

use super::progress::DownloadProgress;

/// Whole-file-replace journal for one orchestrator.
#[derive(Clone, Debug)]
pub struct ProgressJournal {
    path: PathBuf,
}

impl ProgressJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist a snapshot. Whole-file replace via temp + rename.
    pub async fn save(&self, progress: &DownloadProgress) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let payload = serde_json::to_vec_pretty(progress)
            .map_err(|e| Error::Journal(format!("serialize progress: {}", e)))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &payload).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Load the last snapshot, if any. A corrupt journal is reported and
    /// treated as absent rather than wedging every future run.
    pub async fn load(&self) -> Result<Option<DownloadProgress>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<DownloadProgress>(&bytes) {
            Ok(progress) => {
                info!(
                    "Loaded progress journal: {}/{} instruments",
                    progress.processed_instruments, progress.total_instruments
                );
                Ok(Some(progress))
            }
            Err(e) => {
                warn!("Progress journal unreadable, ignoring: {}", e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let journal = ProgressJournal::new(dir.path().join("progress.json"));

        let mut progress = DownloadProgress::new();
        progress.total_instruments = 1_000;
        progress.processed_instruments = 350;
        progress.add_error("batch 7 store failure");

        journal.save(&progress).await.unwrap();
        let loaded = journal.load().await.unwrap().unwrap();

        assert_eq!(loaded.batch_id, progress.batch_id);
        assert_eq!(loaded.processed_instruments, 350);
        assert_eq!(loaded.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_journal_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let journal = ProgressJournal::new(dir.path().join("absent.json"));
        assert!(journal.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_journal_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let journal = ProgressJournal::new(path);
        assert!(journal.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let journal = ProgressJournal::new(dir.path().join("progress.json"));

        let mut first = DownloadProgress::new();
        first.total_instruments = 10;
        for i in 0..40 {
            first.add_error(format!("noise {}", i));
        }
        journal.save(&first).await.unwrap();

        let mut second = DownloadProgress::new();
        second.total_instruments = 20;
        journal.save(&second).await.unwrap();

        let loaded = journal.load().await.unwrap().unwrap();
        assert_eq!(loaded.total_instruments, 20);
        assert!(loaded.errors.is_empty());
    }

    #[tokio::test]
    async fn test_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let journal = ProgressJournal::new(dir.path().join("nested/deeper/progress.json"));
        journal.save(&DownloadProgress::new()).await.unwrap();
        assert!(journal.path().exists());
    }
}

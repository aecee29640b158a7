//! Storage-layer error types and conversions into core errors.

use quotehub_core::errors::{DatabaseError, Error};
use thiserror::Error;

/// Errors internal to the SQLite layer. Converted into
/// [`DatabaseError`] at the crate boundary; nothing above storage ever
/// sees a Diesel type.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Query failed: {0}")]
    QueryFailed(#[from] diesel::result::Error),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Backup failed: {0}")]
    BackupFailed(String),

    #[error("Row conversion failed: {0}")]
    Conversion(String),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        let db = match err {
            StorageError::QueryFailed(diesel::result::Error::NotFound) => {
                DatabaseError::NotFound("record not found".to_string())
            }
            StorageError::QueryFailed(e) => DatabaseError::QueryFailed(e.to_string()),
            StorageError::ConnectionFailed(msg) => DatabaseError::ConnectionFailed(msg),
            StorageError::Pool(e) => DatabaseError::ConnectionFailed(e.to_string()),
            StorageError::MigrationFailed(msg) => DatabaseError::MigrationFailed(msg),
            StorageError::BackupFailed(msg) => DatabaseError::BackupFailed(msg),
            StorageError::Conversion(msg) => DatabaseError::Internal(msg),
        };
        Error::Database(db)
    }
}

// The writer actor needs this direction: jobs return core errors, the
// transaction wrapper works in StorageError.
impl From<Error> for StorageError {
    fn from(err: Error) -> Self {
        StorageError::Conversion(err.to_string())
    }
}

/// Extension for folding Diesel results into core results.
pub trait IntoCore<T> {
    fn into_core(self) -> quotehub_core::Result<T>;
}

impl<T> IntoCore<T> for std::result::Result<T, diesel::result::Error> {
    fn into_core(self) -> quotehub_core::Result<T> {
        self.map_err(|e| StorageError::QueryFailed(e).into())
    }
}

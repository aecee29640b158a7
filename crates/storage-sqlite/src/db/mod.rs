//! Connection pooling, migrations, backups and the single-writer actor.

mod write_actor;

use std::path::{Path, PathBuf};

use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{info, warn};

use quotehub_core::errors::Result;
use quotehub_core::time::session_now;

use crate::errors::StorageError;

pub use write_actor::{spawn_writer, WriteHandle};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Applied to every pooled connection: WAL for concurrent readers, a busy
/// timeout so the single writer never trips `SQLITE_BUSY` on the first
/// contention, and enforced foreign keys.
#[derive(Clone, Copy, Debug)]
struct ConnectionOptions;

impl diesel::r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error>
    for ConnectionOptions
{
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA journal_mode = WAL; \
             PRAGMA synchronous = NORMAL; \
             PRAGMA busy_timeout = 5000; \
             PRAGMA foreign_keys = ON;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Create the pool for a database file path (or `:memory:` for tests).
pub fn create_pool(db_path: &str) -> Result<DbPool> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path);
    Pool::builder()
        .max_size(8)
        .connection_customizer(Box::new(ConnectionOptions))
        .build(manager)
        .map_err(|e| StorageError::ConnectionFailed(e.to_string()).into())
}

pub fn get_connection(pool: &DbPool) -> Result<DbConnection> {
    pool.get()
        .map_err(|e| StorageError::ConnectionFailed(e.to_string()).into())
}

/// Run the embedded migrations.
pub fn run_migrations(conn: &mut SqliteConnection) -> Result<()> {
    conn.run_pending_migrations(MIGRATIONS)
        .map(|applied| {
            if !applied.is_empty() {
                info!("Applied {} database migrations", applied.len());
            }
        })
        .map_err(|e| StorageError::MigrationFailed(e.to_string()).into())
}

/// Create the database file (and parent directories), pool it, migrate it.
pub fn init(db_path: &str) -> Result<DbPool> {
    if db_path != ":memory:" {
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;
        }
    }

    let pool = create_pool(db_path)?;
    let mut conn = get_connection(&pool)?;
    run_migrations(&mut conn)?;
    Ok(pool)
}

/// Copy the store file into `dir` as `quotes_backup_<YYYYmmdd_HHMMSS>.db`.
/// With `compress`, a `.zip` sibling is written as well. Returns the path
/// of the plain copy.
pub fn backup_database(db_path: &str, dir: &Path, compress: bool) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| StorageError::BackupFailed(e.to_string()))?;

    let stamp = session_now().format("%Y%m%d_%H%M%S");
    let backup_path = dir.join(format!("quotes_backup_{}.db", stamp));

    std::fs::copy(db_path, &backup_path)
        .map_err(|e| StorageError::BackupFailed(format!("copy {}: {}", db_path, e)))?;
    info!("Database backed up to {}", backup_path.display());

    if compress {
        let zip_path = backup_path.with_extension("db.zip");
        write_zip(&backup_path, &zip_path)
            .map_err(|e| StorageError::BackupFailed(format!("compress: {}", e)))?;
        info!("Compressed backup written to {}", zip_path.display());
    }

    Ok(backup_path)
}

fn write_zip(source: &Path, target: &Path) -> std::io::Result<()> {
    use std::io::Write;

    let file = std::fs::File::create(target)?;
    let mut archive = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let name = source
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("backup.db");
    archive.start_file(name, options)?;
    archive.write_all(&std::fs::read(source)?)?;
    archive.finish()?;
    Ok(())
}

/// Delete backups past the retention window, and oldest-first beyond the
/// file-count cap. Returns how many files were removed.
pub fn prune_backups(dir: &Path, retention_days: i64, max_files: usize) -> Result<usize> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Ok(0);
    };

    let mut backups: Vec<(PathBuf, std::time::SystemTime)> = entries
        .flatten()
        .filter(|e| {
            e.file_name()
                .to_str()
                .is_some_and(|n| n.starts_with("quotes_backup_"))
        })
        .filter_map(|e| {
            let modified = e.metadata().ok()?.modified().ok()?;
            Some((e.path(), modified))
        })
        .collect();
    backups.sort_by_key(|(_, modified)| *modified);

    let cutoff = std::time::SystemTime::now()
        - std::time::Duration::from_secs((retention_days.max(0) as u64) * 86_400);

    let mut removed = 0;
    let total = backups.len();
    for (index, (path, modified)) in backups.iter().enumerate() {
        let over_count = total - index > max_files;
        let expired = *modified < cutoff;
        if over_count || expired {
            match std::fs::remove_file(path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Could not prune backup {}: {}", path.display(), e),
            }
        }
    }

    if removed > 0 {
        info!("Pruned {} old backups from {}", removed, dir.display());
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_creates_and_migrates() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested/quotes.db");
        let pool = init(db_path.to_str().unwrap()).unwrap();

        // A pooled connection can see the migrated tables.
        let mut conn = get_connection(&pool).unwrap();
        use diesel::prelude::*;
        let count: i64 = crate::schema::instruments::table
            .count()
            .get_result(&mut conn)
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_backup_and_prune() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("quotes.db");
        init(db_path.to_str().unwrap()).unwrap();

        let backup_dir = dir.path().join("backups");
        let backup = backup_database(db_path.to_str().unwrap(), &backup_dir, true).unwrap();
        assert!(backup.exists());
        assert!(backup.with_extension("db.zip").exists());

        // max_files 0 forces every backup out.
        let removed = prune_backups(&backup_dir, 30, 0).unwrap();
        assert!(removed >= 1);
        assert!(!backup.exists());
    }
}

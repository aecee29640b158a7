//! Maintenance surface: statistics, vacuum/analyze, backups, integrity.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Double, Nullable, Text};
use log::info;

use quotehub_core::store::{MaintenanceStore, StoreStats};
use quotehub_core::Result;

use crate::db::{backup_database, get_connection, DbPool};
use crate::errors::IntoCore;
use crate::utils::parse_date;

pub struct MaintenanceRepository {
    pool: DbPool,
    db_path: String,
}

impl MaintenanceRepository {
    pub fn new(pool: DbPool, db_path: String) -> Self {
        Self { pool, db_path }
    }
}

#[derive(QueryableByName)]
struct GroupCount {
    #[diesel(sql_type = Text)]
    key: String,
    #[diesel(sql_type = BigInt)]
    count: i64,
}

#[derive(QueryableByName)]
struct QuoteAggregates {
    #[diesel(sql_type = BigInt)]
    total: i64,
    #[diesel(sql_type = Nullable<Text>)]
    earliest: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    latest: Option<String>,
    #[diesel(sql_type = Nullable<Double>)]
    average_score: Option<f64>,
    #[diesel(sql_type = BigInt)]
    below_threshold: i64,
}

#[derive(QueryableByName)]
struct SingleCount {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

#[derive(QueryableByName)]
struct IntegrityRow {
    #[diesel(sql_type = Text)]
    integrity_check: String,
}

#[async_trait]
impl MaintenanceStore for MaintenanceRepository {
    fn snapshot_stats(&self) -> Result<StoreStats> {
        let mut conn = get_connection(&self.pool)?;
        let mut stats = StoreStats::default();

        let instruments: SingleCount =
            sql_query("SELECT COUNT(*) AS count FROM instruments")
                .get_result(&mut conn)
                .into_core()?;
        stats.total_instruments = instruments.count;

        let calendar: SingleCount =
            sql_query("SELECT COUNT(*) AS count FROM trading_calendar")
                .get_result(&mut conn)
                .into_core()?;
        stats.calendar_entries = calendar.count;

        for (sql, target) in [
            (
                "SELECT exchange AS key, COUNT(*) AS count FROM instruments GROUP BY exchange",
                &mut stats.instruments_by_exchange,
            ),
            (
                "SELECT kind AS key, COUNT(*) AS count FROM instruments GROUP BY kind",
                &mut stats.instruments_by_type,
            ),
            (
                "SELECT status AS key, COUNT(*) AS count FROM instruments GROUP BY status",
                &mut stats.instruments_by_status,
            ),
        ] {
            let groups: Vec<GroupCount> = sql_query(sql).load(&mut conn).into_core()?;
            for group in groups {
                target.insert(group.key, group.count);
            }
        }

        let quotes: QuoteAggregates = sql_query(
            "SELECT COUNT(*) AS total, \
                    MIN(day) AS earliest, \
                    MAX(day) AS latest, \
                    AVG(quality_score) AS average_score, \
                    COALESCE(SUM(CASE WHEN quality_score < 0.7 THEN 1 ELSE 0 END), 0) AS below_threshold \
             FROM daily_quotes",
        )
        .get_result(&mut conn)
        .into_core()?;

        stats.total_quotes = quotes.total;
        stats.earliest_quote_day = quotes.earliest.as_deref().and_then(parse_date);
        stats.latest_quote_day = quotes.latest.as_deref().and_then(parse_date);
        stats.average_quality_score = quotes.average_score;
        stats.quotes_below_threshold = quotes.below_threshold;

        Ok(stats)
    }

    // VACUUM cannot run inside a transaction, so maintenance statements
    // bypass the writer actor and rely on busy_timeout for exclusion.
    async fn vacuum(&self) -> Result<()> {
        let mut conn = get_connection(&self.pool)?;
        sql_query("VACUUM").execute(&mut conn).into_core()?;
        info!("Database vacuumed");
        Ok(())
    }

    async fn analyze(&self) -> Result<()> {
        let mut conn = get_connection(&self.pool)?;
        sql_query("ANALYZE").execute(&mut conn).into_core()?;
        info!("Database analyzed");
        Ok(())
    }

    async fn backup(&self, dir: &Path, compress: bool) -> Result<PathBuf> {
        // Checkpoint the WAL first so the copied file is complete.
        {
            use diesel::connection::SimpleConnection;
            let mut conn = get_connection(&self.pool)?;
            conn.batch_execute("PRAGMA wal_checkpoint(TRUNCATE);")
                .into_core()?;
        }
        backup_database(&self.db_path, dir, compress)
    }

    fn integrity_check(&self) -> Result<Vec<String>> {
        let mut conn = get_connection(&self.pool)?;
        let rows: Vec<IntegrityRow> = sql_query("PRAGMA integrity_check")
            .load(&mut conn)
            .into_core()?;

        Ok(rows
            .into_iter()
            .map(|r| r.integrity_check)
            .filter(|finding| finding != "ok")
            .collect())
    }
}

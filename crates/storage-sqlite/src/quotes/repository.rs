//! Daily quote repository.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::Text;
use diesel::upsert::excluded;

use quotehub_core::models::DailyQuote;
use quotehub_core::store::{QuoteFilter, QuoteStore};
use quotehub_core::time::session_today;
use quotehub_core::{InstrumentId, Result};

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::daily_quotes::dsl;
use crate::utils::{chunk_for_sqlite, fmt_date, fmt_datetime, parse_date};

use super::model::QuoteDB;

pub struct QuoteRepository {
    pool: DbPool,
    writer: WriteHandle,
}

impl QuoteRepository {
    pub fn new(pool: DbPool, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl QuoteStore for QuoteRepository {
    async fn upsert_quotes(&self, quotes: &[DailyQuote]) -> Result<usize> {
        if quotes.is_empty() {
            return Ok(0);
        }

        let rows: Vec<QuoteDB> = quotes.iter().map(QuoteDB::from).collect();

        // One writer job = one immediate transaction: the whole call
        // becomes visible atomically.
        self.writer
            .exec(move |conn| {
                let now = fmt_datetime(Utc::now());
                let mut written = 0;
                for row in &rows {
                    written += diesel::insert_into(dsl::daily_quotes)
                        .values(row)
                        .on_conflict(dsl::id)
                        .do_update()
                        .set((
                            dsl::open.eq(excluded(dsl::open)),
                            dsl::high.eq(excluded(dsl::high)),
                            dsl::low.eq(excluded(dsl::low)),
                            dsl::close.eq(excluded(dsl::close)),
                            dsl::pre_close.eq(excluded(dsl::pre_close)),
                            dsl::change.eq(excluded(dsl::change)),
                            dsl::pct_change.eq(excluded(dsl::pct_change)),
                            dsl::volume.eq(excluded(dsl::volume)),
                            dsl::amount.eq(excluded(dsl::amount)),
                            dsl::turnover.eq(excluded(dsl::turnover)),
                            dsl::tradestatus.eq(excluded(dsl::tradestatus)),
                            dsl::factor.eq(excluded(dsl::factor)),
                            dsl::adjustment_type.eq(excluded(dsl::adjustment_type)),
                            dsl::is_complete.eq(excluded(dsl::is_complete)),
                            dsl::quality_score.eq(excluded(dsl::quality_score)),
                            dsl::source.eq(excluded(dsl::source)),
                            dsl::batch_id.eq(excluded(dsl::batch_id)),
                            // created_at stays; updated_at always advances.
                            dsl::updated_at.eq(now.clone()),
                        ))
                        .execute(conn)
                        .into_core()?;
                }
                Ok(written)
            })
            .await
    }

    fn existing_dates(
        &self,
        instrument_id: &InstrumentId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeSet<NaiveDate>> {
        let mut conn = get_connection(&self.pool)?;
        let days: Vec<String> = dsl::daily_quotes
            .filter(dsl::instrument_id.eq(instrument_id.canonical()))
            .filter(dsl::day.ge(fmt_date(start)))
            .filter(dsl::day.le(fmt_date(end)))
            .select(dsl::day)
            .load(&mut conn)
            .into_core()?;

        Ok(days.iter().filter_map(|d| parse_date(d)).collect())
    }

    fn query(&self, filter: &QuoteFilter) -> Result<Vec<DailyQuote>> {
        let mut conn = get_connection(&self.pool)?;

        let mut query = dsl::daily_quotes.into_boxed();
        if let Some(id) = &filter.instrument_id {
            query = query.filter(dsl::instrument_id.eq(id.canonical()));
        }
        if let Some(start) = filter.start {
            query = query.filter(dsl::day.ge(fmt_date(start)));
        }
        if let Some(end) = filter.end {
            query = query.filter(dsl::day.le(fmt_date(end)));
        }
        if let Some(status) = filter.tradestatus {
            query = query.filter(dsl::tradestatus.eq(status));
        }
        if let Some(min_volume) = filter.min_volume {
            query = query.filter(dsl::volume.ge(min_volume));
        }
        if let Some(min_score) = filter.min_quality_score {
            query = query.filter(dsl::quality_score.ge(min_score));
        }
        if !filter.include_suspended {
            query = query.filter(dsl::tradestatus.ne(0));
        }

        query = query.order(dsl::day.asc());
        if let Some(page) = filter.page {
            if let Some(limit) = page.limit {
                query = query.limit(limit);
            }
            if page.offset > 0 {
                query = query.offset(page.offset);
            }
        }

        let rows: Vec<QuoteDB> = query.load(&mut conn).into_core()?;
        rows.into_iter().map(QuoteDB::into_domain).collect()
    }

    fn latest_day(&self, instrument_id: &InstrumentId) -> Result<Option<NaiveDate>> {
        let mut conn = get_connection(&self.pool)?;
        let latest: Option<String> = dsl::daily_quotes
            .filter(dsl::instrument_id.eq(instrument_id.canonical()))
            .select(diesel::dsl::max(dsl::day))
            .get_result(&mut conn)
            .into_core()?;
        Ok(latest.as_deref().and_then(parse_date))
    }

    fn latest_quotes(
        &self,
        instrument_ids: &[InstrumentId],
        lookback_days: i64,
    ) -> Result<Vec<DailyQuote>> {
        if instrument_ids.is_empty() {
            return Ok(vec![]);
        }

        let mut conn = get_connection(&self.pool)?;
        let floor = fmt_date(session_today() - Duration::days(lookback_days));
        let mut result = Vec::new();

        for chunk in chunk_for_sqlite(instrument_ids) {
            let keys: Vec<String> = chunk.iter().map(|id| id.canonical()).collect();
            let placeholders = keys.iter().map(|_| "?").collect::<Vec<_>>().join(", ");

            let sql = format!(
                "WITH RankedQuotes AS ( \
                    SELECT q.*, \
                           ROW_NUMBER() OVER (PARTITION BY q.instrument_id ORDER BY q.day DESC) AS rn \
                    FROM daily_quotes q \
                    WHERE q.instrument_id IN ({}) AND q.day >= ? \
                ) \
                SELECT * FROM RankedQuotes WHERE rn = 1 ORDER BY instrument_id",
                placeholders
            );

            let mut query = sql_query(sql).into_boxed::<diesel::sqlite::Sqlite>();
            for key in &keys {
                query = query.bind::<Text, _>(key.clone());
            }
            query = query.bind::<Text, _>(floor.clone());

            let rows: Vec<QuoteDB> = query.load(&mut conn).into_core()?;
            for row in rows {
                result.push(row.into_domain()?);
            }
        }

        Ok(result)
    }

    async fn delete_before(&self, cutoff: NaiveDate) -> Result<usize> {
        let cutoff = fmt_date(cutoff);
        self.writer
            .exec(move |conn| {
                diesel::delete(dsl::daily_quotes.filter(dsl::day.lt(cutoff)))
                    .execute(conn)
                    .into_core()
            })
            .await
    }
}

//! Instrument repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel::upsert::excluded;

use quotehub_core::models::Instrument;
use quotehub_core::store::{InstrumentFilter, InstrumentSort, InstrumentStore, Page};
use quotehub_core::{Exchange, InstrumentId, Result};

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::instruments::dsl;
use crate::utils::{fmt_date, fmt_datetime, parse_datetime};

use super::model::InstrumentDB;

pub struct InstrumentRepository {
    pool: DbPool,
    writer: WriteHandle,
}

impl InstrumentRepository {
    pub fn new(pool: DbPool, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl InstrumentStore for InstrumentRepository {
    async fn upsert_instruments(&self, instruments: &[Instrument]) -> Result<usize> {
        if instruments.is_empty() {
            return Ok(0);
        }

        let rows: Vec<InstrumentDB> = instruments.iter().map(InstrumentDB::from).collect();

        self.writer
            .exec(move |conn| {
                let now = fmt_datetime(Utc::now());
                let mut written = 0;
                for row in &rows {
                    written += diesel::insert_into(dsl::instruments)
                        .values(row)
                        .on_conflict(dsl::instrument_id)
                        .do_update()
                        .set((
                            dsl::symbol.eq(excluded(dsl::symbol)),
                            dsl::name.eq(excluded(dsl::name)),
                            dsl::exchange.eq(excluded(dsl::exchange)),
                            dsl::kind.eq(excluded(dsl::kind)),
                            dsl::currency.eq(excluded(dsl::currency)),
                            dsl::listed_date.eq(excluded(dsl::listed_date)),
                            dsl::delisted_date.eq(excluded(dsl::delisted_date)),
                            dsl::issue_date.eq(excluded(dsl::issue_date)),
                            dsl::industry.eq(excluded(dsl::industry)),
                            dsl::sector.eq(excluded(dsl::sector)),
                            dsl::market.eq(excluded(dsl::market)),
                            dsl::status.eq(excluded(dsl::status)),
                            dsl::is_active.eq(excluded(dsl::is_active)),
                            dsl::is_st.eq(excluded(dsl::is_st)),
                            dsl::trading_status.eq(excluded(dsl::trading_status)),
                            dsl::source.eq(excluded(dsl::source)),
                            dsl::source_symbol.eq(excluded(dsl::source_symbol)),
                            // created_at is untouched; the rewrite counter
                            // and freshness stamp advance.
                            dsl::updated_at.eq(now.clone()),
                            dsl::data_version.eq(dsl::data_version + 1),
                        ))
                        .execute(conn)
                        .into_core()?;
                }
                Ok(written)
            })
            .await
    }

    fn list(
        &self,
        filter: &InstrumentFilter,
        sort: InstrumentSort,
        page: Page,
    ) -> Result<Vec<Instrument>> {
        let mut conn = get_connection(&self.pool)?;

        let mut query = dsl::instruments.into_boxed();
        if let Some(exchange) = filter.exchange {
            query = query.filter(dsl::exchange.eq(exchange.code()));
        }
        if let Some(kind) = &filter.kind {
            query = query.filter(dsl::kind.eq(kind.clone()));
        }
        if let Some(industry) = &filter.industry {
            query = query.filter(dsl::industry.eq(industry.clone()));
        }
        if let Some(sector) = &filter.sector {
            query = query.filter(dsl::sector.eq(sector.clone()));
        }
        if let Some(market) = &filter.market {
            query = query.filter(dsl::market.eq(market.clone()));
        }
        if let Some(status) = filter.status {
            query = query.filter(dsl::status.eq(status.as_str()));
        }
        if let Some(is_active) = filter.is_active {
            query = query.filter(dsl::is_active.eq(is_active));
        }
        if let Some(is_st) = filter.is_st {
            query = query.filter(dsl::is_st.eq(is_st));
        }
        if let Some(after) = filter.listed_after {
            query = query.filter(dsl::listed_date.ge(fmt_date(after)));
        }
        if let Some(before) = filter.listed_before {
            query = query.filter(dsl::listed_date.le(fmt_date(before)));
        }

        query = match sort {
            InstrumentSort::Symbol => query.order(dsl::symbol.asc()),
            InstrumentSort::Name => query.order(dsl::name.asc()),
            InstrumentSort::ListedDate => query.order(dsl::listed_date.asc()),
            InstrumentSort::UpdatedAt => query.order(dsl::updated_at.desc()),
        };

        if let Some(limit) = page.limit {
            query = query.limit(limit);
        }
        if page.offset > 0 {
            query = query.offset(page.offset);
        }

        let rows: Vec<InstrumentDB> = query.load(&mut conn).into_core()?;
        rows.into_iter().map(InstrumentDB::into_domain).collect()
    }

    fn get_by_id(&self, instrument_id: &InstrumentId) -> Result<Option<Instrument>> {
        let mut conn = get_connection(&self.pool)?;

        // Canonical first; rows imported under the legacy native spelling
        // resolve through the fallback.
        for key in [instrument_id.canonical(), instrument_id.native()] {
            let row: Option<InstrumentDB> = dsl::instruments
                .filter(dsl::instrument_id.eq(&key))
                .first(&mut conn)
                .optional()
                .into_core()?;
            if let Some(row) = row {
                return row.into_domain().map(Some);
            }
        }
        Ok(None)
    }

    fn get_by_symbol(&self, symbol: &str) -> Result<Option<Instrument>> {
        let mut conn = get_connection(&self.pool)?;
        let row: Option<InstrumentDB> = dsl::instruments
            .filter(dsl::symbol.eq(symbol))
            .first(&mut conn)
            .optional()
            .into_core()?;
        row.map(InstrumentDB::into_domain).transpose()
    }

    fn count_by_exchange(&self, exchange: Exchange) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        dsl::instruments
            .filter(dsl::exchange.eq(exchange.code()))
            .count()
            .get_result(&mut conn)
            .into_core()
    }

    fn latest_update(&self, exchange: Exchange) -> Result<Option<DateTime<Utc>>> {
        let mut conn = get_connection(&self.pool)?;
        let latest: Option<String> = dsl::instruments
            .filter(dsl::exchange.eq(exchange.code()))
            .select(diesel::dsl::max(dsl::updated_at))
            .get_result(&mut conn)
            .into_core()?;
        Ok(latest.as_deref().map(parse_datetime))
    }

    fn count_with_quotes(&self, exchange: Exchange) -> Result<i64> {
        #[derive(QueryableByName)]
        struct CountRow {
            #[diesel(sql_type = diesel::sql_types::BigInt)]
            count: i64,
        }

        let mut conn = get_connection(&self.pool)?;
        let row: CountRow = diesel::sql_query(
            "SELECT COUNT(DISTINCT dq.instrument_id) AS count \
             FROM daily_quotes dq \
             JOIN instruments i ON dq.instrument_id = i.instrument_id \
             WHERE i.exchange = ? AND i.is_active = 1",
        )
        .bind::<Text, _>(exchange.code())
        .get_result(&mut conn)
        .into_core()?;
        Ok(row.count)
    }
}

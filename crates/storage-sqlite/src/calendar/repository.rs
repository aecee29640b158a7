//! Trading calendar repository.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;

use quotehub_core::models::TradingCalendarEntry;
use quotehub_core::store::CalendarStore;
use quotehub_core::{Exchange, Result};

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::trading_calendar::dsl;
use crate::utils::{fmt_date, fmt_datetime, parse_date};

use super::model::CalendarEntryDB;

pub struct CalendarRepository {
    pool: DbPool,
    writer: WriteHandle,
}

impl CalendarRepository {
    pub fn new(pool: DbPool, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl CalendarStore for CalendarRepository {
    async fn upsert_calendar(&self, entries: &[TradingCalendarEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let rows: Vec<CalendarEntryDB> = entries.iter().map(CalendarEntryDB::from).collect();

        self.writer
            .exec(move |conn| {
                let now = fmt_datetime(Utc::now());
                let mut written = 0;
                for row in &rows {
                    written += diesel::insert_into(dsl::trading_calendar)
                        .values(row)
                        .on_conflict(dsl::id)
                        .do_update()
                        .set((
                            dsl::is_trading_day.eq(excluded(dsl::is_trading_day)),
                            dsl::reason.eq(excluded(dsl::reason)),
                            dsl::session_type.eq(excluded(dsl::session_type)),
                            dsl::source.eq(excluded(dsl::source)),
                            dsl::updated_at.eq(now.clone()),
                        ))
                        .execute(conn)
                        .into_core()?;
                }
                Ok(written)
            })
            .await
    }

    fn trading_days(
        &self,
        exchange: Exchange,
        start: NaiveDate,
        end: NaiveDate,
        only_trading: bool,
    ) -> Result<Vec<NaiveDate>> {
        let mut conn = get_connection(&self.pool)?;

        let mut query = dsl::trading_calendar
            .filter(dsl::exchange.eq(exchange.code()))
            .filter(dsl::day.ge(fmt_date(start)))
            .filter(dsl::day.le(fmt_date(end)))
            .into_boxed();
        if only_trading {
            query = query.filter(dsl::is_trading_day.eq(true));
        }

        let days: Vec<String> = query
            .order(dsl::day.asc())
            .select(dsl::day)
            .load(&mut conn)
            .into_core()?;
        Ok(days.iter().filter_map(|d| parse_date(d)).collect())
    }

    fn entries(
        &self,
        exchange: Exchange,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TradingCalendarEntry>> {
        let mut conn = get_connection(&self.pool)?;
        let rows: Vec<CalendarEntryDB> = dsl::trading_calendar
            .filter(dsl::exchange.eq(exchange.code()))
            .filter(dsl::day.ge(fmt_date(start)))
            .filter(dsl::day.le(fmt_date(end)))
            .order(dsl::day.asc())
            .load(&mut conn)
            .into_core()?;
        rows.into_iter().map(CalendarEntryDB::into_domain).collect()
    }
}

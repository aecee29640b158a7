//! Audit-trail repository.

use async_trait::async_trait;
use diesel::prelude::*;

use quotehub_core::models::DataUpdateRecord;
use quotehub_core::store::UpdateRecordStore;
use quotehub_core::Result;

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::data_updates::dsl;

use super::model::DataUpdateDB;

pub struct UpdateRecordRepository {
    pool: DbPool,
    writer: WriteHandle,
}

impl UpdateRecordRepository {
    pub fn new(pool: DbPool, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl UpdateRecordStore for UpdateRecordRepository {
    async fn create(&self, record: &DataUpdateRecord) -> Result<()> {
        let row = DataUpdateDB::from(record);
        self.writer
            .exec(move |conn| {
                diesel::replace_into(dsl::data_updates)
                    .values(&row)
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await
    }

    async fn update(&self, record: &DataUpdateRecord) -> Result<()> {
        let row = DataUpdateDB::from(record);
        self.writer
            .exec(move |conn| {
                diesel::update(dsl::data_updates.filter(dsl::id.eq(row.id.clone())))
                    .set(&row)
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await
    }

    fn recent(&self, limit: i64) -> Result<Vec<DataUpdateRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let rows: Vec<DataUpdateDB> = dsl::data_updates
            .order(dsl::started_at.desc())
            .limit(limit)
            .load(&mut conn)
            .into_core()?;
        rows.into_iter().map(DataUpdateDB::into_domain).collect()
    }
}

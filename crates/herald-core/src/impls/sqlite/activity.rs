use async_trait::async_trait;
use rusqlite::{Row, params};

use super::{SqliteDatabase, column_parse, column_time, sql_limit, to_millis};
use crate::domain::{ActivityRecord, ExternalId, ItemId};
use crate::error::Result;
use crate::ports::ActivityLog;

const ACTIVITY_COLUMNS: &str = "id, item_id, origin, outcome, external_id, error, recorded_at";

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ActivityRecord> {
    Ok(ActivityRecord {
        id: column_parse(row, 0)?,
        item_id: column_parse(row, 1)?,
        origin: column_parse(row, 2)?,
        outcome: row.get(3)?,
        external_id: row.get::<_, Option<String>>(4)?.map(ExternalId::new),
        error: row.get(5)?,
        recorded_at: column_time(row, 6)?,
    })
}

/// Append-only activity log over the `activity` table.
#[derive(Clone)]
pub struct SqliteActivityLog {
    db: SqliteDatabase,
}

impl SqliteActivityLog {
    pub fn new(db: SqliteDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ActivityLog for SqliteActivityLog {
    async fn append(&self, record: ActivityRecord) -> Result<()> {
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO activity
                     (id, item_id, origin, outcome, external_id, error, recorded_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7)",
                    params![
                        record.id.to_key(),
                        record.item_id.to_key(),
                        record.origin.as_str(),
                        record.outcome,
                        record.external_id.as_ref().map(|e| e.as_str().to_string()),
                        record.error,
                        to_millis(record.recorded_at),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    async fn for_item(&self, item_id: ItemId) -> Result<Vec<ActivityRecord>> {
        self.db
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ACTIVITY_COLUMNS} FROM activity
                     WHERE item_id = ?1 ORDER BY recorded_at, id"
                ))?;
                let records = stmt
                    .query_map([item_id.to_key()], row_to_record)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(records)
            })
            .await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ActivityRecord>> {
        self.db
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ACTIVITY_COLUMNS} FROM activity
                     ORDER BY recorded_at DESC, id DESC LIMIT ?1"
                ))?;
                let records = stmt
                    .query_map([sql_limit(limit)], row_to_record)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(records)
            })
            .await
    }
}

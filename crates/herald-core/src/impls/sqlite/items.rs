use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};

use super::{SqliteDatabase, column_opt_time, column_parse, column_time, sql_limit, to_millis};
use crate::domain::{ErrorKind, ExternalId, ItemError, ItemId, OwnerId, ScheduledItem};
use crate::error::Result;
use crate::ports::ItemStore;

const ITEM_COLUMNS: &str = "id, owner_id, content, status, scheduled_for, external_id,
     published_at, attempts, error_kind, error_message, created_at, updated_at";

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<ScheduledItem> {
    let error_kind: Option<ErrorKind> = match row.get::<_, Option<String>>(8)? {
        Some(_) => Some(column_parse(row, 8)?),
        None => None,
    };
    let error_message: Option<String> = row.get(9)?;
    Ok(ScheduledItem {
        id: column_parse(row, 0)?,
        owner_id: OwnerId::new(row.get::<_, String>(1)?),
        content: row.get(2)?,
        status: column_parse(row, 3)?,
        scheduled_for: column_opt_time(row, 4)?,
        external_id: row.get::<_, Option<String>>(5)?.map(ExternalId::new),
        published_at: column_opt_time(row, 6)?,
        attempts: row.get(7)?,
        last_error: error_kind.map(|kind| ItemError::new(kind, error_message.unwrap_or_default())),
        created_at: column_time(row, 10)?,
        updated_at: column_time(row, 11)?,
    })
}

/// Item store over the `items` table.
#[derive(Clone)]
pub struct SqliteItemStore {
    db: SqliteDatabase,
}

impl SqliteItemStore {
    pub fn new(db: SqliteDatabase) -> Self {
        Self { db }
    }

    /// Run one conditional UPDATE; true when it matched a row.
    async fn update(&self, sql: &'static str, params: Vec<rusqlite::types::Value>) -> Result<bool> {
        self.db
            .with_conn(move |conn| {
                let n = conn.execute(sql, rusqlite::params_from_iter(params))?;
                Ok(n == 1)
            })
            .await
    }

    async fn select(&self, sql: String, params: Vec<rusqlite::types::Value>) -> Result<Vec<ScheduledItem>> {
        self.db
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let items = stmt
                    .query_map(rusqlite::params_from_iter(params), row_to_item)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(items)
            })
            .await
    }
}

fn text(s: impl Into<String>) -> rusqlite::types::Value {
    rusqlite::types::Value::Text(s.into())
}

fn int(n: i64) -> rusqlite::types::Value {
    rusqlite::types::Value::Integer(n)
}

fn opt_text(s: Option<String>) -> rusqlite::types::Value {
    s.map_or(rusqlite::types::Value::Null, rusqlite::types::Value::Text)
}

#[async_trait]
impl ItemStore for SqliteItemStore {
    async fn insert(&self, item: ScheduledItem) -> Result<()> {
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO items
                     (id, owner_id, content, status, scheduled_for, external_id,
                      published_at, attempts, error_kind, error_message, created_at, updated_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
                    params![
                        item.id.to_key(),
                        item.owner_id.as_str(),
                        item.content,
                        item.status.as_str(),
                        item.scheduled_for.map(to_millis),
                        item.external_id.as_ref().map(|e| e.as_str().to_string()),
                        item.published_at.map(to_millis),
                        item.attempts,
                        item.last_error.as_ref().map(|e| e.kind.as_str()),
                        item.last_error.as_ref().map(|e| e.message.clone()),
                        to_millis(item.created_at),
                        to_millis(item.updated_at),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    async fn get(&self, id: ItemId) -> Result<Option<ScheduledItem>> {
        self.db
            .with_conn(move |conn| {
                let item = conn
                    .query_row(
                        &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"),
                        [id.to_key()],
                        row_to_item,
                    )
                    .optional()?;
                Ok(item)
            })
            .await
    }

    async fn find_due(
        &self,
        now: DateTime<Utc>,
        owner: Option<&OwnerId>,
        limit: usize,
    ) -> Result<Vec<ScheduledItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items
             WHERE status = 'scheduled' AND scheduled_for <= ?1
               AND (?2 IS NULL OR owner_id = ?2)
             ORDER BY scheduled_for, id
             LIMIT ?3"
        );
        let owner = opt_text(owner.map(|o| o.as_str().to_string()));
        self.select(sql, vec![int(to_millis(now)), owner, int(sql_limit(limit))])
            .await
    }

    async fn set_schedule(&self, id: ItemId, at: DateTime<Utc>, now: DateTime<Utc>) -> Result<bool> {
        self.update(
            "UPDATE items
             SET status = 'scheduled', scheduled_for = ?2, attempts = 0,
                 error_kind = NULL, error_message = NULL, updated_at = ?3
             WHERE id = ?1 AND status IN ('draft','scheduled','failed')",
            vec![text(id.to_key()), int(to_millis(at)), int(to_millis(now))],
        )
        .await
    }

    async fn unschedule(&self, id: ItemId, now: DateTime<Utc>) -> Result<bool> {
        self.update(
            "UPDATE items
             SET status = 'draft', scheduled_for = NULL, updated_at = ?2
             WHERE id = ?1 AND status = 'scheduled'",
            vec![text(id.to_key()), int(to_millis(now))],
        )
        .await
    }

    async fn claim(&self, id: ItemId, now: DateTime<Utc>) -> Result<bool> {
        self.update(
            "UPDATE items
             SET status = 'publishing', updated_at = ?2
             WHERE id = ?1 AND status = 'scheduled' AND scheduled_for <= ?2",
            vec![text(id.to_key()), int(to_millis(now))],
        )
        .await
    }

    async fn finalize_published(
        &self,
        id: ItemId,
        external_id: &ExternalId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.update(
            "UPDATE items
             SET status = 'published', external_id = ?2, published_at = ?3,
                 error_kind = NULL, error_message = NULL, updated_at = ?3
             WHERE id = ?1 AND status = 'publishing' AND external_id IS NULL",
            vec![
                text(id.to_key()),
                text(external_id.as_str()),
                int(to_millis(now)),
            ],
        )
        .await
    }

    async fn rearm(
        &self,
        id: ItemId,
        fire_at: DateTime<Utc>,
        attempts: u32,
        error: Option<&ItemError>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.update(
            "UPDATE items
             SET status = 'scheduled', scheduled_for = ?2, attempts = ?3,
                 error_kind = ?4, error_message = ?5, updated_at = ?6
             WHERE id = ?1 AND status = 'publishing'",
            vec![
                text(id.to_key()),
                int(to_millis(fire_at)),
                int(i64::from(attempts)),
                opt_text(error.map(|e| e.kind.as_str().to_string())),
                opt_text(error.map(|e| e.message.clone())),
                int(to_millis(now)),
            ],
        )
        .await
    }

    async fn mark_failed(
        &self,
        id: ItemId,
        attempts: u32,
        error: &ItemError,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.update(
            "UPDATE items
             SET status = 'failed', scheduled_for = NULL, attempts = ?2,
                 error_kind = ?3, error_message = ?4, updated_at = ?5
             WHERE id = ?1 AND status = 'publishing'",
            vec![
                text(id.to_key()),
                int(i64::from(attempts)),
                text(error.kind.as_str()),
                text(error.message.clone()),
                int(to_millis(now)),
            ],
        )
        .await
    }

    async fn flag_ambiguous(&self, id: ItemId, error: &ItemError, now: DateTime<Utc>) -> Result<bool> {
        self.update(
            "UPDATE items
             SET error_kind = ?2, error_message = ?3, updated_at = ?4
             WHERE id = ?1 AND status = 'publishing'",
            vec![
                text(id.to_key()),
                text(error.kind.as_str()),
                text(error.message.clone()),
                int(to_millis(now)),
            ],
        )
        .await
    }

    async fn find_unresolved(
        &self,
        stale_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items
             WHERE status = 'publishing'
               AND (error_kind = 'ambiguous' OR updated_at <= ?1)
             ORDER BY updated_at, id
             LIMIT ?2"
        );
        self.select(sql, vec![int(to_millis(stale_before)), int(sql_limit(limit))])
            .await
    }
}

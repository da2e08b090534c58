//! SQLite adapters.
//!
//! One database file holds items, jobs, the queue's pause flag and the
//! activity log. Several processes may open the same file; every state change
//! is a single conditional statement (or one IMMEDIATE transaction), so the
//! row-count of an `UPDATE` is what decides a race.

mod activity;
mod items;
mod jobs;
mod schema;

use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use tracing::debug;

use crate::error::{HeraldError, Result};

pub use activity::SqliteActivityLog;
pub use items::SqliteItemStore;
pub use jobs::SqliteDelayQueue;
pub use schema::init_db;

/// Writers wait this long for another process's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared handle to one SQLite connection. Clones share the connection.
#[derive(Clone)]
pub struct SqliteDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDatabase {
    /// Open (or create) the database file and initialise the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        debug!(path = %path.display(), "opened database");
        Self::from_connection(conn)
    }

    /// Private in-memory database (tests, demos).
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn item_store(&self) -> SqliteItemStore {
        SqliteItemStore::new(self.clone())
    }

    pub fn delay_queue(&self) -> SqliteDelayQueue {
        SqliteDelayQueue::new(self.clone())
    }

    pub fn activity_log(&self) -> SqliteActivityLog {
        SqliteActivityLog::new(self.clone())
    }

    /// Run `f` against the connection on the blocking pool.
    pub(crate) async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| HeraldError::Store(format!("connection lock poisoned: {e}")))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| HeraldError::Store(format!("database task failed: {e}")))?
    }
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn sql_limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn conversion_error(idx: usize, ty: Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, message.into())
}

pub(crate) fn column_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| conversion_error(idx, Type::Integer, format!("timestamp out of range: {millis}")))
}

pub(crate) fn column_opt_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<i64>>(idx)? {
        None => Ok(None),
        Some(_) => column_time(row, idx).map(Some),
    }
}

/// Read a TEXT column through `FromStr` (ids, status enums).
pub(crate) fn column_parse<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: T::Err| conversion_error(idx, Type::Text, format!("{raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn millis_round_trip_keeps_precision() {
        let at = Utc.timestamp_millis_opt(1_704_110_400_123).unwrap();
        let back = DateTime::from_timestamp_millis(to_millis(at)).unwrap();
        assert_eq!(back, at);
    }

    #[tokio::test]
    async fn open_file_database_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("herald.db");
        let first = SqliteDatabase::open(&path).unwrap();
        let second = SqliteDatabase::open(&path).unwrap();

        let tables = |db: SqliteDatabase| async move {
            db.with_conn(|conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                    [],
                    |row| row.get(0),
                )?;
                Ok(n)
            })
            .await
            .unwrap()
        };
        assert_eq!(tables(first).await, 4);
        assert_eq!(tables(second).await, 4);
    }
}

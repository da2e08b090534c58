use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, TransactionBehavior, params};

use super::{SqliteDatabase, column_opt_time, column_parse, column_time, sql_limit, to_millis};
use crate::domain::{ItemId, Job, JobId, JobState};
use crate::error::Result;
use crate::observability::JobCounts;
use crate::ports::DelayQueue;

const JOB_COLUMNS: &str =
    "id, item_id, fire_at, state, attempts_made, last_error, created_at, updated_at, finished_at";

/// Stored state as observed at `?1` (a due `delayed` row reads as `waiting`).
const OBSERVED_STATE: &str =
    "CASE WHEN state = 'delayed' AND fire_at <= ?1 THEN 'waiting' ELSE state END";

const PAUSED_KEY: &str = "paused";

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<Job> {
    Ok(Job {
        id: column_parse(row, 0)?,
        item_id: column_parse(row, 1)?,
        fire_at: column_time(row, 2)?,
        state: column_parse(row, 3)?,
        attempts_made: row.get(4)?,
        last_error: row.get(5)?,
        created_at: column_time(row, 6)?,
        updated_at: column_time(row, 7)?,
        finished_at: column_opt_time(row, 8)?,
    })
}

/// Delay queue over the `jobs` and `queue_meta` tables.
#[derive(Clone)]
pub struct SqliteDelayQueue {
    db: SqliteDatabase,
}

impl SqliteDelayQueue {
    pub fn new(db: SqliteDatabase) -> Self {
        Self { db }
    }

    async fn set_paused(&self, paused: bool) -> Result<()> {
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO queue_meta (key, value) VALUES (?1, ?2)
                     ON CONFLICT (key) DO UPDATE SET value = excluded.value",
                    params![PAUSED_KEY, if paused { "1" } else { "0" }],
                )?;
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl DelayQueue for SqliteDelayQueue {
    async fn enqueue_replacing(&self, job: Job) -> Result<usize> {
        self.db
            .with_conn(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let retired = tx.execute(
                    "DELETE FROM jobs WHERE item_id = ?1 AND state IN ('delayed','active')",
                    [job.item_id.to_key()],
                )?;
                tx.execute(
                    "INSERT INTO jobs
                     (id, item_id, fire_at, state, attempts_made, last_error,
                      created_at, updated_at, finished_at)
                     VALUES (?1,?2,?3,'delayed',?4,?5,?6,?7,NULL)",
                    params![
                        job.id.to_key(),
                        job.item_id.to_key(),
                        to_millis(job.fire_at),
                        job.attempts_made,
                        job.last_error,
                        to_millis(job.created_at),
                        to_millis(job.updated_at),
                    ],
                )?;
                tx.commit()?;
                Ok(retired)
            })
            .await
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>> {
        self.db
            .with_conn(move |conn| {
                let job = conn
                    .query_row(
                        &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                        [id.to_key()],
                        row_to_job,
                    )
                    .optional()?;
                Ok(job)
            })
            .await
    }

    async fn live_job_for(&self, item_id: ItemId) -> Result<Option<Job>> {
        self.db
            .with_conn(move |conn| {
                let job = conn
                    .query_row(
                        &format!(
                            "SELECT {JOB_COLUMNS} FROM jobs
                             WHERE item_id = ?1 AND state IN ('delayed','active')"
                        ),
                        [item_id.to_key()],
                        row_to_job,
                    )
                    .optional()?;
                Ok(job)
            })
            .await
    }

    async fn remove_live(&self, item_id: ItemId) -> Result<usize> {
        self.db
            .with_conn(move |conn| {
                let n = conn.execute(
                    "DELETE FROM jobs WHERE item_id = ?1 AND state IN ('delayed','active')",
                    [item_id.to_key()],
                )?;
                Ok(n)
            })
            .await
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>> {
        self.db
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs
                     WHERE state = 'delayed' AND fire_at <= ?1
                     ORDER BY fire_at, id
                     LIMIT ?2"
                ))?;
                let jobs = stmt
                    .query_map(params![to_millis(now), sql_limit(limit)], row_to_job)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(jobs)
            })
            .await
    }

    async fn mark_active(&self, id: JobId, now: DateTime<Utc>) -> Result<Option<Job>> {
        self.db
            .with_conn(move |conn| {
                let job = conn
                    .query_row(
                        &format!(
                            "UPDATE jobs
                             SET state = 'active', attempts_made = attempts_made + 1, updated_at = ?2
                             WHERE id = ?1 AND state = 'delayed'
                             RETURNING {JOB_COLUMNS}"
                        ),
                        params![id.to_key(), to_millis(now)],
                        row_to_job,
                    )
                    .optional()?;
                Ok(job)
            })
            .await
    }

    async fn mark_completed(&self, id: JobId, now: DateTime<Utc>) -> Result<()> {
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "UPDATE jobs SET state = 'completed', updated_at = ?2, finished_at = ?2
                     WHERE id = ?1 AND state = 'active'",
                    params![id.to_key(), to_millis(now)],
                )?;
                Ok(())
            })
            .await
    }

    async fn mark_failed(&self, id: JobId, error: &str, now: DateTime<Utc>) -> Result<()> {
        let error = error.to_string();
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "UPDATE jobs
                     SET state = 'failed', last_error = ?2, updated_at = ?3, finished_at = ?3
                     WHERE id = ?1 AND state = 'active'",
                    params![id.to_key(), error, to_millis(now)],
                )?;
                Ok(())
            })
            .await
    }

    async fn requeue(
        &self,
        id: JobId,
        fire_at: DateTime<Utc>,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let error = error.map(str::to_string);
        self.db
            .with_conn(move |conn| {
                let n = conn.execute(
                    "UPDATE jobs
                     SET state = 'delayed', fire_at = ?2,
                         last_error = COALESCE(?3, last_error), updated_at = ?4
                     WHERE id = ?1 AND state IN ('delayed','active')",
                    params![id.to_key(), to_millis(fire_at), error, to_millis(now)],
                )?;
                Ok(n == 1)
            })
            .await
    }

    async fn counts(&self, now: DateTime<Utc>) -> Result<JobCounts> {
        self.db
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {OBSERVED_STATE} AS observed, COUNT(*) FROM jobs GROUP BY observed"
                ))?;
                let mut counts = JobCounts::default();
                let rows = stmt.query_map([to_millis(now)], |row| {
                    Ok((column_parse::<JobState>(row, 0)?, row.get::<_, i64>(1)?))
                })?;
                for row in rows {
                    let (state, n) = row?;
                    counts.add(state, usize::try_from(n).unwrap_or(0));
                }
                Ok(counts)
            })
            .await
    }

    async fn list(
        &self,
        state: JobState,
        now: DateTime<Utc>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Job>> {
        self.db
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs
                     WHERE {OBSERVED_STATE} = ?2
                     ORDER BY fire_at, id
                     LIMIT ?3 OFFSET ?4"
                ))?;
                let jobs = stmt
                    .query_map(
                        params![
                            to_millis(now),
                            state.as_str(),
                            sql_limit(limit),
                            sql_limit(offset),
                        ],
                        row_to_job,
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(jobs)
            })
            .await
    }

    async fn purge(&self, finished_before: DateTime<Utc>) -> Result<usize> {
        self.db
            .with_conn(move |conn| {
                let n = conn.execute(
                    "DELETE FROM jobs
                     WHERE state IN ('completed','failed') AND finished_at <= ?1",
                    [to_millis(finished_before)],
                )?;
                Ok(n)
            })
            .await
    }

    async fn reset(&self) -> Result<usize> {
        self.db
            .with_conn(|conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let removed = tx.execute("DELETE FROM jobs", [])?;
                tx.execute("DELETE FROM queue_meta WHERE key = ?1", [PAUSED_KEY])?;
                tx.commit()?;
                Ok(removed)
            })
            .await
    }

    async fn pause(&self) -> Result<()> {
        self.set_paused(true).await
    }

    async fn resume(&self) -> Result<()> {
        self.set_paused(false).await
    }

    async fn is_paused(&self) -> Result<bool> {
        self.db
            .with_conn(|conn| {
                let value: Option<String> = conn
                    .query_row(
                        "SELECT value FROM queue_meta WHERE key = ?1",
                        [PAUSED_KEY],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(value.as_deref() == Some("1"))
            })
            .await
    }
}

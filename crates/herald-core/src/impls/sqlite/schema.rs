use rusqlite::Connection;

use crate::error::Result;

/// Initialise the schema in `conn` (idempotent).
///
/// Timestamps are epoch milliseconds. `waiting` is never stored for jobs: a
/// `delayed` row whose `fire_at` has passed is reported as waiting.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS items (
            id             TEXT    NOT NULL PRIMARY KEY,
            owner_id       TEXT    NOT NULL,
            content        TEXT    NOT NULL,
            status         TEXT    NOT NULL
                CHECK (status IN ('draft','scheduled','publishing','published','failed')),
            scheduled_for  INTEGER,
            external_id    TEXT,
            published_at   INTEGER,
            attempts       INTEGER NOT NULL DEFAULT 0,
            error_kind     TEXT,
            error_message  TEXT,
            created_at     INTEGER NOT NULL,
            updated_at     INTEGER NOT NULL,
            CHECK ((external_id IS NULL) = (status <> 'published'))
        ) STRICT;

        -- SELECT ... WHERE status = 'scheduled' AND scheduled_for <= ?
        CREATE INDEX IF NOT EXISTS idx_items_due ON items (status, scheduled_for);

        CREATE TABLE IF NOT EXISTS jobs (
            id             TEXT    NOT NULL PRIMARY KEY,
            item_id        TEXT    NOT NULL,
            fire_at        INTEGER NOT NULL,
            state          TEXT    NOT NULL
                CHECK (state IN ('delayed','active','completed','failed')),
            attempts_made  INTEGER NOT NULL DEFAULT 0,
            last_error     TEXT,
            created_at     INTEGER NOT NULL,
            updated_at     INTEGER NOT NULL,
            finished_at    INTEGER
        ) STRICT;

        -- At most one live job per item.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_live_item
            ON jobs (item_id) WHERE state IN ('delayed','active');
        CREATE INDEX IF NOT EXISTS idx_jobs_fire_at ON jobs (state, fire_at);

        CREATE TABLE IF NOT EXISTS queue_meta (
            key    TEXT NOT NULL PRIMARY KEY,
            value  TEXT NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS activity (
            id           TEXT    NOT NULL PRIMARY KEY,
            item_id      TEXT    NOT NULL,
            origin       TEXT    NOT NULL,
            outcome      TEXT    NOT NULL,
            external_id  TEXT,
            error        TEXT,
            recorded_at  INTEGER NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_activity_item ON activity (item_id, recorded_at);
        ",
    )?;
    Ok(())
}

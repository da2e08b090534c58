//! Impls - port implementations.
//!
//! - In-memory stores for tests and the demo (`InMemoryItemStore`,
//!   `InMemoryActivityLog`; the delay queue lives in `queue`).
//! - SQLite adapters sharing one database file.
//! - `HttpPublishApi` for a real endpoint, `ScriptedPublishApi` for tests.

pub mod credentials;
pub mod http_publish;
pub mod memory_activity;
pub mod memory_store;
pub mod scripted_publish;
pub mod sqlite;

pub use self::credentials::StaticCredentials;
pub use self::http_publish::HttpPublishApi;
pub use self::memory_activity::InMemoryActivityLog;
pub use self::memory_store::InMemoryItemStore;
pub use self::scripted_publish::{ScriptedPublishApi, Step};
pub use self::sqlite::{SqliteActivityLog, SqliteDatabase, SqliteDelayQueue, SqliteItemStore};

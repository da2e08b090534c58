use thiserror::Error;

use crate::domain::{ItemId, ItemStatus, JobId, PublishError};

#[derive(Debug, Error)]
pub enum HeraldError {
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("item not found: {0}")]
    ItemNotFound(ItemId),

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// The item is being published (or already was) and can no longer be
    /// changed by the caller.
    #[error("item {id} is {status}; it can no longer be changed")]
    ItemBusy { id: ItemId, status: ItemStatus },

    #[error("item {id}: cannot move from {from} to {to}")]
    InvalidTransition {
        id: ItemId,
        from: ItemStatus,
        to: ItemStatus,
    },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, HeraldError>;

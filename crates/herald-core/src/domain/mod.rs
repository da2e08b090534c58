//! Domain model (ids, items, jobs, outcomes, error classification).

pub mod activity;
pub mod errors;
pub mod ids;
pub mod item;
pub mod job;
pub mod outcome;

pub use activity::ActivityRecord;
pub use errors::{ErrorKind, ItemError, PublishError};
pub use ids::{ActivityId, ExternalId, ItemId, JobId, OwnerId};
pub use item::{ItemStatus, ScheduledItem};
pub use job::{Job, JobState, JobView};
pub use outcome::{AttemptOutcome, ItemFailure, Origin, SweepReport};

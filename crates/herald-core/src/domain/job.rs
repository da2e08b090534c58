//! Delay-queue job: ephemeral tracking record for one item's scheduled run.
//!
//! A job's terminal state is advisory. The fallback scanner can publish an
//! item without touching its job, so only the item's status and external id
//! say whether publication happened.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ItemId, JobId};

/// Job state.
///
/// State transitions:
/// - Delayed -> Waiting            (fire time elapsed; derived on read)
/// - Delayed/Waiting -> Active     (picked by a queue sweep)
/// - Active -> Delayed             (requeued with backoff)
/// - Active -> Completed | Failed
///
/// `Waiting` is never stored: a stored `Delayed` job whose `fire_at` has
/// passed is reported as `Waiting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Delayed,
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub const ALL: [JobState; 5] = [
        JobState::Delayed,
        JobState::Waiting,
        JobState::Active,
        JobState::Completed,
        JobState::Failed,
    ];

    /// Live jobs count against the one-live-job-per-item invariant.
    pub fn is_live(self) -> bool {
        matches!(self, JobState::Delayed | JobState::Waiting | JobState::Active)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Delayed => "delayed",
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delayed" => Ok(JobState::Delayed),
            "waiting" => Ok(JobState::Waiting),
            "active" => Ok(JobState::Active),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            other => Err(format!("unknown job state: {other}")),
        }
    }
}

/// Job record.
///
/// State transitions happen through methods, the same way for every queue
/// implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub item_id: ItemId,
    pub fire_at: DateTime<Utc>,
    pub state: JobState,

    /// Number of times a queue sweep picked this job.
    pub attempts_made: u32,

    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: JobId, item_id: ItemId, fire_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            item_id,
            fire_at,
            state: JobState::Delayed,
            attempts_made: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    /// State as observed at `now` (promotes elapsed delayed jobs to waiting).
    pub fn state_at(&self, now: DateTime<Utc>) -> JobState {
        match self.state {
            JobState::Delayed | JobState::Waiting if self.fire_at <= now => JobState::Waiting,
            JobState::Waiting => JobState::Delayed,
            other => other,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state_at(now) == JobState::Waiting
    }

    /// Mark as active (increment attempts).
    pub fn start_attempt(&mut self, now: DateTime<Utc>) {
        self.state = JobState::Active;
        self.attempts_made += 1;
        self.updated_at = now;
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.state = JobState::Completed;
        self.updated_at = now;
        self.finished_at = Some(now);
    }

    pub fn mark_failed(&mut self, error: String, now: DateTime<Utc>) {
        self.state = JobState::Failed;
        self.last_error = Some(error);
        self.updated_at = now;
        self.finished_at = Some(now);
    }

    /// Put the job back to sleep until `fire_at`.
    pub fn requeue(&mut self, fire_at: DateTime<Utc>, error: Option<String>, now: DateTime<Utc>) {
        self.state = JobState::Delayed;
        self.fire_at = fire_at;
        if error.is_some() {
            self.last_error = error;
        }
        self.updated_at = now;
    }
}

/// Serializable listing row for the introspection API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub job_id: JobId,
    pub item_id: ItemId,
    pub state: JobState,
    pub fire_at: DateTime<Utc>,
    pub attempts_made: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl JobView {
    pub fn new(job: &Job, now: DateTime<Utc>) -> Self {
        Self {
            job_id: job.id,
            item_id: job.item_id,
            state: job.state_at(now),
            fire_at: job.fire_at,
            attempts_made: job.attempts_made,
            last_error: job.last_error.clone(),
        }
    }
}

//! Schedulable item: the authoritative record of whether publication happened.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::ItemError;
use super::ids::{ExternalId, ItemId, OwnerId};

/// Item status.
///
/// State transitions:
/// - Draft -> Scheduled                  (user schedules)
/// - Scheduled -> Draft                  (user withdraws)
/// - Scheduled -> Publishing             (claim won)
/// - Publishing -> Published             (terminal)
/// - Publishing -> Scheduled             (retryable failure, or reconciled as absent)
/// - Publishing -> Failed                (terminal until the user reschedules)
/// - Failed -> Scheduled                 (user reschedules)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Draft,
    Scheduled,
    Publishing,
    Published,
    Failed,
}

impl ItemStatus {
    /// Statuses a user may (re)schedule from.
    pub fn is_schedulable(self) -> bool {
        matches!(
            self,
            ItemStatus::Draft | ItemStatus::Scheduled | ItemStatus::Failed
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Published)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Draft => "draft",
            ItemStatus::Scheduled => "scheduled",
            ItemStatus::Publishing => "publishing",
            ItemStatus::Published => "published",
            ItemStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ItemStatus::Draft),
            "scheduled" => Ok(ItemStatus::Scheduled),
            "publishing" => Ok(ItemStatus::Publishing),
            "published" => Ok(ItemStatus::Published),
            "failed" => Ok(ItemStatus::Failed),
            other => Err(format!("unknown item status: {other}")),
        }
    }
}

/// A unit of content with a publication schedule.
///
/// Invariant: `external_id.is_some()` if and only if `status == Published`.
/// Stores only mutate items through single conditional updates; this struct
/// is a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledItem {
    pub id: ItemId,
    pub owner_id: OwnerId,
    pub content: String,
    pub status: ItemStatus,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub external_id: Option<ExternalId>,
    pub published_at: Option<DateTime<Utc>>,

    /// Consecutive failed publish attempts since the user last scheduled it.
    pub attempts: u32,

    pub last_error: Option<ItemError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledItem {
    pub fn draft(id: ItemId, owner_id: OwnerId, content: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            owner_id,
            content: content.into(),
            status: ItemStatus::Draft,
            scheduled_for: None,
            external_id: None,
            published_at: None,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Does this item satisfy the claim predicate at `now`?
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ItemStatus::Scheduled && self.scheduled_for.is_some_and(|at| at <= now)
    }

    pub fn is_ambiguous(&self) -> bool {
        self.status == ItemStatus::Publishing
            && self
                .last_error
                .as_ref()
                .is_some_and(|e| e.kind == super::errors::ErrorKind::Ambiguous)
    }
}

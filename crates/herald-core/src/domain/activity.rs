//! Activity records: append-only audit trail of publish attempts.
//!
//! Never read for synchronization; only for "what happened to my post".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ActivityId, ExternalId, ItemId};
use super::outcome::{AttemptOutcome, Origin};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: ActivityId,
    pub item_id: ItemId,
    pub origin: Origin,

    /// `published`, `retrying`, `failed`, `ambiguous`, ...
    pub outcome: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<ExternalId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub recorded_at: DateTime<Utc>,
}

impl ActivityRecord {
    pub fn from_outcome(
        id: ActivityId,
        item_id: ItemId,
        origin: Origin,
        outcome: &AttemptOutcome,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        let (external_id, error) = match outcome {
            AttemptOutcome::Published { external_id } => (Some(external_id.clone()), None),
            AttemptOutcome::Retrying { error, .. }
            | AttemptOutcome::Failed { error }
            | AttemptOutcome::Ambiguous { error } => (None, Some(error.to_string())),
            AttemptOutcome::ClaimLost => (None, None),
        };
        Self {
            id,
            item_id,
            origin,
            outcome: outcome.label().to_string(),
            external_id,
            error,
            recorded_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::{ErrorKind, ItemError};
    use chrono::TimeZone;
    use ulid::Ulid;

    #[test]
    fn failure_outcome_carries_error_text() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let record = ActivityRecord::from_outcome(
            ActivityId::from_ulid(Ulid::new()),
            ItemId::from_ulid(Ulid::new()),
            Origin::QueueSweep,
            &AttemptOutcome::Failed {
                error: ItemError::new(ErrorKind::Authorization, "token revoked"),
            },
            now,
        );

        assert_eq!(record.outcome, "failed");
        assert_eq!(record.error.as_deref(), Some("authorization: token revoked"));
        assert!(record.external_id.is_none());
    }
}

//! Outcome model: what one publish attempt and one sweep produced.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::ItemError;
use super::ids::{ExternalId, ItemId};

/// Which entry point drove an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Delay-queue consumer sweep.
    QueueSweep,
    /// Periodic external trigger running the fallback scan.
    PeriodicScan,
    /// A client session checking its own due items.
    ClientCheck,
    /// "Publish now" from the owner.
    Manual,
    /// Reconciliation of ambiguous or stale claims.
    Reconciler,
}

impl Origin {
    pub fn as_str(self) -> &'static str {
        match self {
            Origin::QueueSweep => "queue_sweep",
            Origin::PeriodicScan => "periodic_scan",
            Origin::ClientCheck => "client_check",
            Origin::Manual => "manual",
            Origin::Reconciler => "reconciler",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Origin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queue_sweep" => Ok(Origin::QueueSweep),
            "periodic_scan" => Ok(Origin::PeriodicScan),
            "client_check" => Ok(Origin::ClientCheck),
            "manual" => Ok(Origin::Manual),
            "reconciler" => Ok(Origin::Reconciler),
            other => Err(format!("unknown origin: {other}")),
        }
    }
}

/// Result of the shared claim -> publish path for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The external call succeeded and the item is `published`.
    Published { external_id: ExternalId },

    /// Transient failure; item re-armed to `scheduled` at `fire_at`.
    Retrying {
        fire_at: DateTime<Utc>,
        attempts: u32,
        error: ItemError,
    },

    /// Terminal failure; item is `failed`.
    Failed { error: ItemError },

    /// Remote outcome unknown; item held in `publishing` for reconciliation.
    Ambiguous { error: ItemError },

    /// Another caller owns (or already finished) the item. Not an error.
    ClaimLost,
}

impl AttemptOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::Published { .. } => "published",
            AttemptOutcome::Retrying { .. } => "retrying",
            AttemptOutcome::Failed { .. } => "failed",
            AttemptOutcome::Ambiguous { .. } => "ambiguous",
            AttemptOutcome::ClaimLost => "claim_lost",
        }
    }
}

/// A per-item error collected during a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub item_id: ItemId,
    pub error: String,
}

/// Summary returned by every sweep.
///
/// One item's failure never aborts the rest of the batch; it lands in
/// `errors` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub origin: Origin,
    pub published: usize,
    pub retried: usize,
    pub failed: usize,
    pub ambiguous: usize,
    pub skipped: usize,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub paused: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ItemFailure>,
}

impl SweepReport {
    pub fn new(origin: Origin) -> Self {
        Self {
            origin,
            published: 0,
            retried: 0,
            failed: 0,
            ambiguous: 0,
            skipped: 0,
            paused: false,
            errors: Vec::new(),
        }
    }

    pub fn tally(&mut self, outcome: &AttemptOutcome) {
        match outcome {
            AttemptOutcome::Published { .. } => self.published += 1,
            AttemptOutcome::Retrying { .. } => self.retried += 1,
            AttemptOutcome::Failed { .. } => self.failed += 1,
            AttemptOutcome::Ambiguous { .. } => self.ambiguous += 1,
            AttemptOutcome::ClaimLost => self.skipped += 1,
        }
    }

    pub fn record_error(&mut self, item_id: ItemId, error: impl fmt::Display) {
        self.errors.push(ItemFailure {
            item_id,
            error: error.to_string(),
        });
    }

    pub fn processed(&self) -> usize {
        self.published + self.retried + self.failed + self.ambiguous + self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::ErrorKind;
    use ulid::Ulid;

    #[test]
    fn tally_counts_each_outcome() {
        let mut report = SweepReport::new(Origin::QueueSweep);
        report.tally(&AttemptOutcome::Published {
            external_id: ExternalId::new("x1"),
        });
        report.tally(&AttemptOutcome::ClaimLost);
        report.tally(&AttemptOutcome::Failed {
            error: ItemError::new(ErrorKind::Permanent, "bad content"),
        });

        assert_eq!(report.published, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.processed(), 3);
    }

    #[test]
    fn report_omits_empty_errors_when_serialized() {
        let mut report = SweepReport::new(Origin::PeriodicScan);
        let v = serde_json::to_value(&report).unwrap();
        assert!(v.get("errors").is_none());
        assert!(v.get("paused").is_none());
        assert_eq!(v["origin"], "periodic_scan");

        report.record_error(ItemId::from_ulid(Ulid::new()), "store unavailable");
        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(v["errors"][0]["error"], "store unavailable");
    }

    #[test]
    fn attempt_outcome_is_tagged() {
        let v = serde_json::to_value(AttemptOutcome::ClaimLost).unwrap();
        assert_eq!(v["outcome"], "claim_lost");
    }
}

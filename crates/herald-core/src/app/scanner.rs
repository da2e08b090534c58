//! FallbackScanner - finds due items straight from the item store.
//!
//! Knows nothing about jobs, so it still publishes items whose job was lost.

use tracing::{error, info};

use super::engine::PublicationEngine;
use crate::domain::{Origin, OwnerId, SweepReport};
use crate::error::Result;

/// Which due items a scan covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanScope {
    /// Every owner (periodic trigger).
    All,
    /// One owner's items (client-initiated check).
    Owner(OwnerId),
}

impl ScanScope {
    fn origin(&self) -> Origin {
        match self {
            ScanScope::All => Origin::PeriodicScan,
            ScanScope::Owner(_) => Origin::ClientCheck,
        }
    }

    fn owner(&self) -> Option<&OwnerId> {
        match self {
            ScanScope::All => None,
            ScanScope::Owner(owner) => Some(owner),
        }
    }
}

pub struct FallbackScanner {
    engine: PublicationEngine,
}

impl FallbackScanner {
    pub fn new(engine: PublicationEngine) -> Self {
        Self { engine }
    }

    pub async fn sweep(&self, scope: ScanScope) -> Result<SweepReport> {
        let origin = scope.origin();
        let mut report = SweepReport::new(origin);

        let now = self.engine.clock.now();
        let due = self
            .engine
            .items
            .find_due(now, scope.owner(), self.engine.settings.batch_size)
            .await?;

        for item in due {
            match self.engine.attempt_publish(item.id, origin).await {
                Ok(outcome) => report.tally(&outcome),
                Err(err) => {
                    error!(item_id = %item.id, %origin, error = %err, "publish attempt failed");
                    report.record_error(item.id, err);
                }
            }
        }

        info!(
            %origin,
            published = report.published,
            retried = report.retried,
            failed = report.failed,
            ambiguous = report.ambiguous,
            skipped = report.skipped,
            errors = report.errors.len(),
            "fallback scan finished"
        );
        Ok(report)
    }
}

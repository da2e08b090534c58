//! Introspection - queue views and administration for operators.
//!
//! Every call takes an [`Operator`], which can only be obtained through
//! [`Introspection::authorize`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::engine::EngineSettings;
use crate::config::Environment;
use crate::domain::{JobState, JobView};
use crate::error::{HeraldError, Result};
use crate::observability::QueueStats;
use crate::ports::clock::before;
use crate::ports::{Clock, DelayQueue};

/// Proof that the caller presented the operator token.
#[derive(Debug)]
pub struct Operator {
    _private: (),
}

/// Zero-based page request. `size` is capped by the configured maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub number: usize,
    pub size: usize,
}

impl Page {
    pub fn new(number: usize, size: usize) -> Self {
        Self { number, size }
    }

    pub fn first(size: usize) -> Self {
        Self::new(0, size)
    }
}

pub struct Introspection {
    queue: Arc<dyn DelayQueue>,
    clock: Arc<dyn Clock>,
    settings: Arc<EngineSettings>,
}

impl Introspection {
    pub fn new(queue: Arc<dyn DelayQueue>, clock: Arc<dyn Clock>, settings: Arc<EngineSettings>) -> Self {
        Self {
            queue,
            clock,
            settings,
        }
    }

    pub fn authorize(&self, token: &str) -> Result<Operator> {
        let Some(expected) = self.settings.operator_token.as_deref() else {
            return Err(HeraldError::Configuration(
                "no operator token configured".to_string(),
            ));
        };
        if token != expected {
            warn!("rejected operator token");
            return Err(HeraldError::Unauthorized("invalid operator token".to_string()));
        }
        Ok(Operator { _private: () })
    }

    pub async fn stats(&self, _operator: &Operator) -> Result<QueueStats> {
        let counts = self.queue.counts(self.clock.now()).await?;
        let paused = self.queue.is_paused().await?;
        Ok(QueueStats { counts, paused })
    }

    pub async fn list_jobs(
        &self,
        _operator: &Operator,
        state: JobState,
        page: Page,
    ) -> Result<Vec<JobView>> {
        let size = page.size.clamp(1, self.settings.max_page_size.max(1));
        let offset = page.number.saturating_mul(size);
        let now = self.clock.now();
        let jobs = self.queue.list(state, now, offset, size).await?;
        Ok(jobs.iter().map(|job| JobView::new(job, now)).collect())
    }

    /// Stop queue sweeps from claiming new work. The fallback scanner is not
    /// affected.
    pub async fn pause(&self, _operator: &Operator) -> Result<()> {
        self.queue.pause().await?;
        info!("queue paused");
        Ok(())
    }

    pub async fn resume(&self, _operator: &Operator) -> Result<()> {
        self.queue.resume().await?;
        info!("queue resumed");
        Ok(())
    }

    /// Delete completed/failed jobs that finished more than `retention` ago.
    pub async fn purge(&self, _operator: &Operator, retention: Duration) -> Result<usize> {
        let cutoff = before(self.clock.now(), retention);
        let removed = self.queue.purge(cutoff).await?;
        info!(removed, %cutoff, "finished jobs purged");
        Ok(removed)
    }

    /// Drop every job. Refused in production.
    pub async fn reset(&self, _operator: &Operator) -> Result<usize> {
        if self.settings.environment == Environment::Production {
            return Err(HeraldError::Forbidden(
                "queue reset is disabled in production".to_string(),
            ));
        }
        let removed = self.queue.reset().await?;
        warn!(removed, "queue reset");
        Ok(removed)
    }
}

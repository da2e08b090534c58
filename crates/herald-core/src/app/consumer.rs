//! QueueConsumer - one invocation-triggered sweep over due delay-queue jobs.

use tracing::{error, info};

use super::engine::PublicationEngine;
use crate::domain::{AttemptOutcome, Job, Origin, SweepReport};
use crate::error::{HeraldError, Result};
use crate::ports::clock::after;

pub struct QueueConsumer {
    engine: PublicationEngine,
}

impl QueueConsumer {
    pub fn new(engine: PublicationEngine) -> Self {
        Self { engine }
    }

    /// Drive every due job (up to the batch size) through the shared publish
    /// path. One job's error never aborts the rest of the batch.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let mut report = SweepReport::new(Origin::QueueSweep);
        let queue = &self.engine.queue;
        if queue.is_paused().await? {
            info!("queue paused; sweep skipped");
            report.paused = true;
            return Ok(report);
        }

        let now = self.engine.clock.now();
        let due = queue.due(now, self.engine.settings.batch_size).await?;
        for job in due {
            // Another sweep may have picked it up since we listed it.
            let Some(job) = queue.mark_active(job.id, self.engine.clock.now()).await? else {
                report.skipped += 1;
                continue;
            };

            match self.engine.attempt_publish(job.item_id, Origin::QueueSweep).await {
                Ok(outcome) => {
                    report.tally(&outcome);
                    if let Err(e) = self.settle(&job, &outcome).await {
                        error!(job_id = %job.id, item_id = %job.item_id, error = %e, "failed to settle job");
                        report.record_error(job.item_id, e);
                    }
                }
                Err(err) => {
                    error!(job_id = %job.id, item_id = %job.item_id, error = %err, "publish attempt failed");
                    if let Err(e) = self.retry_job(&job, &err).await {
                        error!(job_id = %job.id, error = %e, "failed to reschedule job");
                    }
                    report.record_error(job.item_id, err);
                }
            }
        }

        info!(
            published = report.published,
            retried = report.retried,
            failed = report.failed,
            ambiguous = report.ambiguous,
            skipped = report.skipped,
            errors = report.errors.len(),
            "queue sweep finished"
        );
        Ok(report)
    }

    /// Reflect the item's outcome on its job. A retry was already requeued by
    /// the publisher. Finishing is a no-op once the job left `active`.
    async fn settle(&self, job: &Job, outcome: &AttemptOutcome) -> Result<()> {
        let now = self.engine.clock.now();
        match outcome {
            AttemptOutcome::Published { .. } | AttemptOutcome::ClaimLost => {
                self.engine.queue.mark_completed(job.id, now).await
            }
            AttemptOutcome::Retrying { .. } => Ok(()),
            AttemptOutcome::Failed { error } | AttemptOutcome::Ambiguous { error } => {
                self.engine
                    .queue
                    .mark_failed(job.id, &error.to_string(), now)
                    .await
            }
        }
    }

    /// The attempt itself errored (store unavailable, missing credentials...).
    /// Infrastructure errors get the job's own backoff; errors that cannot
    /// heal by waiting fail the job.
    async fn retry_job(&self, job: &Job, err: &HeraldError) -> Result<()> {
        let now = self.engine.clock.now();
        let retry = &self.engine.settings.retry;
        let hopeless = matches!(
            err,
            HeraldError::Configuration(_)
                | HeraldError::ItemNotFound(_)
                | HeraldError::InvalidTransition { .. }
        );
        if hopeless || !retry.allows_retry(job.attempts_made) {
            return self
                .engine
                .queue
                .mark_failed(job.id, &err.to_string(), now)
                .await;
        }

        let fire_at = after(now, retry.delay_for(job.attempts_made));
        self.engine
            .queue
            .requeue(job.id, fire_at, Some(&err.to_string()), now)
            .await?;
        Ok(())
    }
}

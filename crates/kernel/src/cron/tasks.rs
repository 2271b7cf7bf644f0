//! Jobs queued by content events.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use super::BackfillService;
use super::queue::{FailurePolicy, JOBS_QUEUE, JobOperation, TranslationJob};
use crate::error::{Severity, TranslatorError};
use crate::services::item_lock::ItemLockGuard;
use crate::services::orchestrator::Orchestrator;

/// Transient failures are retried on later runs this many times in total.
const MAX_ATTEMPTS: u32 = 3;

const EVENT_JOBS_LOCK: &str = "translation-jobs";

/// Counters for one drain of the job queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventJobStats {
    pub processed: usize,
    pub failed: usize,
    pub requeued: usize,
    /// Unreadable jobs and jobs for items that no longer exist.
    pub dropped: usize,
}

enum Disposition {
    Done,
    Failed,
    Dropped,
    Retry(TranslationJob),
}

impl BackfillService {
    /// Drain queued event jobs, one instance at a time.
    ///
    /// Jobs stay queued while no provider is configured.
    pub async fn process_event_jobs(&self) -> Result<EventJobStats> {
        let Some(guard) = ItemLockGuard::try_acquire(
            Arc::clone(&self.locks),
            EVENT_JOBS_LOCK,
            self.settings.lock_ttl,
        )
        .await?
        else {
            debug!("event job lock held by another instance, skipping");
            return Ok(EventJobStats::default());
        };

        let result = self.drain_jobs().await;

        if let Err(e) = guard.release().await {
            warn!(error = %e, "failed to release event job lock");
        }
        if let Ok(stats) = &result
            && *stats != EventJobStats::default()
        {
            info!(stats = ?stats, "processed event jobs");
        }
        result
    }

    async fn drain_jobs(&self) -> Result<EventJobStats> {
        let mut stats = EventJobStats::default();
        let provider = match self.registry.selected() {
            Ok(provider) => provider,
            Err(e) => {
                warn!(error = %e, "event jobs left queued");
                return Ok(stats);
            }
        };
        let orchestrator = self.orchestrator(provider);

        self.queue.requeue_unacked(JOBS_QUEUE).await?;

        let mut retry = Vec::new();
        let mut handled = 0usize;
        while handled < self.settings.max_jobs_per_run {
            let want = self
                .settings
                .job_batch
                .max(1)
                .min(self.settings.max_jobs_per_run - handled);
            let batch = self.queue.pop_batch(JOBS_QUEUE, want).await?;
            if batch.is_empty() {
                break;
            }
            handled += batch.len();

            for raw in batch {
                match self.run_job(&orchestrator, &raw).await {
                    Disposition::Done => stats.processed += 1,
                    Disposition::Failed => stats.failed += 1,
                    Disposition::Dropped => stats.dropped += 1,
                    Disposition::Retry(job) => retry.push(job),
                }
                self.queue.ack(JOBS_QUEUE, &raw).await?;
            }
        }

        // Requeued after the drain so a run never spins on the same job.
        for job in retry {
            self.queue.push(JOBS_QUEUE, &job.to_json()?).await?;
            stats.requeued += 1;
        }
        Ok(stats)
    }

    async fn run_job(&self, orchestrator: &Orchestrator, raw: &str) -> Disposition {
        let job = match TranslationJob::from_json(raw) {
            Ok(job) => job,
            Err(e) => {
                warn!(error = %e, job = %raw, "dropping unreadable job");
                return Disposition::Dropped;
            }
        };

        let item = match self.source.get(job.item).await {
            Ok(Some(item)) if !item.is_deleted() => item,
            Ok(_) => {
                debug!(item = %job.item, "item gone, dropping job");
                return Disposition::Dropped;
            }
            Err(e) => {
                return self.retry_or_fail(job, &TranslatorError::Storage(e));
            }
        };

        let result = match (job.operation, job.target.as_ref()) {
            (JobOperation::Detect, _) => orchestrator.detect(&item).await.map(|_| ()),
            (JobOperation::Translate, Some(target)) => {
                orchestrator.translate(&item, target).await.map(|_| ())
            }
            (JobOperation::Translate, None) => {
                warn!(item = %job.item, "translate job without a target, dropping");
                return Disposition::Dropped;
            }
        };

        match result {
            Ok(()) => Disposition::Done,
            Err(e) => self.retry_or_fail(job, &e),
        }
    }

    fn retry_or_fail(&self, mut job: TranslationJob, error: &TranslatorError) -> Disposition {
        if error.is_transient() && job.attempts + 1 < MAX_ATTEMPTS {
            job.attempts += 1;
            debug!(item = %job.item, attempts = job.attempts, error = %error, "job will be retried");
            return Disposition::Retry(job);
        }

        let target = job.target.as_ref().map(|t| t.as_str()).unwrap_or("-");
        match (job.policy, error.backfill_severity()) {
            (FailurePolicy::Surface, _) | (_, Severity::Warn) => {
                warn!(item = %job.item, target, error = %error, "translation job failed")
            }
            (_, Severity::Skip) => {
                info!(item = %job.item, target, error = %error, "translation job skipped")
            }
            (_, Severity::Silent) => {
                debug!(item = %job.item, target, error = %error, "translation job abandoned")
            }
        }
        Disposition::Failed
    }
}

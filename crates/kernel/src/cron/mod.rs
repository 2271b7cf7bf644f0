//! Scheduled backfill of detections and translations.
//!
//! Each content kind is backfilled under its own distributed lock so only one
//! instance scans a kind at a time. A run takes at most `rate` candidates,
//! newest first, and leaves a continuation cursor when it stops early.

pub mod queue;
mod tasks;

pub use queue::{
    FailurePolicy, JOBS_QUEUE, JobOperation, RedisQueue, TranslationJob, WorkQueue, cursor_queue,
};
pub use tasks::EventJobStats;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::content::{ContentItem, ContentKind, ItemRef, Translatable};
use crate::error::{Severity, TranslatorError};
use crate::locale::{LocaleTag, same_language};
use crate::metrics::Metrics;
use crate::provider::ProviderRegistry;
use crate::services::content_source::{CandidateFilter, ContentSource, ScanCursor};
use crate::services::item_lock::{Heartbeat, ItemLockGuard, LockManager};
use crate::services::orchestrator::{Orchestrator, OrchestratorOptions, TranslationOrigin};
use crate::services::translation_store::TranslationStore;

/// Backfill tunables.
#[derive(Debug, Clone)]
pub struct BackfillSettings {
    pub enabled: bool,
    pub target_locales: Vec<LocaleTag>,
    pub kinds: Vec<ContentKind>,
    /// Candidates per run and kind.
    pub rate: usize,
    pub public_only: bool,
    pub max_age: Option<chrono::Duration>,
    pub lock_ttl: Duration,
    pub heartbeat_interval: Duration,
    /// Items fetched per page while looking for candidates.
    pub page_size: usize,
    /// Event jobs popped per batch.
    pub job_batch: usize,
    /// Upper bound on event jobs handled by one call.
    pub max_jobs_per_run: usize,
}

impl Default for BackfillSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            target_locales: Vec::new(),
            kinds: ContentKind::ALL.to_vec(),
            rate: 50,
            public_only: true,
            max_age: None,
            lock_ttl: Duration::from_secs(300),
            heartbeat_interval: Duration::from_secs(60),
            page_size: 100,
            job_batch: 50,
            max_jobs_per_run: 500,
        }
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillStats {
    pub candidates: usize,
    pub detected: usize,
    pub translated: usize,
    pub cached: usize,
    /// Failures that will not change on retry.
    pub skipped: usize,
    pub failed: usize,
    /// Whether a continuation cursor was left for the next run.
    pub resumable: bool,
}

/// Result of a backfill run.
#[derive(Debug, Clone)]
pub enum BackfillResult {
    Completed(BackfillStats),
    /// Another instance holds this kind's lock.
    Skipped,
    Failed(String),
}

/// Item picked for processing, with the work it lacks.
#[derive(Debug)]
struct Candidate {
    item: ContentItem,
    needs_detection: bool,
    targets: Vec<LocaleTag>,
}

/// Runs backfills and event jobs against the selected provider.
#[derive(Clone)]
pub struct BackfillService {
    registry: ProviderRegistry,
    store: Arc<dyn TranslationStore>,
    locks: Arc<dyn LockManager>,
    queue: Arc<dyn WorkQueue>,
    source: Arc<dyn ContentSource>,
    orchestrator_options: OrchestratorOptions,
    settings: BackfillSettings,
    metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for BackfillService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackfillService")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish()
    }
}

impl BackfillService {
    pub fn new(
        registry: ProviderRegistry,
        store: Arc<dyn TranslationStore>,
        locks: Arc<dyn LockManager>,
        queue: Arc<dyn WorkQueue>,
        source: Arc<dyn ContentSource>,
        orchestrator_options: OrchestratorOptions,
        settings: BackfillSettings,
    ) -> Self {
        Self {
            registry,
            store,
            locks,
            queue,
            source,
            orchestrator_options,
            settings,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn settings(&self) -> &BackfillSettings {
        &self.settings
    }

    /// Backfill every configured kind in turn.
    pub async fn run_all(&self) -> Vec<(ContentKind, BackfillResult)> {
        let mut results = Vec::with_capacity(self.settings.kinds.len());
        for &kind in &self.settings.kinds {
            results.push((kind, self.run(kind).await));
        }
        results
    }

    /// One backfill pass over `kind`.
    pub async fn run(&self, kind: ContentKind) -> BackfillResult {
        let start = std::time::Instant::now();
        let job_key = format!("backfill:{kind}");

        let guard = match ItemLockGuard::try_acquire(
            Arc::clone(&self.locks),
            &job_key,
            self.settings.lock_ttl,
        )
        .await
        {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                debug!(kind = %kind, "backfill lock held by another instance, skipping");
                return BackfillResult::Skipped;
            }
            Err(e) => {
                warn!(kind = %kind, error = %e, "failed to acquire backfill lock");
                return BackfillResult::Failed(e.to_string());
            }
        };

        let heartbeat = guard.token().cloned().map(|token| {
            Heartbeat::spawn(
                Arc::clone(&self.locks),
                token,
                self.settings.lock_ttl,
                self.settings.heartbeat_interval,
            )
        });

        let result = self.run_locked(kind).await;

        if let Some(heartbeat) = heartbeat {
            heartbeat.stop().await;
        }
        if let Err(e) = guard.release().await {
            warn!(kind = %kind, error = %e, "failed to release backfill lock");
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            BackfillResult::Completed(stats) => {
                info!(kind = %kind, duration_ms, stats = ?stats, "backfill completed")
            }
            BackfillResult::Failed(reason) => {
                warn!(kind = %kind, duration_ms, reason = %reason, "backfill failed")
            }
            BackfillResult::Skipped => {}
        }
        result
    }

    async fn run_locked(&self, kind: ContentKind) -> BackfillResult {
        let settings = &self.settings;
        if !settings.enabled || settings.target_locales.is_empty() || settings.rate == 0 {
            debug!(kind = %kind, "backfill disabled or nothing to do");
            return BackfillResult::Completed(BackfillStats::default());
        }

        let provider = match self.registry.selected() {
            Ok(provider) => provider,
            Err(e) => {
                warn!(kind = %kind, error = %e, "backfill cannot run without a configured provider");
                return BackfillResult::Failed(e.to_string());
            }
        };
        let orchestrator = self.orchestrator(provider);

        let cursor_queue = cursor_queue(kind);
        let resume = match self.take_cursor(&cursor_queue).await {
            Ok(resume) => resume,
            Err(e) => {
                warn!(kind = %kind, error = %e, "failed to load backfill cursor, starting from newest");
                None
            }
        };

        let filter = CandidateFilter {
            public_only: settings.public_only,
            max_age: settings.max_age,
            now: Utc::now(),
        };
        let (candidates, rate_reached) = match self
            .select_candidates(kind, &filter, resume.as_ref().map(|(_, c)| *c))
            .await
        {
            Ok(selection) => selection,
            Err(e) => {
                // Put the cursor back so the next run resumes where this one would have.
                if let Some((raw, _)) = &resume
                    && let Err(restore) = self.queue.requeue_unacked(&cursor_queue).await
                {
                    warn!(kind = %kind, cursor = %raw, error = %restore, "failed to restore backfill cursor");
                }
                return BackfillResult::Failed(format!("{e:#}"));
            }
        };

        let mut stats = BackfillStats {
            candidates: candidates.len(),
            ..Default::default()
        };
        for candidate in &candidates {
            self.process_candidate(&orchestrator, kind, candidate, &mut stats)
                .await;
        }

        let next = if rate_reached {
            candidates.last().map(|c| ScanCursor::of(&c.item))
        } else {
            None
        };
        stats.resumable = next.is_some();
        if let Err(e) = self
            .replace_cursor(&cursor_queue, resume.map(|(raw, _)| raw), next)
            .await
        {
            warn!(kind = %kind, error = %e, "failed to store backfill cursor");
        }

        BackfillResult::Completed(stats)
    }

    fn orchestrator(&self, provider: Arc<dyn crate::provider::TranslationProvider>) -> Orchestrator {
        let orchestrator = Orchestrator::new(
            provider,
            Arc::clone(&self.store),
            Arc::clone(&self.locks),
            self.orchestrator_options.clone(),
        );
        match &self.metrics {
            Some(metrics) => orchestrator.with_metrics(Arc::clone(metrics)),
            None => orchestrator,
        }
    }

    /// Pop the stored cursor, recovering one left in flight by a crashed run.
    async fn take_cursor(&self, queue: &str) -> Result<Option<(String, ScanCursor)>> {
        self.queue.requeue_unacked(queue).await?;
        let Some(raw) = self.queue.pop_batch(queue, 1).await?.into_iter().next() else {
            return Ok(None);
        };
        match serde_json::from_str::<ScanCursor>(&raw) {
            Ok(cursor) => {
                debug!(queue = %queue, ?cursor, "resuming backfill");
                Ok(Some((raw, cursor)))
            }
            Err(e) => {
                warn!(queue = %queue, error = %e, "dropping unreadable backfill cursor");
                self.queue.ack(queue, &raw).await?;
                Ok(None)
            }
        }
    }

    async fn replace_cursor(
        &self,
        queue: &str,
        previous: Option<String>,
        next: Option<ScanCursor>,
    ) -> Result<()> {
        if let Some(raw) = previous {
            self.queue.ack(queue, &raw).await?;
        }
        if let Some(cursor) = next {
            self.queue.push(queue, &serde_json::to_string(&cursor)?).await?;
        }
        Ok(())
    }

    /// Scan newest first until `rate` items lacking work are found. The flag
    /// reports whether the scan stopped on the rate rather than the corpus end.
    async fn select_candidates(
        &self,
        kind: ContentKind,
        filter: &CandidateFilter,
        mut after: Option<ScanCursor>,
    ) -> Result<(Vec<Candidate>, bool)> {
        let page_size = self.settings.page_size.max(1);
        let mut candidates = Vec::new();

        loop {
            let page = self
                .source
                .eligible_page(kind, filter, after, page_size)
                .await?;
            let exhausted = page.len() < page_size;

            for item in page {
                after = Some(ScanCursor::of(&item));
                if !filter.admits(&item) {
                    continue;
                }
                if let Some(candidate) = self.missing_work(item).await? {
                    candidates.push(candidate);
                    if candidates.len() >= self.settings.rate {
                        return Ok((candidates, true));
                    }
                }
            }

            if exhausted {
                return Ok((candidates, false));
            }
        }
    }

    async fn missing_work(&self, item: ContentItem) -> Result<Option<Candidate>> {
        let item_ref = item.item_ref();
        let detected = self.store.get_detected_locale(item_ref).await?;
        let translated: HashSet<LocaleTag> = self
            .store
            .translated_locales(item_ref)
            .await?
            .into_iter()
            .collect();

        let targets: Vec<LocaleTag> = self
            .settings
            .target_locales
            .iter()
            .filter(|t| !translated.contains(*t))
            .filter(|t| !detected.as_ref().is_some_and(|d| same_language(d, t)))
            .cloned()
            .collect();

        let needs_detection = detected.is_none();
        Ok((needs_detection || !targets.is_empty()).then_some(Candidate {
            item,
            needs_detection,
            targets,
        }))
    }

    async fn process_candidate(
        &self,
        orchestrator: &Orchestrator,
        kind: ContentKind,
        candidate: &Candidate,
        stats: &mut BackfillStats,
    ) {
        let item_ref = candidate.item.item_ref();

        let source = match orchestrator.detect(&candidate.item).await {
            Ok(source) => source,
            Err(e) => {
                self.report(kind, item_ref, None, &e, stats);
                return;
            }
        };
        if candidate.needs_detection {
            stats.detected += 1;
            self.record(kind, "detected");
        }

        for target in &candidate.targets {
            if same_language(&source, target) {
                continue;
            }
            match orchestrator.translate(&candidate.item, target).await {
                Ok(outcome) => match outcome.origin {
                    TranslationOrigin::Translated => {
                        stats.translated += 1;
                        self.record(kind, "translated");
                    }
                    TranslationOrigin::Cached => stats.cached += 1,
                    TranslationOrigin::Identity => {}
                },
                Err(e) => self.report(kind, item_ref, Some(target), &e, stats),
            }
        }
    }

    fn report(
        &self,
        kind: ContentKind,
        item: ItemRef,
        target: Option<&LocaleTag>,
        error: &TranslatorError,
        stats: &mut BackfillStats,
    ) {
        let target = target.map(LocaleTag::as_str).unwrap_or("-");
        match error.backfill_severity() {
            Severity::Silent => {
                stats.skipped += 1;
                debug!(item = %item, target, error = %error, "backfill item deferred");
            }
            Severity::Skip => {
                stats.skipped += 1;
                info!(item = %item, target, error = %error, "backfill item skipped");
            }
            Severity::Warn => {
                stats.failed += 1;
                warn!(item = %item, target, error = %error, "backfill item failed");
            }
        }
        self.record(kind, error.kind());
    }

    fn record(&self, kind: ContentKind, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_backfill(kind.as_str(), outcome);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_disabled_and_cover_every_kind() {
        let settings = BackfillSettings::default();
        assert!(!settings.enabled);
        assert_eq!(settings.kinds.len(), ContentKind::ALL.len());
        assert!(settings.heartbeat_interval < settings.lock_ttl);
    }

    #[test]
    fn stats_start_empty() {
        let stats = BackfillStats::default();
        assert_eq!(stats.candidates + stats.translated + stats.failed, 0);
        assert!(!stats.resumable);
    }
}

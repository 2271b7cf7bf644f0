//! Detection and translation of a single item.
//!
//! Each call holds the item's lock for its whole sequence: resolve the
//! detected locale, short-circuit same-language requests, serve a fresh
//! stored translation, or call the provider chunk by chunk and persist the
//! filtered result.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::content::{FilterPipeline, Translatable, splitter};
use crate::error::TranslatorError;
use crate::locale::{LocaleTag, same_language};
use crate::metrics::Metrics;
use crate::provider::TranslationProvider;
use crate::services::item_lock::{ItemLockGuard, LockManager};
use crate::services::translation_store::{Translation, TranslationStore, source_digest};

/// Tunables for [`Orchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Longest source text sent for translation.
    pub max_translation_chars: usize,
    /// Lifetime of a per-item lock if its holder disappears.
    pub lock_ttl: Duration,
    /// How long to keep retrying a held item lock before `ItemBusy`.
    pub lock_wait: Duration,
    pub lock_retry_interval: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            max_translation_chars: 10_000,
            lock_ttl: Duration::from_secs(120),
            lock_wait: Duration::from_secs(3),
            lock_retry_interval: Duration::from_millis(100),
        }
    }
}

/// Where a translation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationOrigin {
    /// Source already in the target language; nothing stored.
    Identity,
    Cached,
    Translated,
}

#[derive(Debug, Clone)]
pub struct TranslationOutcome {
    pub text: String,
    pub source_locale: LocaleTag,
    pub origin: TranslationOrigin,
}

/// Coordinates provider, store and locks for one item at a time.
#[derive(Clone)]
pub struct Orchestrator {
    provider: Arc<dyn TranslationProvider>,
    store: Arc<dyn TranslationStore>,
    locks: Arc<dyn LockManager>,
    options: OrchestratorOptions,
    metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("provider", &self.provider.id())
            .field("options", &self.options)
            .finish()
    }
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn TranslationProvider>,
        store: Arc<dyn TranslationStore>,
        locks: Arc<dyn LockManager>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            provider,
            store,
            locks,
            options,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn provider(&self) -> &Arc<dyn TranslationProvider> {
        &self.provider
    }

    pub fn store(&self) -> &Arc<dyn TranslationStore> {
        &self.store
    }

    /// The item's source locale, detecting and storing it on first use.
    pub async fn detect(&self, item: &dyn Translatable) -> Result<LocaleTag, TranslatorError> {
        self.ensure_configured()?;
        let guard = self.lock(item).await?;
        let result = self.detect_locked(item).await;
        release(guard).await;
        result
    }

    /// The item's text in `target`.
    pub async fn translate(
        &self,
        item: &dyn Translatable,
        target: &LocaleTag,
    ) -> Result<TranslationOutcome, TranslatorError> {
        self.ensure_configured()?;
        let guard = self.lock(item).await?;
        let result = self.translate_locked(item, target).await;
        release(guard).await;
        result
    }

    fn ensure_configured(&self) -> Result<(), TranslatorError> {
        if self.provider.has_credentials() {
            Ok(())
        } else {
            Err(TranslatorError::MisconfiguredProvider(
                self.provider.id().to_string(),
            ))
        }
    }

    async fn lock(&self, item: &dyn Translatable) -> Result<ItemLockGuard, TranslatorError> {
        let item_ref = item.item_ref();
        let key = item_ref.lock_key();
        let deadline = tokio::time::Instant::now() + self.options.lock_wait;

        loop {
            let acquired =
                ItemLockGuard::try_acquire(Arc::clone(&self.locks), &key, self.options.lock_ttl)
                    .await
                    .map_err(TranslatorError::Storage)?;
            match acquired {
                Some(guard) => return Ok(guard),
                None if tokio::time::Instant::now() >= deadline => {
                    debug!(item = %item_ref, "item lock still held, giving up");
                    return Err(TranslatorError::ItemBusy(item_ref.to_string()));
                }
                None => tokio::time::sleep(self.options.lock_retry_interval).await,
            }
        }
    }

    async fn detect_locked(&self, item: &dyn Translatable) -> Result<LocaleTag, TranslatorError> {
        if let Some(locale) = item
            .detected_locale(self.store.as_ref())
            .await
            .map_err(TranslatorError::Storage)?
        {
            return Ok(locale);
        }

        let item_ref = item.item_ref();
        let text = item.text_for_detection();
        if text.trim().is_empty() {
            return Err(TranslatorError::ContentNotFound(format!(
                "text of {item_ref}"
            )));
        }

        let started = Instant::now();
        let detected = self.provider.detect(&text).await;
        self.record_call("detect", &detected, started);
        let locale = detected?;

        item.set_detected_locale(self.store.as_ref(), &locale)
            .await
            .map_err(TranslatorError::Storage)?;
        info!(item = %item_ref, locale = %locale, "detected source locale");
        Ok(locale)
    }

    async fn translate_locked(
        &self,
        item: &dyn Translatable,
        target: &LocaleTag,
    ) -> Result<TranslationOutcome, TranslatorError> {
        let item_ref = item.item_ref();
        let source_locale = self.detect_locked(item).await?;

        if same_language(&source_locale, target) {
            debug!(item = %item_ref, target = %target, "source already in target language");
            return Ok(TranslationOutcome {
                text: item.text_for_translation(false, usize::MAX),
                source_locale,
                origin: TranslationOrigin::Identity,
            });
        }

        let use_raw = self.provider.prefers_raw();
        let source_text = item.text_for_translation(use_raw, self.options.max_translation_chars);
        if source_text.trim().is_empty() {
            return Err(TranslatorError::ContentNotFound(format!(
                "text of {item_ref}"
            )));
        }

        let cached = item
            .translation_for(self.store.as_ref(), target)
            .await
            .map_err(TranslatorError::Storage)?;
        match cached {
            Some(row) if row.matches_source(&source_text) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_cache_hit();
                }
                return Ok(TranslationOutcome {
                    text: row.text,
                    source_locale,
                    origin: TranslationOrigin::Cached,
                });
            }
            Some(_) => debug!(item = %item_ref, target = %target, "stored translation is stale"),
            None => {}
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_miss();
        }

        if !self
            .provider
            .translate_supported(&source_locale, target)
            .await?
        {
            return Err(TranslatorError::UnsupportedLanguagePair {
                provider: self.provider.id().to_string(),
                source_locale: source_locale.to_string(),
                target: target.to_string(),
            });
        }

        let chunks = splitter::split(&source_text, self.provider.max_chunk_chars());
        let mut translated = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            translated.push(self.translate_chunk(chunk, &source_locale, target).await?);
        }

        let text = FilterPipeline::for_format(item.text_format(use_raw))
            .process(&splitter::join(&translated));

        let row = Translation {
            locale: target.clone(),
            text: text.clone(),
            translator: self.provider.id().to_string(),
            source_version: item.version(),
            source_digest: source_digest(&source_text),
        };
        item.set_translation(self.store.as_ref(), &row)
            .await
            .map_err(TranslatorError::Storage)?;

        info!(
            item = %item_ref,
            source = %source_locale,
            target = %target,
            chunks = chunks.len(),
            "stored translation"
        );
        Ok(TranslationOutcome {
            text,
            source_locale,
            origin: TranslationOrigin::Translated,
        })
    }

    /// Translate the body of a chunk, keeping its surrounding whitespace.
    async fn translate_chunk(
        &self,
        chunk: &str,
        source: &LocaleTag,
        target: &LocaleTag,
    ) -> Result<String, TranslatorError> {
        let body = chunk.trim();
        if body.is_empty() {
            return Ok(chunk.to_string());
        }
        let start = chunk.len() - chunk.trim_start().len();
        let end = start + body.len();

        let started = Instant::now();
        let result = self.provider.translate_text(body, Some(source), target).await;
        self.record_call("translate", &result, started);

        Ok(format!("{}{}{}", &chunk[..start], result?, &chunk[end..]))
    }

    fn record_call<T>(&self, operation: &str, result: &Result<T, TranslatorError>, started: Instant) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        let outcome = match result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics.record_provider_call(
            self.provider.id().as_str(),
            operation,
            outcome,
            started.elapsed().as_secs_f64(),
        );
    }
}

async fn release(guard: ItemLockGuard) {
    let key = guard.token().map(|t| t.key.clone()).unwrap_or_default();
    if let Err(e) = guard.release().await {
        warn!(key = %key, error = %e, "failed to release item lock");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn default_options_bound_lock_wait() {
        let options = OrchestratorOptions::default();
        assert!(options.lock_wait < options.lock_ttl);
        assert!(options.lock_retry_interval < options.lock_wait);
    }
}

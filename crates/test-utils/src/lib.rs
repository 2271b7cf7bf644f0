//! Polyglot test utilities.
//!
//! In-memory stand-ins for the provider, store, content source, locks and
//! queue, plus content fixtures and a harness wiring them together.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Mutex, RwLock};

use polyglot_kernel::config::Config;
use polyglot_kernel::content::{
    Category, ContentItem, ContentKind, ItemRef, Post, Tag, Topic, Translatable, Visibility,
};
use polyglot_kernel::cron::{BackfillService, BackfillSettings, WorkQueue};
use polyglot_kernel::error::TranslatorError;
use polyglot_kernel::locale::{self, LocaleTag};
use polyglot_kernel::provider::{ProviderId, ProviderRegistry, TranslationProvider};
use polyglot_kernel::services::content_source::{CandidateFilter, ContentSource, ScanCursor};
use polyglot_kernel::services::item_lock::{LockManager, LockToken};
use polyglot_kernel::services::orchestrator::{Orchestrator, OrchestratorOptions};
use polyglot_kernel::services::translation_store::{Translation, TranslationStore};
use polyglot_kernel::state::{AppState, AppStateParts};

/// Parse a locale tag that is known to be valid.
///
/// # Panics
///
/// Panics on malformed input.
pub fn tag(raw: &str) -> LocaleTag {
    #[allow(clippy::expect_used)]
    locale::normalize(raw).expect("valid locale tag")
}

type ErrorFactory = Arc<dyn Fn() -> TranslatorError + Send + Sync>;

/// One recorded `translate_text` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslateCall {
    pub text: String,
    pub source: Option<LocaleTag>,
    pub target: LocaleTag,
}

/// Scriptable translation provider.
///
/// Detection returns the first matching marker rule or the default locale.
/// Translation returns a scripted output for an exact (text, target) pair,
/// otherwise `"[target] text"`.
pub struct MockProvider {
    id: ProviderId,
    credentials: bool,
    max_chunk_chars: usize,
    prefers_raw: bool,
    delay: Option<Duration>,
    default_locale: LocaleTag,
    detect_rules: Vec<(String, LocaleTag)>,
    translations: HashMap<(String, LocaleTag), String>,
    failures: Vec<(String, ErrorFactory)>,
    detect_calls: AtomicUsize,
    translate_calls: Mutex<Vec<TranslateCall>>,
}

impl std::fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProvider")
            .field("id", &self.id)
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            id: ProviderId::DeepL,
            credentials: true,
            max_chunk_chars: 5000,
            prefers_raw: true,
            delay: None,
            default_locale: tag("en"),
            detect_rules: Vec::new(),
            translations: HashMap::new(),
            failures: Vec::new(),
            detect_calls: AtomicUsize::new(0),
            translate_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_id(mut self, id: ProviderId) -> Self {
        self.id = id;
        self
    }

    pub fn without_credentials(mut self) -> Self {
        self.credentials = false;
        self
    }

    pub fn with_chunk_size(mut self, max_chunk_chars: usize) -> Self {
        self.max_chunk_chars = max_chunk_chars;
        self
    }

    /// Prefer rendered text over raw source.
    pub fn rendered(mut self) -> Self {
        self.prefers_raw = false;
        self
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Locale returned when no rule matches.
    pub fn detecting(mut self, locale: &str) -> Self {
        self.default_locale = tag(locale);
        self
    }

    /// Detect `locale` for texts containing `marker`.
    pub fn detecting_when(mut self, marker: &str, locale: &str) -> Self {
        self.detect_rules.push((marker.to_string(), tag(locale)));
        self
    }

    pub fn with_translation(mut self, text: &str, target: &str, output: &str) -> Self {
        self.translations
            .insert((text.to_string(), tag(target)), output.to_string());
        self
    }

    /// Fail any call whose text contains `marker`.
    pub fn failing_when(
        mut self,
        marker: &str,
        error: impl Fn() -> TranslatorError + Send + Sync + 'static,
    ) -> Self {
        self.failures.push((marker.to_string(), Arc::new(error)));
        self
    }

    pub fn detect_calls(&self) -> usize {
        self.detect_calls.load(Ordering::SeqCst)
    }

    pub fn translate_calls(&self) -> Vec<TranslateCall> {
        self.translate_calls.lock().clone()
    }

    fn failure_for(&self, text: &str) -> Option<TranslatorError> {
        self.failures
            .iter()
            .find(|(marker, _)| text.contains(marker.as_str()))
            .map(|(_, make)| make())
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl TranslationProvider for MockProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn has_credentials(&self) -> bool {
        self.credentials
    }

    fn max_chunk_chars(&self) -> usize {
        self.max_chunk_chars
    }

    fn prefers_raw(&self) -> bool {
        self.prefers_raw
    }

    async fn detect(&self, text: &str) -> Result<LocaleTag, TranslatorError> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(error) = self.failure_for(text) {
            return Err(error);
        }
        Ok(self
            .detect_rules
            .iter()
            .find(|(marker, _)| text.contains(marker.as_str()))
            .map(|(_, locale)| locale.clone())
            .unwrap_or_else(|| self.default_locale.clone()))
    }

    async fn translate_text(
        &self,
        text: &str,
        source: Option<&LocaleTag>,
        target: &LocaleTag,
    ) -> Result<String, TranslatorError> {
        self.translate_calls.lock().push(TranslateCall {
            text: text.to_string(),
            source: source.cloned(),
            target: target.clone(),
        });
        self.pause().await;
        if let Some(error) = self.failure_for(text) {
            return Err(error);
        }
        Ok(self
            .translations
            .get(&(text.to_string(), target.clone()))
            .cloned()
            .unwrap_or_else(|| format!("[{target}] {text}")))
    }
}

/// In-memory [`TranslationStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    detected: DashMap<ItemRef, LocaleTag>,
    translations: DashMap<(ItemRef, LocaleTag), Translation>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detected(&self, item: ItemRef) -> Option<LocaleTag> {
        self.detected.get(&item).map(|l| l.clone())
    }

    pub fn translation(&self, item: ItemRef, locale: &str) -> Option<Translation> {
        self.translations
            .get(&(item, tag(locale)))
            .map(|t| t.clone())
    }

    pub fn translation_count(&self) -> usize {
        self.translations.len()
    }
}

#[async_trait]
impl TranslationStore for MemoryStore {
    async fn get_detected_locale(&self, item: ItemRef) -> Result<Option<LocaleTag>> {
        Ok(self.detected(item))
    }

    async fn set_detected_locale(&self, item: ItemRef, locale: &LocaleTag) -> Result<()> {
        self.detected.insert(item, locale.clone());
        Ok(())
    }

    async fn get_translation(
        &self,
        item: ItemRef,
        locale: &LocaleTag,
    ) -> Result<Option<Translation>> {
        Ok(self
            .translations
            .get(&(item, locale.clone()))
            .map(|t| t.clone()))
    }

    async fn set_translation(&self, item: ItemRef, translation: &Translation) -> Result<()> {
        self.translations
            .insert((item, translation.locale.clone()), translation.clone());
        Ok(())
    }

    async fn translated_locales(&self, item: ItemRef) -> Result<Vec<LocaleTag>> {
        let mut locales: Vec<LocaleTag> = self
            .translations
            .iter()
            .filter(|entry| entry.key().0 == item)
            .map(|entry| entry.key().1.clone())
            .collect();
        locales.sort();
        Ok(locales)
    }

    async fn invalidate_all(&self, item: ItemRef) -> Result<()> {
        self.detected.remove(&item);
        self.translations.retain(|(owner, _), _| *owner != item);
        Ok(())
    }
}

/// In-memory [`ContentSource`] applying the same eligibility rules and
/// ordering as the Postgres source.
#[derive(Debug, Default)]
pub struct MemoryContentSource {
    items: RwLock<Vec<ContentItem>>,
    page_requests: AtomicUsize,
}

impl MemoryContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by reference.
    pub fn upsert(&self, item: impl Into<ContentItem>) {
        let item = item.into();
        let mut items = self.items.write();
        let item_ref = item.item_ref();
        items.retain(|i| i.item_ref() != item_ref);
        items.push(item);
    }

    pub fn remove(&self, item: ItemRef) {
        self.items.write().retain(|i| i.item_ref() != item);
    }

    pub fn page_requests(&self) -> usize {
        self.page_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for MemoryContentSource {
    async fn get(&self, item: ItemRef) -> Result<Option<ContentItem>> {
        Ok(self
            .items
            .read()
            .iter()
            .find(|i| i.item_ref() == item)
            .cloned())
    }

    async fn eligible_page(
        &self,
        kind: ContentKind,
        filter: &CandidateFilter,
        after: Option<ScanCursor>,
        limit: usize,
    ) -> Result<Vec<ContentItem>> {
        self.page_requests.fetch_add(1, Ordering::SeqCst);
        let mut page: Vec<ContentItem> = self
            .items
            .read()
            .iter()
            .filter(|i| i.kind() == kind && filter.admits(i))
            .filter(|i| after.is_none_or(|c| c.precedes(i.version(), i.item_ref().id)))
            .cloned()
            .collect();
        page.sort_by(|a, b| {
            (b.version(), b.item_ref().id).cmp(&(a.version(), a.item_ref().id))
        });
        page.truncate(limit);
        Ok(page)
    }
}

/// In-memory [`LockManager`] with TTL expiry.
#[derive(Debug, Default)]
pub struct MemoryLocks {
    held: DashMap<String, (String, Instant)>,
    counter: AtomicU64,
}

impl MemoryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held
            .get(key)
            .is_some_and(|entry| entry.1 > Instant::now())
    }

    fn next_value(&self) -> String {
        format!("memory:{}", self.counter.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl LockManager for MemoryLocks {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>> {
        let now = Instant::now();
        let value = self.next_value();
        match self.held.entry(key.to_string()) {
            Entry::Occupied(entry) if entry.get().1 > now => Ok(None),
            Entry::Occupied(mut entry) => {
                entry.insert((value.clone(), now + ttl));
                Ok(Some(LockToken {
                    key: key.to_string(),
                    value,
                }))
            }
            Entry::Vacant(entry) => {
                entry.insert((value.clone(), now + ttl));
                Ok(Some(LockToken {
                    key: key.to_string(),
                    value,
                }))
            }
        }
    }

    async fn extend(&self, token: &LockToken, ttl: Duration) -> Result<bool> {
        match self.held.get_mut(&token.key) {
            Some(mut entry) if entry.0 == token.value => {
                entry.1 = Instant::now() + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, token: &LockToken) -> Result<()> {
        self.held
            .remove_if(&token.key, |_, (value, _)| *value == token.value);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct QueueLists {
    pending: VecDeque<String>,
    processing: Vec<String>,
}

/// In-memory [`WorkQueue`] with the same processing-list semantics as Redis.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, QueueLists>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waiting entries, oldest first.
    pub fn pending(&self, queue: &str) -> Vec<String> {
        self.queues
            .lock()
            .get(queue)
            .map(|q| q.pending.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Entries popped but not acknowledged.
    pub fn in_flight(&self, queue: &str) -> Vec<String> {
        self.queues
            .lock()
            .get(queue)
            .map(|q| q.processing.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn push(&self, queue: &str, item: &str) -> Result<()> {
        self.queues
            .lock()
            .entry(queue.to_string())
            .or_default()
            .pending
            .push_back(item.to_string());
        Ok(())
    }

    async fn pop_batch(&self, queue: &str, max: usize) -> Result<Vec<String>> {
        let mut queues = self.queues.lock();
        let lists = queues.entry(queue.to_string()).or_default();
        let mut batch = Vec::new();
        while batch.len() < max {
            let Some(item) = lists.pending.pop_front() else {
                break;
            };
            lists.processing.push(item.clone());
            batch.push(item);
        }
        Ok(batch)
    }

    async fn ack(&self, queue: &str, item: &str) -> Result<()> {
        if let Some(lists) = self.queues.lock().get_mut(queue)
            && let Some(pos) = lists.processing.iter().position(|i| i == item)
        {
            lists.processing.remove(pos);
        }
        Ok(())
    }

    async fn requeue_unacked(&self, queue: &str) -> Result<u64> {
        let mut queues = self.queues.lock();
        let Some(lists) = queues.get_mut(queue) else {
            return Ok(0);
        };
        let moved = lists.processing.len() as u64;
        for item in lists.processing.drain(..).rev() {
            lists.pending.push_front(item);
        }
        Ok(moved)
    }

    async fn len(&self, queue: &str) -> Result<u64> {
        Ok(self
            .queues
            .lock()
            .get(queue)
            .map_or(0, |q| q.pending.len() as u64))
    }
}

/// Fixed reference time so fixture ordering is deterministic.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// A public reply by a real user; newer ids are newer posts.
pub fn test_post(id: i64, raw: &str) -> Post {
    Post {
        id,
        topic_id: id,
        post_number: 2,
        author_id: Some(1),
        raw: raw.to_string(),
        cooked: String::new(),
        visibility: Visibility::Public,
        deleted: false,
        updated_at: base_time() + chrono::Duration::minutes(id),
    }
}

/// The post opening topic `topic_id`.
pub fn test_opening_post(id: i64, topic_id: i64, raw: &str) -> Post {
    Post {
        topic_id,
        post_number: 1,
        ..test_post(id, raw)
    }
}

pub fn test_topic(id: i64, title: &str) -> Topic {
    Topic {
        id,
        title: title.to_string(),
        lead_raw: None,
        author_id: Some(1),
        visibility: Visibility::Public,
        deleted: false,
        updated_at: base_time() + chrono::Duration::minutes(id),
    }
}

pub fn test_category(id: i64, name: &str, description: Option<&str>) -> Category {
    Category {
        id,
        name: name.to_string(),
        description: description.map(str::to_string),
        visibility: Visibility::Public,
        updated_at: base_time() + chrono::Duration::minutes(id),
    }
}

pub fn test_tag(id: i64, name: &str) -> Tag {
    Tag {
        id,
        name: name.to_string(),
        description: None,
        visibility: Visibility::Public,
        updated_at: base_time() + chrono::Duration::minutes(id),
    }
}

/// Backfill settings for tests: enabled, no age limit, short lock TTL.
pub fn test_backfill_settings(targets: &[&str], rate: usize) -> BackfillSettings {
    BackfillSettings {
        enabled: true,
        target_locales: targets.iter().map(|t| tag(t)).collect(),
        rate,
        max_age: None,
        lock_ttl: Duration::from_secs(30),
        heartbeat_interval: Duration::from_secs(10),
        page_size: 10,
        ..BackfillSettings::default()
    }
}

/// Orchestrator options that give up on a held lock quickly.
pub fn test_orchestrator_options() -> OrchestratorOptions {
    OrchestratorOptions {
        lock_wait: Duration::from_millis(200),
        lock_retry_interval: Duration::from_millis(20),
        ..OrchestratorOptions::default()
    }
}

/// Configuration with translation enabled and every key set.
pub fn test_config() -> Config {
    Config {
        port: 0,
        database_url: "postgres://localhost/polyglot_test".to_string(),
        redis_url: "redis://127.0.0.1:1/".to_string(),
        database_max_connections: 1,
        translator_enabled: true,
        translator_provider: ProviderId::DeepL,
        deepl_api_key: Some("test-key".to_string()),
        google_api_key: None,
        microsoft_api_key: None,
        microsoft_region: None,
        microsoft_endpoint: None,
        libretranslate_url: None,
        libretranslate_api_key: None,
        libretranslate_allow_private: false,
        llm_api_url: None,
        llm_api_key: None,
        llm_model: None,
        provider_timeout: Duration::from_secs(5),
        max_translation_chars: 10_000,
        default_locale: tag("en"),
        auto_translate_on_edit: true,
        backfill_target_locales: vec![tag("de"), tag("ja")],
        backfill_kinds: ContentKind::ALL.to_vec(),
        backfill_rate: 10,
        backfill_interval: Duration::ZERO,
        backfill_public_only: true,
        backfill_max_age_days: None,
        translate_rate_limit_per_minute: 0,
        cron_key: Some("cron-secret".to_string()),
        events_key: Some("events-secret".to_string()),
    }
}

/// Every in-memory collaborator, shared between the components built from it.
#[derive(Debug, Clone)]
pub struct Harness {
    pub provider: Arc<MockProvider>,
    pub store: Arc<MemoryStore>,
    pub source: Arc<MemoryContentSource>,
    pub locks: Arc<MemoryLocks>,
    pub queue: Arc<MemoryQueue>,
}

impl Harness {
    pub fn new(provider: MockProvider) -> Self {
        Self {
            provider: Arc::new(provider),
            store: Arc::new(MemoryStore::new()),
            source: Arc::new(MemoryContentSource::new()),
            locks: Arc::new(MemoryLocks::new()),
            queue: Arc::new(MemoryQueue::new()),
        }
    }

    pub fn registry(&self) -> ProviderRegistry {
        ProviderRegistry::single(self.provider.clone())
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            self.provider.clone(),
            self.store.clone(),
            self.locks.clone(),
            test_orchestrator_options(),
        )
    }

    pub fn backfill(&self, settings: BackfillSettings) -> BackfillService {
        BackfillService::new(
            self.registry(),
            self.store.clone(),
            self.locks.clone(),
            self.queue.clone(),
            self.source.clone(),
            test_orchestrator_options(),
            settings,
        )
    }

    /// Application state over the in-memory collaborators.
    ///
    /// The database pool connects lazily and Redis points at a closed port,
    /// so health checks report both as down and rate limiting fails open.
    ///
    /// # Panics
    ///
    /// Panics if the placeholder URLs in `config` do not parse.
    pub fn app_state(&self, config: Config) -> AppState {
        #[allow(clippy::expect_used)]
        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy(&config.database_url)
            .expect("lazy pool from placeholder url");
        #[allow(clippy::expect_used)]
        let redis = redis::Client::open(config.redis_url.as_str()).expect("redis url");

        AppState::from_parts(AppStateParts {
            db,
            redis,
            config,
            registry: self.registry(),
            store: self.store.clone(),
            locks: self.locks.clone(),
            queue: self.queue.clone(),
            source: self.source.clone(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_queue_requeues_in_original_order() {
        let queue = MemoryQueue::new();
        for item in ["a", "b", "c"] {
            queue.push("q", item).await.unwrap();
        }
        assert_eq!(queue.pop_batch("q", 2).await.unwrap(), vec!["a", "b"]);
        queue.ack("q", "a").await.unwrap();
        assert_eq!(queue.requeue_unacked("q").await.unwrap(), 1);
        assert_eq!(queue.pending("q"), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn memory_locks_are_exclusive_until_released() {
        let locks = MemoryLocks::new();
        let token = locks
            .try_acquire("k", Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert!(locks.try_acquire("k", Duration::from_secs(5)).await.unwrap().is_none());

        let stranger = LockToken {
            key: "k".into(),
            value: "other".into(),
        };
        locks.release(&stranger).await.unwrap();
        assert!(locks.is_held("k"));

        locks.release(&token).await.unwrap();
        assert!(!locks.is_held("k"));
    }

    #[tokio::test]
    async fn mock_provider_scripts_detection_and_translation() {
        let provider = MockProvider::new()
            .detecting("en")
            .detecting_when("Hallo", "de")
            .with_translation("Hello", "ja", "こんにちは");
        assert_eq!(provider.detect("Hallo Welt").await.unwrap(), tag("de"));
        assert_eq!(provider.detect("Hello").await.unwrap(), tag("en"));
        assert_eq!(
            provider.translate_text("Hello", None, &tag("ja")).await.unwrap(),
            "こんにちは"
        );
        assert_eq!(
            provider.translate_text("Bye", None, &tag("de")).await.unwrap(),
            "[de] Bye"
        );
        assert_eq!(provider.detect_calls(), 2);
        assert_eq!(provider.translate_calls().len(), 2);
    }
}

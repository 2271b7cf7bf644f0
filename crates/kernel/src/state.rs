//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use redis::Client as RedisClient;
use sqlx::PgPool;
use tracing::info;

use crate::config::Config;
use crate::cron::{BackfillService, RedisQueue, WorkQueue};
use crate::db;
use crate::error::TranslatorError;
use crate::locale::LocaleTag;
use crate::metrics::Metrics;
use crate::middleware::{AcceptLanguageNegotiator, RateLimitConfig, RateLimiter};
use crate::provider::ProviderRegistry;
use crate::services::content_source::{ContentSource, PgContentSource};
use crate::services::item_lock::{LockManager, RedisLockManager};
use crate::services::orchestrator::Orchestrator;
use crate::services::translation_store::{PgTranslationStore, TranslationStore};

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// PostgreSQL connection pool.
    db: PgPool,

    /// Redis client for locks, queues and rate limiting.
    redis: RedisClient,

    config: Config,

    /// Provider adapters and the configured selection.
    registry: ProviderRegistry,

    store: Arc<dyn TranslationStore>,

    locks: Arc<dyn LockManager>,

    queue: Arc<dyn WorkQueue>,

    /// Read-only view of the host's content tables.
    source: Arc<dyn ContentSource>,

    backfill: Arc<BackfillService>,

    /// Prometheus metrics.
    metrics: Arc<Metrics>,

    /// Rate limiter for on-demand translation.
    rate_limiter: Arc<RateLimiter>,

    /// Accept-Language matching against the configured target locales.
    ///
    /// Frozen at startup: changing target locales requires a restart.
    language_negotiator: AcceptLanguageNegotiator,
}

/// Collaborators for [`AppState::from_parts`].
pub struct AppStateParts {
    pub db: PgPool,
    pub redis: RedisClient,
    pub config: Config,
    pub registry: ProviderRegistry,
    pub store: Arc<dyn TranslationStore>,
    pub locks: Arc<dyn LockManager>,
    pub queue: Arc<dyn WorkQueue>,
    pub source: Arc<dyn ContentSource>,
}

impl AppState {
    /// Create new application state with database connections.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = db::create_pool(config)
            .await
            .context("failed to create database pool")?;

        db::run_migrations(&db)
            .await
            .context("failed to run migrations")?;

        let redis = RedisClient::open(config.redis_url.as_str())
            .context("failed to create Redis client")?;

        let mut conn = redis
            .get_multiplexed_async_connection()
            .await
            .context("failed to connect to Redis")?;

        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .context("Redis PING failed")?;

        let registry =
            ProviderRegistry::from_settings(config.translator_provider, &config.provider_settings())
                .context("failed to build translation providers")?;

        let state = Self::from_parts(AppStateParts {
            store: Arc::new(PgTranslationStore::new(db.clone())),
            source: Arc::new(PgContentSource::new(db.clone())),
            locks: Arc::new(RedisLockManager::new(redis.clone())),
            queue: Arc::new(RedisQueue::new(redis.clone())),
            db,
            redis,
            config: config.clone(),
            registry,
        });

        info!(
            provider = %config.translator_provider,
            enabled = config.translator_enabled,
            targets = ?config.backfill_target_locales,
            "application state initialized"
        );
        Ok(state)
    }

    /// Assemble state from already-built collaborators.
    pub fn from_parts(parts: AppStateParts) -> Self {
        let metrics = Arc::new(Metrics::new());

        let backfill = Arc::new(
            BackfillService::new(
                parts.registry.clone(),
                Arc::clone(&parts.store),
                Arc::clone(&parts.locks),
                Arc::clone(&parts.queue),
                Arc::clone(&parts.source),
                parts.config.backfill_orchestrator_options(),
                parts.config.backfill_settings(),
            )
            .with_metrics(Arc::clone(&metrics)),
        );

        let rate_limiter = Arc::new(RateLimiter::new(
            parts.redis.clone(),
            RateLimitConfig::per_minute(parts.config.translate_rate_limit_per_minute),
        ));

        let mut known = parts.config.backfill_target_locales.clone();
        if !known.contains(&parts.config.default_locale) {
            known.push(parts.config.default_locale.clone());
        }

        Self {
            inner: Arc::new(AppStateInner {
                db: parts.db,
                redis: parts.redis,
                config: parts.config,
                registry: parts.registry,
                store: parts.store,
                locks: parts.locks,
                queue: parts.queue,
                source: parts.source,
                backfill,
                metrics,
                rate_limiter,
                language_negotiator: AcceptLanguageNegotiator::new(known),
            }),
        }
    }

    /// Get the database pool.
    pub fn db(&self) -> &PgPool {
        &self.inner.db
    }

    /// Get the Redis client.
    pub fn redis(&self) -> &RedisClient {
        &self.inner.redis
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.inner.registry
    }

    pub fn store(&self) -> &Arc<dyn TranslationStore> {
        &self.inner.store
    }

    pub fn queue(&self) -> &Arc<dyn WorkQueue> {
        &self.inner.queue
    }

    pub fn source(&self) -> &Arc<dyn ContentSource> {
        &self.inner.source
    }

    pub fn backfill(&self) -> &Arc<BackfillService> {
        &self.inner.backfill
    }

    /// Get the metrics registry.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.inner.metrics
    }

    /// Get the rate limiter.
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.inner.rate_limiter
    }

    pub fn language_negotiator(&self) -> &AcceptLanguageNegotiator {
        &self.inner.language_negotiator
    }

    pub fn default_locale(&self) -> &LocaleTag {
        &self.inner.config.default_locale
    }

    /// An orchestrator bound to the selected provider.
    pub fn orchestrator(&self) -> Result<Orchestrator, TranslatorError> {
        let provider = self.inner.registry.selected()?;
        Ok(Orchestrator::new(
            provider,
            Arc::clone(&self.inner.store),
            Arc::clone(&self.inner.locks),
            self.inner.config.orchestrator_options(),
        )
        .with_metrics(Arc::clone(&self.inner.metrics)))
    }

    /// Check if PostgreSQL is healthy.
    pub async fn postgres_healthy(&self) -> bool {
        db::check_health(&self.inner.db).await
    }

    /// Check if Redis is healthy.
    pub async fn redis_healthy(&self) -> bool {
        let Ok(mut conn) = self.inner.redis.get_multiplexed_async_connection().await else {
            return false;
        };

        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.inner.config)
            .field("registry", &self.inner.registry)
            .finish()
    }
}

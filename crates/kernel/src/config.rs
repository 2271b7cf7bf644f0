//! Configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

use crate::content::ContentKind;
use crate::cron::BackfillSettings;
use crate::locale::{self, LocaleTag};
use crate::provider::{ProviderId, ProviderSettings};
use crate::services::orchestrator::OrchestratorOptions;

/// Application configuration.
#[derive(Clone)]
pub struct Config {
    /// HTTP server port (default: 3000).
    pub port: u16,

    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Redis connection URL.
    pub redis_url: String,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Master switch for detection and translation (default: false).
    pub translator_enabled: bool,

    /// Selected provider (default: deepl).
    pub translator_provider: ProviderId,

    pub deepl_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub microsoft_api_key: Option<String>,
    pub microsoft_region: Option<String>,
    /// Override for the Microsoft Translator endpoint.
    pub microsoft_endpoint: Option<String>,
    pub libretranslate_url: Option<String>,
    pub libretranslate_api_key: Option<String>,
    /// Allow LIBRETRANSLATE_URL to resolve to a private address (default: false).
    pub libretranslate_allow_private: bool,
    /// OpenAI-compatible chat completions base URL.
    pub llm_api_url: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,

    /// Timeout for every provider request (default: 30s).
    pub provider_timeout: Duration,

    /// Longest source text sent for translation (default: 10000).
    pub max_translation_chars: usize,

    /// Locale used when a request names none (default: en).
    pub default_locale: LocaleTag,

    /// Queue detection and translation jobs on create and edit (default: false).
    pub auto_translate_on_edit: bool,

    /// Locales every item is backfilled to (comma-separated, default: none).
    pub backfill_target_locales: Vec<LocaleTag>,

    /// Kinds covered by backfill (comma-separated, default: all).
    pub backfill_kinds: Vec<ContentKind>,

    /// Candidates per backfill run and kind; 0 disables (default: 50).
    pub backfill_rate: usize,

    /// Seconds between periodic backfill runs; 0 disables the loop (default: 300).
    pub backfill_interval: Duration,

    /// Only backfill publicly visible content (default: true).
    pub backfill_public_only: bool,

    /// Skip content older than this many days (default: unlimited).
    pub backfill_max_age_days: Option<u32>,

    /// On-demand translations per identity per minute; 0 disables (default: 10).
    pub translate_rate_limit_per_minute: u32,

    /// Secret path segment for `/cron/{key}`. When None, the endpoint is disabled.
    pub cron_key: Option<String>,

    /// Shared secret for `/content-events`. When None, the endpoint is disabled.
    pub events_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("PORT must be a valid port number")?;

        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid number")?;

        let translator_enabled = env_flag("TRANSLATOR_ENABLED", false);

        let translator_provider = env::var("TRANSLATOR_PROVIDER")
            .unwrap_or_else(|_| "deepl".to_string())
            .parse::<ProviderId>()
            .map_err(anyhow::Error::msg)
            .context("TRANSLATOR_PROVIDER must name a known provider")?;

        let provider_timeout = env::var("PROVIDER_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map(Duration::from_secs)
            .context("PROVIDER_TIMEOUT_SECS must be a valid number")?;

        let max_translation_chars = env::var("MAX_TRANSLATION_CHARS")
            .unwrap_or_else(|_| "10000".to_string())
            .parse()
            .context("MAX_TRANSLATION_CHARS must be a valid number")?;

        let default_locale = locale::normalize(
            &env::var("DEFAULT_LOCALE").unwrap_or_else(|_| "en".to_string()),
        )
        .context("DEFAULT_LOCALE must be a locale tag")?;

        let (backfill_target_locales, rejected) =
            locale::parse_locale_list(&env::var("BACKFILL_TARGET_LOCALES").unwrap_or_default());
        if !rejected.is_empty() {
            warn!(rejected = ?rejected, "ignoring invalid BACKFILL_TARGET_LOCALES entries");
        }

        let backfill_kinds = match env::var("BACKFILL_KINDS") {
            Ok(raw) if !raw.trim().is_empty() => parse_kinds(&raw)?,
            _ => ContentKind::ALL.to_vec(),
        };

        let backfill_rate = env::var("BACKFILL_RATE")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .context("BACKFILL_RATE must be a valid number")?;

        let backfill_interval = env::var("BACKFILL_INTERVAL_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .map(Duration::from_secs)
            .context("BACKFILL_INTERVAL_SECS must be a valid number")?;

        let backfill_max_age_days = match env::var("BACKFILL_MAX_AGE_DAYS") {
            Ok(raw) if !raw.trim().is_empty() => Some(
                raw.trim()
                    .parse()
                    .context("BACKFILL_MAX_AGE_DAYS must be a valid number")?,
            ),
            _ => None,
        };

        let translate_rate_limit_per_minute = env::var("TRANSLATE_RATE_LIMIT_PER_MINUTE")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("TRANSLATE_RATE_LIMIT_PER_MINUTE must be a valid number")?;

        Ok(Self {
            port,
            database_url,
            redis_url,
            database_max_connections,
            translator_enabled,
            translator_provider,
            deepl_api_key: env_secret("DEEPL_API_KEY"),
            google_api_key: env_secret("GOOGLE_API_KEY"),
            microsoft_api_key: env_secret("MICROSOFT_API_KEY"),
            microsoft_region: env_secret("MICROSOFT_REGION"),
            microsoft_endpoint: env_secret("MICROSOFT_ENDPOINT"),
            libretranslate_url: env_secret("LIBRETRANSLATE_URL"),
            libretranslate_api_key: env_secret("LIBRETRANSLATE_API_KEY"),
            libretranslate_allow_private: env_flag("LIBRETRANSLATE_ALLOW_PRIVATE", false),
            llm_api_url: env_secret("LLM_API_URL"),
            llm_api_key: env_secret("LLM_API_KEY"),
            llm_model: env_secret("LLM_MODEL"),
            provider_timeout,
            max_translation_chars,
            default_locale,
            auto_translate_on_edit: env_flag("AUTO_TRANSLATE_ON_EDIT", false),
            backfill_target_locales,
            backfill_kinds,
            backfill_rate,
            backfill_interval,
            backfill_public_only: env_flag("BACKFILL_PUBLIC_ONLY", true),
            backfill_max_age_days,
            translate_rate_limit_per_minute,
            cron_key: env_secret("CRON_KEY"),
            events_key: env_secret("EVENTS_KEY"),
        })
    }

    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            deepl_api_key: self.deepl_api_key.clone(),
            google_api_key: self.google_api_key.clone(),
            microsoft_api_key: self.microsoft_api_key.clone(),
            microsoft_region: self.microsoft_region.clone(),
            microsoft_endpoint: self.microsoft_endpoint.clone(),
            libretranslate_url: self.libretranslate_url.clone(),
            libretranslate_api_key: self.libretranslate_api_key.clone(),
            libretranslate_allow_private: self.libretranslate_allow_private,
            llm_api_url: self.llm_api_url.clone(),
            llm_api_key: self.llm_api_key.clone(),
            llm_model: self.llm_model.clone(),
            timeout: self.provider_timeout,
        }
    }

    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            max_translation_chars: self.max_translation_chars,
            ..OrchestratorOptions::default()
        }
    }

    /// Options for scheduled work: a held item lock is skipped, not waited on.
    pub fn backfill_orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            lock_wait: Duration::ZERO,
            ..self.orchestrator_options()
        }
    }

    pub fn backfill_settings(&self) -> BackfillSettings {
        BackfillSettings {
            enabled: self.translator_enabled,
            target_locales: self.backfill_target_locales.clone(),
            kinds: self.backfill_kinds.clone(),
            rate: self.backfill_rate,
            public_only: self.backfill_public_only,
            max_age: self
                .backfill_max_age_days
                .map(|days| chrono::Duration::days(i64::from(days))),
            ..BackfillSettings::default()
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("database_max_connections", &self.database_max_connections)
            .field("translator_enabled", &self.translator_enabled)
            .field("translator_provider", &self.translator_provider)
            .field("default_locale", &self.default_locale)
            .field("backfill_target_locales", &self.backfill_target_locales)
            .field("backfill_kinds", &self.backfill_kinds)
            .field("backfill_rate", &self.backfill_rate)
            .field("cron_key", &self.cron_key.is_some())
            .field("events_key", &self.events_key.is_some())
            .finish()
    }
}

/// Boolean env var; accepts 1/0, true/false, yes/no, on/off.
fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                warn!(var = name, value = %raw, "unrecognized boolean, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Optional string env var; blank counts as unset.
fn env_secret(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_kinds(raw: &str) -> Result<Vec<ContentKind>> {
    let mut kinds = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let kind = part
            .parse::<ContentKind>()
            .map_err(anyhow::Error::msg)
            .context("BACKFILL_KINDS must list post, topic, category or tag")?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_deduplicated_in_order() {
        let kinds = parse_kinds("topics, post,topic").unwrap();
        assert_eq!(kinds, vec![ContentKind::Topic, ContentKind::Post]);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(parse_kinds("post,widget").is_err());
    }
}

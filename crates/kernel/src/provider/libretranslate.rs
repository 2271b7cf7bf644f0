//! Self-hosted LibreTranslate adapter.
//!
//! The endpoint is operator supplied, so its host is resolved and checked
//! against private ranges before every request.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use url::Url;

use super::deepl::looks_like_html;
use super::net::{self, LanguageListCache};
use super::{ProviderId, TranslationProvider};
use crate::content::extract::{DETECTION_CHAR_LIMIT, truncate_chars};
use crate::error::TranslatorError;
use crate::locale::{self, LocaleTag};

const MAX_CHUNK_CHARS: usize = 5_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: String,
}

#[derive(Debug, Deserialize)]
struct DetectResult {
    language: String,
}

#[derive(Debug, Deserialize)]
struct LibreLanguage {
    code: String,
    #[serde(default)]
    targets: Vec<String>,
}

pub struct LibreTranslateProvider {
    client: reqwest::Client,
    base_url: Option<Url>,
    api_key: Option<String>,
    allow_private: bool,
    languages: LanguageListCache,
}

impl std::fmt::Debug for LibreTranslateProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibreTranslateProvider")
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("allow_private", &self.allow_private)
            .finish()
    }
}

impl LibreTranslateProvider {
    pub fn new(client: reqwest::Client, base_url: Option<String>, api_key: Option<String>) -> Self {
        let base_url = base_url
            .filter(|u| !u.trim().is_empty())
            .and_then(|u| match Url::parse(u.trim()) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
                Ok(_) | Err(_) => {
                    warn!(url = %u, "ignoring invalid LibreTranslate URL");
                    None
                }
            });

        Self {
            client,
            base_url,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            allow_private: false,
            languages: LanguageListCache::new(),
        }
    }

    /// Permit endpoints on loopback or private networks.
    pub fn with_private_addresses_allowed(mut self, allow: bool) -> Self {
        self.allow_private = allow;
        self
    }

    async fn endpoint(&self, path: &str) -> Result<Url, TranslatorError> {
        let base = self.base_url.as_ref().ok_or_else(|| {
            TranslatorError::MisconfiguredProvider(ProviderId::LibreTranslate.to_string())
        })?;
        net::ensure_public_host(base, self.allow_private).await?;

        let mut url = base.clone();
        let joined = format!("{}/{path}", url.path().trim_end_matches('/'));
        url.set_path(&joined);
        Ok(url)
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        mut body: serde_json::Value,
    ) -> Result<T, TranslatorError> {
        let url = self.endpoint(path).await?;
        if let Some(key) = &self.api_key {
            body["api_key"] = json!(key);
        }

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| net::send_error(ProviderId::LibreTranslate, e))?;
        net::read_json(ProviderId::LibreTranslate, response).await
    }

    /// Source codes mapped to the targets each can reach.
    async fn fetch_pairs(&self) -> Result<HashSet<String>, TranslatorError> {
        let url = self.endpoint("languages").await?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| net::send_error(ProviderId::LibreTranslate, e))?;

        let languages: Vec<LibreLanguage> =
            net::read_json(ProviderId::LibreTranslate, response).await?;

        let all: Vec<String> = languages.iter().map(|l| l.code.clone()).collect();
        let mut pairs = HashSet::new();
        for language in &languages {
            // Older servers omit `targets`; every language then reaches every other.
            let targets = if language.targets.is_empty() {
                &all
            } else {
                &language.targets
            };
            for target in targets {
                pairs.insert(pair_key(&language.code, target));
            }
        }
        Ok(pairs)
    }
}

fn pair_key(source: &str, target: &str) -> String {
    format!("{source}>{target}")
}

#[async_trait]
impl TranslationProvider for LibreTranslateProvider {
    fn id(&self) -> ProviderId {
        ProviderId::LibreTranslate
    }

    fn has_credentials(&self) -> bool {
        self.base_url.is_some()
    }

    fn max_chunk_chars(&self) -> usize {
        MAX_CHUNK_CHARS
    }

    async fn detect(&self, text: &str) -> Result<LocaleTag, TranslatorError> {
        let results: Vec<DetectResult> = self
            .post(
                "detect",
                json!({ "q": truncate_chars(text, DETECTION_CHAR_LIMIT) }),
            )
            .await?;

        let code = results.into_iter().next().map(|r| r.language).ok_or_else(|| {
            TranslatorError::provider(ProviderId::LibreTranslate.as_str(), "empty detection result")
        })?;
        Ok(locale::from_provider_code(&code, self.catalog())?)
    }

    async fn translate_text(
        &self,
        text: &str,
        source: Option<&LocaleTag>,
        target: &LocaleTag,
    ) -> Result<String, TranslatorError> {
        let target_code = locale::to_provider_code(target, self.catalog())?;
        let source_code = source
            .and_then(|s| locale::to_provider_code(s, self.catalog()).ok())
            .unwrap_or("auto");
        let format = if looks_like_html(text) { "html" } else { "text" };

        let response: TranslateResponse = self
            .post(
                "translate",
                json!({
                    "q": text,
                    "source": source_code,
                    "target": target_code,
                    "format": format,
                }),
            )
            .await?;
        Ok(response.translated_text)
    }

    async fn translate_supported(
        &self,
        source: &LocaleTag,
        target: &LocaleTag,
    ) -> Result<bool, TranslatorError> {
        let catalog = self.catalog();
        let (Ok(source_code), Ok(target_code)) = (
            locale::to_provider_code(source, catalog),
            locale::to_provider_code(target, catalog),
        ) else {
            return Ok(false);
        };

        match self
            .languages
            .get_or_fetch("pairs", self.fetch_pairs())
            .await
        {
            Ok(pairs) => Ok(pairs.contains(&pair_key(source_code, target_code).to_ascii_lowercase())),
            Err(e @ TranslatorError::LookupFailure(_)) => Err(e),
            Err(e) => {
                warn!(error = %e, "LibreTranslate language list unavailable, using static catalog");
                Ok(true)
            }
        }
    }
}

//! DeepL adapter (`/v2/translate`, `/v2/languages`).

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::net::{self, LanguageListCache};
use super::{ProviderId, TranslationProvider};
use crate::content::extract::DETECTION_CHAR_LIMIT;
use crate::error::TranslatorError;
use crate::locale::{self, LocaleTag};

const FREE_API: &str = "https://api-free.deepl.com";
const PRO_API: &str = "https://api.deepl.com";
const MAX_CHUNK_CHARS: usize = 10_000;

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translations: Vec<DeepLTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeepLTranslation {
    detected_source_language: Option<String>,
    text: String,
}

#[derive(Debug, Deserialize)]
struct DeepLLanguage {
    language: String,
}

pub struct DeepLProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: Option<String>,
    languages: LanguageListCache,
}

impl std::fmt::Debug for DeepLProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeepLProvider")
            .field("base_url", &self.base_url())
            .finish()
    }
}

impl DeepLProvider {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: None,
            languages: LanguageListCache::new(),
        }
    }

    /// Point the adapter at a different host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Free-tier keys end in `:fx` and use a separate host.
    fn base_url(&self) -> &str {
        match (&self.base_url, &self.api_key) {
            (Some(url), _) => url.trim_end_matches('/'),
            (None, Some(key)) if key.ends_with(":fx") => FREE_API,
            _ => PRO_API,
        }
    }

    fn auth_header(&self) -> Result<String, TranslatorError> {
        self.api_key
            .as_deref()
            .map(|k| format!("DeepL-Auth-Key {k}"))
            .ok_or_else(|| TranslatorError::MisconfiguredProvider(ProviderId::DeepL.to_string()))
    }

    async fn translate_request(
        &self,
        text: &str,
        source_code: Option<&str>,
        target_code: &str,
    ) -> Result<DeepLTranslation, TranslatorError> {
        let mut form = vec![("text", text), ("target_lang", target_code)];
        if let Some(code) = source_code {
            form.push(("source_lang", code));
        }
        if looks_like_html(text) {
            form.push(("tag_handling", "html"));
        }

        let response = self
            .client
            .post(format!("{}/v2/translate", self.base_url()))
            .header("Authorization", self.auth_header()?)
            .form(&form)
            .send()
            .await
            .map_err(|e| net::send_error(ProviderId::DeepL, e))?;

        let body: TranslateResponse = net::read_json(ProviderId::DeepL, response).await?;
        body.translations.into_iter().next().ok_or_else(|| {
            TranslatorError::provider(ProviderId::DeepL.as_str(), "empty translations array")
        })
    }

    async fn fetch_languages(&self, kind: &'static str) -> Result<HashSet<String>, TranslatorError> {
        let response = self
            .client
            .get(format!("{}/v2/languages", self.base_url()))
            .query(&[("type", kind)])
            .header("Authorization", self.auth_header()?)
            .send()
            .await
            .map_err(|e| net::send_error(ProviderId::DeepL, e))?;

        let languages: Vec<DeepLLanguage> = net::read_json(ProviderId::DeepL, response).await?;
        debug!(kind, count = languages.len(), "fetched DeepL language list");
        Ok(languages.into_iter().map(|l| l.language).collect())
    }

    /// DeepL source languages are base codes only (`EN`, not `EN-US`).
    fn source_code(&self, source: &LocaleTag) -> Option<String> {
        locale::to_provider_code(&source.base(), self.catalog())
            .ok()
            .map(|_| source.language().to_ascii_uppercase())
    }
}

pub(crate) fn looks_like_html(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with('<') && trimmed.contains("</")
}

#[async_trait]
impl TranslationProvider for DeepLProvider {
    fn id(&self) -> ProviderId {
        ProviderId::DeepL
    }

    fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    fn max_chunk_chars(&self) -> usize {
        MAX_CHUNK_CHARS
    }

    /// DeepL has no detect endpoint; the translate response reports the source.
    async fn detect(&self, text: &str) -> Result<LocaleTag, TranslatorError> {
        let sample = crate::content::extract::truncate_chars(text, DETECTION_CHAR_LIMIT);
        let result = self.translate_request(sample, None, "EN-US").await?;
        let code = result.detected_source_language.ok_or_else(|| {
            TranslatorError::provider(ProviderId::DeepL.as_str(), "no detected language")
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
        let source_code = source.and_then(|s| self.source_code(s));
        let result = self
            .translate_request(text, source_code.as_deref(), target_code)
            .await?;
        Ok(result.text)
    }

    async fn translate_supported(
        &self,
        source: &LocaleTag,
        target: &LocaleTag,
    ) -> Result<bool, TranslatorError> {
        if !self.catalog().supports_pair(source, target) {
            return Ok(false);
        }
        let (Some(source_code), Ok(target_code)) = (
            self.source_code(source),
            locale::to_provider_code(target, self.catalog()),
        ) else {
            return Ok(false);
        };

        let sources = self
            .languages
            .get_or_fetch("source", self.fetch_languages("source"))
            .await;
        let targets = self
            .languages
            .get_or_fetch("target", self.fetch_languages("target"))
            .await;

        match (sources, targets) {
            (Ok(sources), Ok(targets)) => Ok(sources.contains(&source_code.to_ascii_lowercase())
                && targets.contains(&target_code.to_ascii_lowercase())),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "DeepL language list unavailable, using static catalog");
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> DeepLProvider {
        let client = net::build_client(Duration::from_secs(5)).unwrap();
        DeepLProvider::new(client, Some("test-key:fx".into())).with_base_url(server.uri())
    }

    fn tag(s: &str) -> LocaleTag {
        locale::normalize(s).unwrap()
    }

    #[test]
    fn free_keys_use_free_host() {
        let client = reqwest::Client::new();
        assert_eq!(
            DeepLProvider::new(client.clone(), Some("abc:fx".into())).base_url(),
            FREE_API
        );
        assert_eq!(DeepLProvider::new(client.clone(), Some("abc".into())).base_url(), PRO_API);
        assert!(!DeepLProvider::new(client, Some("  ".into())).has_credentials());
    }

    #[tokio::test]
    async fn translates_with_provider_codes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/translate"))
            .and(header("Authorization", "DeepL-Auth-Key test-key:fx"))
            .and(body_string_contains("target_lang=PT-BR"))
            .and(body_string_contains("source_lang=EN"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "translations": [{"detected_source_language": "EN", "text": "Olá mundo"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let out = provider(&server)
            .translate_text("Hello world", Some(&tag("en-GB")), &tag("pt_BR"))
            .await
            .unwrap();
        assert_eq!(out, "Olá mundo");
    }

    #[tokio::test]
    async fn detects_from_translate_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/translate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "translations": [{"detected_source_language": "DE", "text": "Hello"}]
            })))
            .mount(&server)
            .await;

        let detected = provider(&server).detect("Hallo").await.unwrap();
        assert_eq!(detected.as_str(), "de");
    }

    #[tokio::test]
    async fn quota_exceeded_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/translate"))
            .respond_with(ResponseTemplate::new(456))
            .mount(&server)
            .await;

        let err = provider(&server)
            .translate_text("Hello", None, &tag("de"))
            .await
            .unwrap_err();
        assert!(matches!(err, TranslatorError::RateLimited(_)));
    }

    #[tokio::test]
    async fn unsupported_target_fails_before_any_request() {
        let server = MockServer::start().await;
        let err = provider(&server)
            .translate_text("Hello", None, &tag("tlh"))
            .await
            .unwrap_err();
        assert!(matches!(err, TranslatorError::UnsupportedLocale(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn live_language_list_decides_support() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/languages"))
            .and(query_param("type", "source"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"language": "EN", "name": "English"},
                {"language": "DE", "name": "German"}
            ])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/languages"))
            .and(query_param("type", "target"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"language": "DE", "name": "German"},
                {"language": "EN-US", "name": "English (American)"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let p = provider(&server);
        assert!(p.translate_supported(&tag("en"), &tag("de")).await.unwrap());
        assert!(!p.translate_supported(&tag("en"), &tag("ja")).await.unwrap());
        assert!(!p.translate_supported(&tag("tlh"), &tag("de")).await.unwrap());
    }

    #[test]
    fn html_detection() {
        assert!(looks_like_html("<p>Hello</p>"));
        assert!(!looks_like_html("1 < 2"));
    }
}

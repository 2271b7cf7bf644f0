//! Google Cloud Translation (v2 basic) adapter.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::deepl::looks_like_html;
use super::net::{self, LanguageListCache};
use super::{ProviderId, TranslationProvider};
use crate::content::extract::{DETECTION_CHAR_LIMIT, truncate_chars};
use crate::error::TranslatorError;
use crate::locale::{self, LocaleTag};

const API_URL: &str = "https://translation.googleapis.com/language/translate/v2";
const MAX_CHUNK_CHARS: usize = 5_000;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Translations {
    translations: Vec<GoogleTranslation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleTranslation {
    translated_text: String,
}

#[derive(Debug, Deserialize)]
struct Detections {
    detections: Vec<Vec<Detection>>,
}

#[derive(Debug, Deserialize)]
struct Detection {
    language: String,
}

#[derive(Debug, Deserialize)]
struct Languages {
    languages: Vec<Language>,
}

#[derive(Debug, Deserialize)]
struct Language {
    language: String,
}

pub struct GoogleProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    languages: LanguageListCache,
}

impl std::fmt::Debug for GoogleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleProvider")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GoogleProvider {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: API_URL.to_string(),
            languages: LanguageListCache::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn key(&self) -> Result<&str, TranslatorError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| TranslatorError::MisconfiguredProvider(ProviderId::Google.to_string()))
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<T, TranslatorError> {
        let response = self
            .client
            .post(format!("{}{endpoint}", self.base_url))
            .query(&[("key", self.key()?)])
            .json(&body)
            .send()
            .await
            .map_err(|e| net::send_error(ProviderId::Google, e))?;

        let envelope: Envelope<T> = net::read_json(ProviderId::Google, response).await?;
        Ok(envelope.data)
    }

    async fn fetch_languages(&self) -> Result<HashSet<String>, TranslatorError> {
        let response = self
            .client
            .get(format!("{}/languages", self.base_url))
            .query(&[("key", self.key()?)])
            .send()
            .await
            .map_err(|e| net::send_error(ProviderId::Google, e))?;

        let envelope: Envelope<Languages> = net::read_json(ProviderId::Google, response).await?;
        Ok(envelope
            .data
            .languages
            .into_iter()
            .map(|l| l.language)
            .collect())
    }
}

#[async_trait]
impl TranslationProvider for GoogleProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Google
    }

    fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    fn max_chunk_chars(&self) -> usize {
        MAX_CHUNK_CHARS
    }

    async fn detect(&self, text: &str) -> Result<LocaleTag, TranslatorError> {
        let data: Detections = self
            .post(
                "/detect",
                json!({ "q": truncate_chars(text, DETECTION_CHAR_LIMIT) }),
            )
            .await?;

        let code = data
            .detections
            .into_iter()
            .flatten()
            .next()
            .map(|d| d.language)
            .filter(|l| l != "und")
            .ok_or_else(|| {
                TranslatorError::provider(ProviderId::Google.as_str(), "language undetermined")
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
        let format = if looks_like_html(text) { "html" } else { "text" };
        let mut body = json!({
            "q": text,
            "target": target_code,
            "format": format,
        });
        if let Some(code) = source.and_then(|s| locale::to_provider_code(s, self.catalog()).ok()) {
            body["source"] = json!(code);
        }

        let data: Translations = self.post("", body).await?;
        data.translations
            .into_iter()
            .next()
            .map(|t| t.translated_text)
            .ok_or_else(|| {
                TranslatorError::provider(ProviderId::Google.as_str(), "empty translations array")
            })
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
            .get_or_fetch("all", self.fetch_languages())
            .await
        {
            Ok(codes) => Ok(codes.contains(&source_code.to_ascii_lowercase())
                && codes.contains(&target_code.to_ascii_lowercase())),
            Err(e) => {
                warn!(error = %e, "Google language list unavailable, using static catalog");
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
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> GoogleProvider {
        let client = net::build_client(Duration::from_secs(5)).unwrap();
        GoogleProvider::new(client, Some("gkey".into())).with_base_url(server.uri())
    }

    fn tag(s: &str) -> LocaleTag {
        locale::normalize(s).unwrap()
    }

    #[tokio::test]
    async fn translates_hebrew_with_legacy_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("key", "gkey"))
            .and(body_partial_json(serde_json::json!({"target": "iw", "format": "text"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"translations": [{"translatedText": "שלום עולם"}]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let out = provider(&server)
            .translate_text("Hello world", None, &tag("he"))
            .await
            .unwrap();
        assert_eq!(out, "שלום עולם");
    }

    #[tokio::test]
    async fn detection_maps_codes_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"detections": [[{"language": "zh-TW", "confidence": 0.98}]]}
            })))
            .mount(&server)
            .await;

        assert_eq!(provider(&server).detect("你好").await.unwrap().as_str(), "zh-TW");
    }

    #[tokio::test]
    async fn undetermined_language_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"detections": [[{"language": "und", "confidence": 0.1}]]}
            })))
            .mount(&server)
            .await;

        assert!(provider(&server).detect("???").await.is_err());
    }

    #[tokio::test]
    async fn auth_failure_is_permanent_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = provider(&server)
            .translate_text("Hello", None, &tag("de"))
            .await
            .unwrap_err();
        assert!(matches!(err, TranslatorError::Provider { transient: false, .. }));
    }

    #[tokio::test]
    async fn timeouts_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let client = net::build_client(Duration::from_millis(200)).unwrap();
        let p = GoogleProvider::new(client, Some("gkey".into())).with_base_url(server.uri());
        let err = p.translate_text("Hello", None, &tag("de")).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn language_list_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/languages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"languages": [{"language": "en"}, {"language": "de"}]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let p = provider(&server);
        assert!(p.translate_supported(&tag("en"), &tag("de")).await.unwrap());
        assert!(!p.translate_supported(&tag("en"), &tag("fr")).await.unwrap());
    }
}

//! Microsoft Translator (v3) adapter. Pair support comes from the static catalog.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::deepl::looks_like_html;
use super::net;
use super::{ProviderId, TranslationProvider};
use crate::content::extract::{DETECTION_CHAR_LIMIT, truncate_chars};
use crate::error::TranslatorError;
use crate::locale::{self, LocaleTag};

const DEFAULT_ENDPOINT: &str = "https://api.cognitive.microsofttranslator.com";
const API_VERSION: &str = "3.0";
const MAX_CHUNK_CHARS: usize = 10_000;

#[derive(Debug, Deserialize)]
struct TranslateResult {
    translations: Vec<MicrosoftTranslation>,
}

#[derive(Debug, Deserialize)]
struct MicrosoftTranslation {
    text: String,
}

#[derive(Debug, Deserialize)]
struct DetectResult {
    language: String,
}

pub struct MicrosoftProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    region: Option<String>,
    endpoint: String,
}

impl std::fmt::Debug for MicrosoftProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicrosoftProvider")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .finish()
    }
}

impl MicrosoftProvider {
    pub fn new(
        client: reqwest::Client,
        api_key: Option<String>,
        region: Option<String>,
        endpoint: Option<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            region: region.filter(|r| !r.trim().is_empty()),
            endpoint: endpoint
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    fn request(
        &self,
        operation: &str,
        params: &[(&str, &str)],
    ) -> Result<reqwest::RequestBuilder, TranslatorError> {
        let key = self.api_key.as_deref().ok_or_else(|| {
            TranslatorError::MisconfiguredProvider(ProviderId::Microsoft.to_string())
        })?;

        let mut builder = self
            .client
            .post(format!("{}/{operation}", self.endpoint))
            .query(&[("api-version", API_VERSION)])
            .query(params)
            .header("Ocp-Apim-Subscription-Key", key);
        if let Some(region) = &self.region {
            builder = builder.header("Ocp-Apim-Subscription-Region", region);
        }
        Ok(builder)
    }
}

#[async_trait]
impl TranslationProvider for MicrosoftProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Microsoft
    }

    fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    fn max_chunk_chars(&self) -> usize {
        MAX_CHUNK_CHARS
    }

    async fn detect(&self, text: &str) -> Result<LocaleTag, TranslatorError> {
        let response = self
            .request("detect", &[])?
            .json(&json!([{ "Text": truncate_chars(text, DETECTION_CHAR_LIMIT) }]))
            .send()
            .await
            .map_err(|e| net::send_error(ProviderId::Microsoft, e))?;

        let results: Vec<DetectResult> = net::read_json(ProviderId::Microsoft, response).await?;
        let code = results.into_iter().next().map(|r| r.language).ok_or_else(|| {
            TranslatorError::provider(ProviderId::Microsoft.as_str(), "empty detection result")
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
        let source_code = source.and_then(|s| locale::to_provider_code(s, self.catalog()).ok());

        let mut params = vec![("to", target_code)];
        if let Some(code) = source_code {
            params.push(("from", code));
        }
        if looks_like_html(text) {
            params.push(("textType", "html"));
        }

        let response = self
            .request("translate", &params)?
            .json(&json!([{ "Text": text }]))
            .send()
            .await
            .map_err(|e| net::send_error(ProviderId::Microsoft, e))?;

        let results: Vec<TranslateResult> =
            net::read_json(ProviderId::Microsoft, response).await?;
        results
            .into_iter()
            .next()
            .and_then(|r| r.translations.into_iter().next())
            .map(|t| t.text)
            .ok_or_else(|| {
                TranslatorError::provider(ProviderId::Microsoft.as_str(), "empty translation result")
            })
    }
}

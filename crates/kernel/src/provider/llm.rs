//! LLM adapter for OpenAI-compatible chat completion APIs (OpenAI, Ollama, vLLM).
//!
//! Detection and translation are prompt driven. The model works on raw text
//! so markdown survives.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::net;
use super::{ProviderId, TranslationProvider};
use crate::content::extract::{DETECTION_CHAR_LIMIT, truncate_chars};
use crate::error::TranslatorError;
use crate::locale::{self, LocaleTag};

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const MAX_CHUNK_CHARS: usize = 8_000;

const DETECT_PROMPT: &str = "You identify the language of text. Reply with only the \
IETF BCP 47 language tag of the user's text (for example en, de, pt-BR, zh-TW), \
nothing else.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

pub struct LlmProvider {
    client: reqwest::Client,
    api_url: Option<String>,
    api_key: Option<String>,
    model: String,
}

impl std::fmt::Debug for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmProvider")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .finish()
    }
}

impl LlmProvider {
    pub fn new(
        client: reqwest::Client,
        api_url: Option<String>,
        api_key: Option<String>,
        model: Option<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url
                .filter(|u| !u.trim().is_empty())
                .map(|u| u.trim().trim_end_matches('/').to_string()),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    fn translate_prompt(source: Option<&LocaleTag>, target: &LocaleTag) -> String {
        let from = source
            .map(|s| format!(" from the language tagged {s}"))
            .unwrap_or_default();
        format!(
            "You are a professional translator. Translate the user's text{from} into the \
             language tagged {target}. Preserve markdown, HTML, links, code and line breaks \
             exactly. Reply with only the translation, without quotes or commentary."
        )
    }

    async fn complete(&self, system: String, user: &str) -> Result<String, TranslatorError> {
        let api_url = self
            .api_url
            .as_deref()
            .ok_or_else(|| TranslatorError::MisconfiguredProvider(ProviderId::Llm.to_string()))?;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system,
                },
                Message {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: 0.0,
        };

        let mut builder = self
            .client
            .post(format!("{api_url}/chat/completions"))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| net::send_error(ProviderId::Llm, e))?;
        let chat: ChatResponse = net::read_json(ProviderId::Llm, response).await?;

        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| TranslatorError::provider(ProviderId::Llm.as_str(), "empty completion"))
    }
}

/// First tag-looking token of a detection reply (models sometimes add punctuation).
fn parse_detected_tag(reply: &str) -> Option<&str> {
    reply
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | '.' | '"' | '\'' | '`'))
        .find(|token| !token.is_empty())
}

#[async_trait]
impl TranslationProvider for LlmProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Llm
    }

    /// The API key is optional (local Ollama); the endpoint is not.
    fn has_credentials(&self) -> bool {
        self.api_url.is_some()
    }

    fn max_chunk_chars(&self) -> usize {
        MAX_CHUNK_CHARS
    }

    fn prefers_raw(&self) -> bool {
        true
    }

    async fn detect(&self, text: &str) -> Result<LocaleTag, TranslatorError> {
        let reply = self
            .complete(
                DETECT_PROMPT.to_string(),
                truncate_chars(text, DETECTION_CHAR_LIMIT),
            )
            .await?;
        let code = parse_detected_tag(&reply).ok_or_else(|| {
            TranslatorError::provider(ProviderId::Llm.as_str(), "unparseable detection reply")
        })?;
        Ok(locale::normalize_for(code, self.catalog())?)
    }

    async fn translate_text(
        &self,
        text: &str,
        source: Option<&LocaleTag>,
        target: &LocaleTag,
    ) -> Result<String, TranslatorError> {
        let target_code = locale::to_provider_code(target, self.catalog())?;
        let target = locale::normalize(target_code)?;
        self.complete(Self::translate_prompt(source, &target), text)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer, key: Option<&str>) -> LlmProvider {
        let client = net::build_client(Duration::from_secs(5)).unwrap();
        LlmProvider::new(
            client,
            Some(format!("{}/v1", server.uri())),
            key.map(str::to_string),
            Some("llama3.2".into()),
        )
    }

    fn completion(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
    }

    fn tag(s: &str) -> LocaleTag {
        locale::normalize(s).unwrap()
    }

    #[test]
    fn detection_reply_parsing() {
        assert_eq!(parse_detected_tag("de"), Some("de"));
        assert_eq!(parse_detected_tag(" \"pt-BR\".\n"), Some("pt-BR"));
        assert_eq!(parse_detected_tag("   "), None);
    }

    #[tokio::test]
    async fn translates_via_chat_completions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({"model": "llama3.2"})))
            .respond_with(completion("こんにちは世界"))
            .expect(1)
            .mount(&server)
            .await;

        let out = provider(&server, Some("sk-test"))
            .translate_text("Hello world", Some(&tag("en")), &tag("ja"))
            .await
            .unwrap();
        assert_eq!(out, "こんにちは世界");
    }

    #[tokio::test]
    async fn detects_and_normalizes_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(completion("pt_BR"))
            .mount(&server)
            .await;

        let detected = provider(&server, None).detect("Olá, tudo bem?").await.unwrap();
        assert_eq!(detected.as_str(), "pt-BR");
    }

    #[tokio::test]
    async fn empty_completion_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(completion("  "))
            .mount(&server)
            .await;

        assert!(provider(&server, None).detect("Hello").await.is_err());
    }

    #[test]
    fn endpoint_is_required_key_is_not() {
        let client = reqwest::Client::new();
        let local = LlmProvider::new(client.clone(), Some("http://localhost:11434/v1".into()), None, None);
        assert!(local.has_credentials());
        assert!(local.prefers_raw());
        assert!(!LlmProvider::new(client, None, Some("sk".into()), None).has_credentials());
    }
}

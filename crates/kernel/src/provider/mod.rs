//! Translation provider adapters.
//!
//! Every backend implements [`TranslationProvider`]. Adapters only do network
//! I/O; caching and persistence belong to the orchestrator.

pub mod catalog;
pub mod deepl;
pub mod google;
pub mod libretranslate;
pub mod llm;
pub mod microsoft;
pub mod net;

pub use catalog::{PairRule, ProviderCatalog, ProviderId, catalog_for};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::error::TranslatorError;
use crate::locale::LocaleTag;

/// A translation backend.
#[async_trait]
pub trait TranslationProvider: Send + Sync + fmt::Debug {
    fn id(&self) -> ProviderId;

    fn catalog(&self) -> &'static ProviderCatalog {
        catalog_for(self.id())
    }

    /// Whether the configuration needed to call this provider is present.
    fn has_credentials(&self) -> bool;

    /// Longest text accepted in one request.
    fn max_chunk_chars(&self) -> usize;

    /// Whether the provider works better on raw (unrendered) text.
    fn prefers_raw(&self) -> bool {
        false
    }

    async fn detect(&self, text: &str) -> Result<LocaleTag, TranslatorError>;

    /// Translate one chunk. `source` is a hint; providers may auto-detect.
    async fn translate_text(
        &self,
        text: &str,
        source: Option<&LocaleTag>,
        target: &LocaleTag,
    ) -> Result<String, TranslatorError>;

    async fn translate_supported(
        &self,
        source: &LocaleTag,
        target: &LocaleTag,
    ) -> Result<bool, TranslatorError> {
        Ok(self.catalog().supports_pair(source, target))
    }
}

/// Credentials and endpoints for every adapter.
#[derive(Clone, Default)]
pub struct ProviderSettings {
    pub deepl_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub microsoft_api_key: Option<String>,
    pub microsoft_region: Option<String>,
    pub microsoft_endpoint: Option<String>,
    pub libretranslate_url: Option<String>,
    pub libretranslate_api_key: Option<String>,
    /// Permit self-hosted endpoints on private networks.
    pub libretranslate_allow_private: bool,
    pub llm_api_url: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub timeout: Duration,
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("deepl_api_key", &self.deepl_api_key.is_some())
            .field("google_api_key", &self.google_api_key.is_some())
            .field("microsoft_api_key", &self.microsoft_api_key.is_some())
            .field("libretranslate_url", &self.libretranslate_url)
            .field("llm_api_url", &self.llm_api_url)
            .field("llm_model", &self.llm_model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// All adapters, built once, plus the configured selection.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderId, Arc<dyn TranslationProvider>>,
    selected: ProviderId,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("selected", &self.selected)
            .finish()
    }
}

impl ProviderRegistry {
    /// Build every adapter from settings and select one.
    pub fn from_settings(selected: ProviderId, settings: &ProviderSettings) -> anyhow::Result<Self> {
        let client = net::build_client(settings.timeout)?;

        let mut providers: HashMap<ProviderId, Arc<dyn TranslationProvider>> = HashMap::new();
        providers.insert(
            ProviderId::DeepL,
            Arc::new(deepl::DeepLProvider::new(
                client.clone(),
                settings.deepl_api_key.clone(),
            )),
        );
        providers.insert(
            ProviderId::Google,
            Arc::new(google::GoogleProvider::new(
                client.clone(),
                settings.google_api_key.clone(),
            )),
        );
        providers.insert(
            ProviderId::Microsoft,
            Arc::new(microsoft::MicrosoftProvider::new(
                client.clone(),
                settings.microsoft_api_key.clone(),
                settings.microsoft_region.clone(),
                settings.microsoft_endpoint.clone(),
            )),
        );
        providers.insert(
            ProviderId::LibreTranslate,
            Arc::new(
                libretranslate::LibreTranslateProvider::new(
                    client.clone(),
                    settings.libretranslate_url.clone(),
                    settings.libretranslate_api_key.clone(),
                )
                .with_private_addresses_allowed(settings.libretranslate_allow_private),
            ),
        );
        providers.insert(
            ProviderId::Llm,
            Arc::new(llm::LlmProvider::new(
                client,
                settings.llm_api_url.clone(),
                settings.llm_api_key.clone(),
                settings.llm_model.clone(),
            )),
        );

        let registry = Self {
            providers,
            selected,
        };
        info!(
            provider = %selected,
            configured = registry.is_configured(),
            "translation provider registry ready"
        );
        Ok(registry)
    }

    /// A registry holding a single, selected provider.
    pub fn single(provider: Arc<dyn TranslationProvider>) -> Self {
        let selected = provider.id();
        let mut providers = HashMap::new();
        providers.insert(selected, provider);
        Self {
            providers,
            selected,
        }
    }

    pub fn selected_id(&self) -> ProviderId {
        self.selected
    }

    /// Whether the selected provider has its credentials.
    pub fn is_configured(&self) -> bool {
        self.providers
            .get(&self.selected)
            .is_some_and(|p| p.has_credentials())
    }

    /// The selected provider, or `MisconfiguredProvider` when it cannot be called.
    pub fn selected(&self) -> Result<Arc<dyn TranslationProvider>, TranslatorError> {
        match self.providers.get(&self.selected) {
            Some(p) if p.has_credentials() => Ok(Arc::clone(p)),
            _ => Err(TranslatorError::MisconfiguredProvider(
                self.selected.to_string(),
            )),
        }
    }

    pub fn get(&self, id: ProviderId) -> Option<Arc<dyn TranslationProvider>> {
        self.providers.get(&id).cloned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn settings() -> ProviderSettings {
        ProviderSettings {
            timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    #[test]
    fn missing_credentials_are_misconfigured() {
        let registry = ProviderRegistry::from_settings(ProviderId::DeepL, &settings()).unwrap();
        assert!(!registry.is_configured());
        let err = registry.selected().unwrap_err();
        assert!(matches!(err, TranslatorError::MisconfiguredProvider(p) if p == "deepl"));
    }

    #[test]
    fn configured_provider_is_selected() {
        let mut s = settings();
        s.google_api_key = Some("key".into());
        let registry = ProviderRegistry::from_settings(ProviderId::Google, &s).unwrap();
        let provider = registry.selected().unwrap();
        assert_eq!(provider.id(), ProviderId::Google);
        assert!(registry.get(ProviderId::Llm).is_some());
    }

    #[test]
    fn settings_debug_hides_keys() {
        let mut s = settings();
        s.deepl_api_key = Some("secret-key".into());
        let out = format!("{s:?}");
        assert!(!out.contains("secret-key"));
    }
}

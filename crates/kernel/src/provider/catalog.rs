//! Static provider capability catalogs.
//!
//! Each catalog maps internal locale tags to the provider's native code
//! vocabulary. Entries are ordered so that the preferred internal tag for a
//! shared provider code comes first.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::locale::{self, LocaleTag};

/// Identity of a translation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    DeepL,
    Google,
    Microsoft,
    LibreTranslate,
    Llm,
}

impl ProviderId {
    /// All known providers.
    pub const ALL: [ProviderId; 5] = [
        ProviderId::DeepL,
        ProviderId::Google,
        ProviderId::Microsoft,
        ProviderId::LibreTranslate,
        ProviderId::Llm,
    ];

    /// Stable lowercase name used in configuration and persisted provenance.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::DeepL => "deepl",
            ProviderId::Google => "google",
            ProviderId::Microsoft => "microsoft",
            ProviderId::LibreTranslate => "libretranslate",
            ProviderId::Llm => "llm",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deepl" => Ok(ProviderId::DeepL),
            "google" => Ok(ProviderId::Google),
            "microsoft" | "azure" => Ok(ProviderId::Microsoft),
            "libretranslate" | "libre" => Ok(ProviderId::LibreTranslate),
            "llm" | "openai" | "ollama" => Ok(ProviderId::Llm),
            other => Err(format!("unknown translation provider '{other}'")),
        }
    }
}

/// Which (source, target) combinations a provider serves.
#[derive(Debug, Clone, Copy)]
pub enum PairRule {
    /// Any declared source to any declared target.
    AnyToAny,
    /// Sources are matched on their base language only (DeepL).
    BaseLanguageSource,
}

/// Static capability catalog for one provider.
#[derive(Debug)]
pub struct ProviderCatalog {
    pub provider: ProviderId,
    /// Whether the provider can detect languages.
    pub detection: bool,
    /// `(internal tag, provider code)` pairs.
    pub locales: &'static [(&'static str, &'static str)],
    pub pairs: PairRule,
}

impl ProviderCatalog {
    /// Whether the catalog declares this exact internal tag.
    pub fn declares(&self, tag: &str) -> bool {
        self.locales.iter().any(|(internal, _)| *internal == tag)
    }

    /// Provider code for an exactly declared internal tag.
    pub fn code_for(&self, tag: &str) -> Option<&'static str> {
        self.locales
            .iter()
            .find(|(internal, _)| *internal == tag)
            .map(|(_, code)| *code)
    }

    /// Internal tags in declaration order.
    pub fn internal_tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.locales.iter().map(|(internal, _)| *internal)
    }

    /// Static answer to "can this provider translate `source` into `target`".
    pub fn supports_pair(&self, source: &LocaleTag, target: &LocaleTag) -> bool {
        let source_ok = match self.pairs {
            PairRule::AnyToAny => locale::to_provider_code(source, self).is_ok(),
            PairRule::BaseLanguageSource => {
                locale::to_provider_code(&source.base(), self).is_ok()
                    || self
                        .internal_tags()
                        .any(|t| t.split('-').next() == Some(source.language()))
            }
        };
        source_ok && locale::to_provider_code(target, self).is_ok()
    }
}

pub static DEEPL_CATALOG: ProviderCatalog = ProviderCatalog {
    provider: ProviderId::DeepL,
    detection: true,
    locales: &[
        ("ar", "AR"),
        ("bg", "BG"),
        ("cs", "CS"),
        ("da", "DA"),
        ("de", "DE"),
        ("el", "EL"),
        ("en", "EN-US"),
        ("en-US", "EN-US"),
        ("en-GB", "EN-GB"),
        ("es", "ES"),
        ("et", "ET"),
        ("fi", "FI"),
        ("fr", "FR"),
        ("hu", "HU"),
        ("id", "ID"),
        ("it", "IT"),
        ("ja", "JA"),
        ("ko", "KO"),
        ("lt", "LT"),
        ("lv", "LV"),
        ("nb", "NB"),
        ("nl", "NL"),
        ("pl", "PL"),
        ("pt", "PT-PT"),
        ("pt-PT", "PT-PT"),
        ("pt-BR", "PT-BR"),
        ("ro", "RO"),
        ("ru", "RU"),
        ("sk", "SK"),
        ("sl", "SL"),
        ("sv", "SV"),
        ("tr", "TR"),
        ("uk", "UK"),
        ("zh", "ZH-HANS"),
        ("zh-CN", "ZH-HANS"),
        ("zh-Hans", "ZH-HANS"),
        ("zh-TW", "ZH-HANT"),
        ("zh-Hant", "ZH-HANT"),
    ],
    pairs: PairRule::BaseLanguageSource,
};

pub static GOOGLE_CATALOG: ProviderCatalog = ProviderCatalog {
    provider: ProviderId::Google,
    detection: true,
    locales: &[
        ("af", "af"),
        ("ar", "ar"),
        ("bg", "bg"),
        ("bn", "bn"),
        ("bs", "bs"),
        ("ca", "ca"),
        ("cs", "cs"),
        ("cy", "cy"),
        ("da", "da"),
        ("de", "de"),
        ("el", "el"),
        ("en", "en"),
        ("eo", "eo"),
        ("es", "es"),
        ("et", "et"),
        ("eu", "eu"),
        ("fa", "fa"),
        ("fi", "fi"),
        ("fil", "tl"),
        ("fr", "fr"),
        ("gl", "gl"),
        ("he", "iw"),
        ("hi", "hi"),
        ("hr", "hr"),
        ("hu", "hu"),
        ("hy", "hy"),
        ("id", "id"),
        ("is", "is"),
        ("it", "it"),
        ("ja", "ja"),
        ("ka", "ka"),
        ("kk", "kk"),
        ("ko", "ko"),
        ("lt", "lt"),
        ("lv", "lv"),
        ("mk", "mk"),
        ("ms", "ms"),
        ("nb", "no"),
        ("nl", "nl"),
        ("pl", "pl"),
        ("pt", "pt"),
        ("pt-BR", "pt"),
        ("pt-PT", "pt-PT"),
        ("ro", "ro"),
        ("ru", "ru"),
        ("sk", "sk"),
        ("sl", "sl"),
        ("sq", "sq"),
        ("sr", "sr"),
        ("sv", "sv"),
        ("sw", "sw"),
        ("ta", "ta"),
        ("te", "te"),
        ("th", "th"),
        ("tr", "tr"),
        ("uk", "uk"),
        ("ur", "ur"),
        ("vi", "vi"),
        ("zh", "zh-CN"),
        ("zh-CN", "zh-CN"),
        ("zh-TW", "zh-TW"),
    ],
    pairs: PairRule::AnyToAny,
};

pub static MICROSOFT_CATALOG: ProviderCatalog = ProviderCatalog {
    provider: ProviderId::Microsoft,
    detection: true,
    locales: &[
        ("af", "af"),
        ("ar", "ar"),
        ("bg", "bg"),
        ("bn", "bn"),
        ("bs", "bs"),
        ("ca", "ca"),
        ("cs", "cs"),
        ("cy", "cy"),
        ("da", "da"),
        ("de", "de"),
        ("el", "el"),
        ("en", "en"),
        ("es", "es"),
        ("et", "et"),
        ("fa", "fa"),
        ("fi", "fi"),
        ("fil", "fil"),
        ("fr", "fr"),
        ("fr-CA", "fr-ca"),
        ("ga", "ga"),
        ("he", "he"),
        ("hi", "hi"),
        ("hr", "hr"),
        ("hu", "hu"),
        ("hy", "hy"),
        ("id", "id"),
        ("is", "is"),
        ("it", "it"),
        ("ja", "ja"),
        ("ka", "ka"),
        ("kk", "kk"),
        ("ko", "ko"),
        ("lt", "lt"),
        ("lv", "lv"),
        ("mk", "mk"),
        ("ms", "ms"),
        ("nb", "nb"),
        ("nl", "nl"),
        ("pl", "pl"),
        ("pt", "pt"),
        ("pt-BR", "pt"),
        ("pt-PT", "pt-pt"),
        ("ro", "ro"),
        ("ru", "ru"),
        ("sk", "sk"),
        ("sl", "sl"),
        ("sq", "sq"),
        ("sr", "sr-Cyrl"),
        ("sr-Cyrl", "sr-Cyrl"),
        ("sr-Latn", "sr-Latn"),
        ("sv", "sv"),
        ("sw", "sw"),
        ("ta", "ta"),
        ("te", "te"),
        ("th", "th"),
        ("tr", "tr"),
        ("uk", "uk"),
        ("ur", "ur"),
        ("vi", "vi"),
        ("zh", "zh-Hans"),
        ("zh-CN", "zh-Hans"),
        ("zh-Hans", "zh-Hans"),
        ("zh-TW", "zh-Hant"),
        ("zh-Hant", "zh-Hant"),
    ],
    pairs: PairRule::AnyToAny,
};

pub static LIBRETRANSLATE_CATALOG: ProviderCatalog = ProviderCatalog {
    provider: ProviderId::LibreTranslate,
    detection: true,
    locales: &[
        ("ar", "ar"),
        ("az", "az"),
        ("bg", "bg"),
        ("ca", "ca"),
        ("cs", "cs"),
        ("da", "da"),
        ("de", "de"),
        ("el", "el"),
        ("en", "en"),
        ("eo", "eo"),
        ("es", "es"),
        ("et", "et"),
        ("fa", "fa"),
        ("fi", "fi"),
        ("fr", "fr"),
        ("ga", "ga"),
        ("he", "he"),
        ("hi", "hi"),
        ("hu", "hu"),
        ("id", "id"),
        ("it", "it"),
        ("ja", "ja"),
        ("ko", "ko"),
        ("lt", "lt"),
        ("lv", "lv"),
        ("ms", "ms"),
        ("nb", "nb"),
        ("nl", "nl"),
        ("pl", "pl"),
        ("pt", "pt"),
        ("pt-BR", "pt-BR"),
        ("ro", "ro"),
        ("ru", "ru"),
        ("sk", "sk"),
        ("sl", "sl"),
        ("sq", "sq"),
        ("sv", "sv"),
        ("th", "th"),
        ("tr", "tr"),
        ("uk", "uk"),
        ("ur", "ur"),
        ("zh", "zh"),
        ("zh-CN", "zh"),
        ("zh-Hans", "zh"),
        ("zh-TW", "zt"),
        ("zh-Hant", "zt"),
    ],
    pairs: PairRule::AnyToAny,
};

pub static LLM_CATALOG: ProviderCatalog = ProviderCatalog {
    provider: ProviderId::Llm,
    detection: true,
    locales: &[
        ("ar", "ar"),
        ("bg", "bg"),
        ("bn", "bn"),
        ("ca", "ca"),
        ("cs", "cs"),
        ("da", "da"),
        ("de", "de"),
        ("el", "el"),
        ("en", "en"),
        ("en-GB", "en-GB"),
        ("en-US", "en-US"),
        ("es", "es"),
        ("et", "et"),
        ("fa", "fa"),
        ("fi", "fi"),
        ("fil", "fil"),
        ("fr", "fr"),
        ("he", "he"),
        ("hi", "hi"),
        ("hr", "hr"),
        ("hu", "hu"),
        ("hy", "hy"),
        ("id", "id"),
        ("it", "it"),
        ("ja", "ja"),
        ("ko", "ko"),
        ("lt", "lt"),
        ("lv", "lv"),
        ("ms", "ms"),
        ("nb", "nb"),
        ("nl", "nl"),
        ("pl", "pl"),
        ("pt", "pt"),
        ("pt-BR", "pt-BR"),
        ("pt-PT", "pt-PT"),
        ("ro", "ro"),
        ("ru", "ru"),
        ("sk", "sk"),
        ("sl", "sl"),
        ("sq", "sq"),
        ("sr", "sr"),
        ("sv", "sv"),
        ("sw", "sw"),
        ("th", "th"),
        ("tr", "tr"),
        ("uk", "uk"),
        ("ur", "ur"),
        ("vi", "vi"),
        ("zh", "zh"),
        ("zh-CN", "zh-CN"),
        ("zh-TW", "zh-TW"),
    ],
    pairs: PairRule::AnyToAny,
};

/// Catalog for a provider id.
pub fn catalog_for(provider: ProviderId) -> &'static ProviderCatalog {
    match provider {
        ProviderId::DeepL => &DEEPL_CATALOG,
        ProviderId::Google => &GOOGLE_CATALOG,
        ProviderId::Microsoft => &MICROSOFT_CATALOG,
        ProviderId::LibreTranslate => &LIBRETRANSLATE_CATALOG,
        ProviderId::Llm => &LLM_CATALOG,
    }
}

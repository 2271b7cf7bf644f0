//! Locale tags and normalization.
//!
//! Internal locale identifiers are hyphenated IETF tags (`en`, `pt-BR`,
//! `zh-Hant`). Legacy underscore tags (`en_GB`) are accepted on input and
//! never written back out.

mod codec;

pub use codec::{from_provider_code, normalize_for, same_language, to_provider_code};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest tag we accept (RFC 5646 recommends supporting at least 35).
const MAX_TAG_LEN: usize = 35;

/// Locale parsing and mapping errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocaleError {
    #[error("locale must not be empty")]
    Empty,

    #[error("invalid locale tag '{0}'")]
    Invalid(String),

    #[error("locale '{locale}' is not supported by {provider}")]
    NotSupported { locale: String, provider: String },
}

/// A canonical, hyphenated IETF locale tag.
///
/// Construction always goes through [`normalize`], so a `LocaleTag` is
/// guaranteed to be in canonical case and separator form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocaleTag(String);

impl LocaleTag {
    /// The full tag, e.g. `pt-BR`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The primary language subtag, e.g. `pt` for `pt-BR`.
    pub fn language(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }

    /// The region subtag if present (`BR` for `pt-BR`, `RS` for `sr-Latn-RS`).
    pub fn region(&self) -> Option<&str> {
        self.0
            .split('-')
            .skip(1)
            .find(|s| s.len() == 2 || (s.len() == 3 && s.bytes().all(|b| b.is_ascii_digit())))
    }

    /// True when the tag has no subtags beyond the language.
    pub fn is_base(&self) -> bool {
        !self.0.contains('-')
    }

    /// The tag reduced to its primary language.
    pub fn base(&self) -> LocaleTag {
        LocaleTag(self.language().to_string())
    }
}

impl fmt::Display for LocaleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LocaleTag {
    type Err = LocaleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize(s)
    }
}

impl TryFrom<String> for LocaleTag {
    type Error = LocaleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        normalize(&value)
    }
}

impl From<LocaleTag> for String {
    fn from(tag: LocaleTag) -> Self {
        tag.0
    }
}

impl AsRef<str> for LocaleTag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalize a raw locale string into canonical hyphenated form.
///
/// Converts `_` separators to `-`, lowercases the language subtag,
/// title-cases four-letter script subtags and uppercases region subtags.
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> Result<LocaleTag, LocaleError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(LocaleError::Empty);
    }
    if trimmed.len() > MAX_TAG_LEN {
        return Err(LocaleError::Invalid(trimmed.to_string()));
    }

    let replaced = trimmed.replace('_', "-");
    let mut parts = replaced.split('-');

    // Primary subtag: 2-3 letters
    let primary = match parts.next() {
        Some(p) if (2..=3).contains(&p.len()) && p.bytes().all(|b| b.is_ascii_alphabetic()) => {
            p.to_ascii_lowercase()
        }
        _ => return Err(LocaleError::Invalid(trimmed.to_string())),
    };

    let mut canonical = primary;
    for subtag in parts {
        if subtag.is_empty()
            || subtag.len() > 8
            || !subtag.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return Err(LocaleError::Invalid(trimmed.to_string()));
        }
        canonical.push('-');
        canonical.push_str(&canonical_subtag(subtag));
    }

    Ok(LocaleTag(canonical))
}

/// Apply BCP 47 case conventions to a non-primary subtag.
fn canonical_subtag(subtag: &str) -> String {
    let is_alpha = subtag.bytes().all(|b| b.is_ascii_alphabetic());
    match subtag.len() {
        // Script: Hant, Latn, Cyrl
        4 if is_alpha => {
            let lower = subtag.to_ascii_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => lower,
            }
        }
        // Region: BR, TW, or UN M.49 numeric like 419
        2 if is_alpha => subtag.to_ascii_uppercase(),
        3 if subtag.bytes().all(|b| b.is_ascii_digit()) => subtag.to_string(),
        _ => subtag.to_ascii_lowercase(),
    }
}

/// Parse a comma-separated locale list, skipping (and reporting) bad entries.
pub fn parse_locale_list(raw: &str) -> (Vec<LocaleTag>, Vec<String>) {
    let mut locales = Vec::new();
    let mut rejected = Vec::new();

    for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match normalize(part) {
            Ok(tag) if !locales.contains(&tag) => locales.push(tag),
            Ok(_) => {}
            Err(_) => rejected.push(part.to_string()),
        }
    }

    (locales, rejected)
}

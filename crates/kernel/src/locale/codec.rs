//! Mapping between internal locale tags and provider code vocabularies.

use super::{LocaleError, LocaleTag, normalize};
use crate::provider::ProviderCatalog;

fn not_supported(locale: &LocaleTag, catalog: &ProviderCatalog) -> LocaleError {
    LocaleError::NotSupported {
        locale: locale.to_string(),
        provider: catalog.provider.to_string(),
    }
}

/// Map an internal tag to the provider's code.
///
/// Falls back to the base language only when the catalog declares the base
/// and not the requested variant. Unknown tags yield `NotSupported`.
pub fn to_provider_code(
    locale: &LocaleTag,
    catalog: &ProviderCatalog,
) -> Result<&'static str, LocaleError> {
    if let Some(code) = catalog.code_for(locale.as_str()) {
        return Ok(code);
    }
    if !locale.is_base()
        && let Some(code) = catalog.code_for(locale.language())
    {
        return Ok(code);
    }
    Err(not_supported(locale, catalog))
}

/// Normalize and collapse unrecognized region variants to their base.
///
/// `zh-HK` becomes `zh` for a catalog declaring `zh` but not `zh-HK`. Tags
/// whose base is unknown to the catalog are returned normalized but
/// otherwise untouched; support is decided by [`to_provider_code`].
pub fn normalize_for(raw: &str, catalog: &ProviderCatalog) -> Result<LocaleTag, LocaleError> {
    let tag = normalize(raw)?;
    if tag.is_base() || catalog.declares(tag.as_str()) {
        return Ok(tag);
    }
    let base = tag.base();
    if catalog.declares(base.as_str()) {
        Ok(base)
    } else {
        Ok(tag)
    }
}

/// Map a provider code (as returned by detection) back to an internal tag.
pub fn from_provider_code(code: &str, catalog: &ProviderCatalog) -> Result<LocaleTag, LocaleError> {
    let trimmed = code.trim();
    if trimmed.is_empty() {
        return Err(LocaleError::Empty);
    }

    if let Ok(tag) = normalize(trimmed)
        && catalog.declares(tag.as_str())
    {
        return Ok(tag);
    }

    // Provider-specific codes such as `iw`, `zt` or `ZH-HANT`
    if let Some((internal, _)) = catalog
        .locales
        .iter()
        .find(|(_, provider_code)| provider_code.eq_ignore_ascii_case(trimmed))
    {
        return normalize(internal);
    }

    normalize(trimmed)
}

/// Whether two tags name the same language for short-circuit purposes.
///
/// Equal tags match, and a bare language matches any of its variants
/// (`en` ~ `en-GB`). Two distinct variants (`pt-BR`, `pt-PT`) do not.
pub fn same_language(a: &LocaleTag, b: &LocaleTag) -> bool {
    if a == b {
        return true;
    }
    (a.is_base() || b.is_base()) && a.language() == b.language()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::provider::catalog::{DEEPL_CATALOG, GOOGLE_CATALOG, LIBRETRANSLATE_CATALOG};

    fn tag(s: &str) -> LocaleTag {
        normalize(s).unwrap()
    }

    #[test]
    fn exact_codes_win() {
        assert_eq!(to_provider_code(&tag("pt-BR"), &DEEPL_CATALOG).unwrap(), "PT-BR");
        assert_eq!(to_provider_code(&tag("zh-TW"), &GOOGLE_CATALOG).unwrap(), "zh-TW");
        assert_eq!(to_provider_code(&tag("he"), &GOOGLE_CATALOG).unwrap(), "iw");
    }

    #[test]
    fn variant_falls_back_to_declared_base() {
        assert_eq!(to_provider_code(&tag("de-AT"), &DEEPL_CATALOG).unwrap(), "DE");
        assert_eq!(to_provider_code(&tag("zh-HK"), &GOOGLE_CATALOG).unwrap(), "zh-CN");
    }

    #[test]
    fn unknown_language_is_not_supported() {
        let err = to_provider_code(&tag("tlh"), &DEEPL_CATALOG).unwrap_err();
        assert_eq!(
            err,
            LocaleError::NotSupported {
                locale: "tlh".into(),
                provider: "deepl".into()
            }
        );
        assert!(to_provider_code(&tag("xx-YY"), &GOOGLE_CATALOG).is_err());
    }

    #[test]
    fn normalize_for_collapses_unknown_variants() {
        assert_eq!(normalize_for("de_CH", &DEEPL_CATALOG).unwrap().as_str(), "de");
        assert_eq!(normalize_for("pt_BR", &DEEPL_CATALOG).unwrap().as_str(), "pt-BR");
        assert_eq!(normalize_for("tlh-XX", &DEEPL_CATALOG).unwrap().as_str(), "tlh-XX");
        assert!(normalize_for("", &DEEPL_CATALOG).is_err());
    }

    #[test]
    fn provider_codes_map_back_to_internal_tags() {
        assert_eq!(from_provider_code("EN", &DEEPL_CATALOG).unwrap().as_str(), "en");
        assert_eq!(from_provider_code("ZH-HANT", &DEEPL_CATALOG).unwrap().as_str(), "zh-Hant");
        assert_eq!(from_provider_code("iw", &GOOGLE_CATALOG).unwrap().as_str(), "he");
        assert_eq!(from_provider_code("no", &GOOGLE_CATALOG).unwrap().as_str(), "nb");
        assert_eq!(from_provider_code("zt", &LIBRETRANSLATE_CATALOG).unwrap().as_str(), "zh-TW");
        assert_eq!(from_provider_code("zh-CN", &GOOGLE_CATALOG).unwrap().as_str(), "zh-CN");
        assert!(from_provider_code(" ", &GOOGLE_CATALOG).is_err());
    }

    #[test]
    fn base_matches_its_variants_only() {
        assert!(same_language(&tag("en"), &tag("en")));
        assert!(same_language(&tag("en"), &tag("en-GB")));
        assert!(same_language(&tag("en-GB"), &tag("en")));
        assert!(!same_language(&tag("pt-BR"), &tag("pt-PT")));
        assert!(!same_language(&tag("de"), &tag("es")));
    }
}

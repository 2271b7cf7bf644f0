#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Locale normalization and text splitting properties.

use polyglot_kernel::content::splitter::{join, split};
use polyglot_kernel::locale::{self, normalize_for, same_language};
use polyglot_kernel::provider::{ProviderId, catalog_for};

#[test]
fn normalization_is_hyphenated_and_idempotent() {
    for raw in ["en_GB", "en-GB", "EN_gb", " en-gb "] {
        let once = locale::normalize(raw).unwrap();
        assert_eq!(once.as_str(), "en-GB");
        assert_eq!(locale::normalize(once.as_str()).unwrap(), once);
    }
    assert_eq!(locale::normalize("zh_hant_tw").unwrap().as_str(), "zh-Hant-TW");
    assert_eq!(locale::normalize("es-419").unwrap().as_str(), "es-419");
}

#[test]
fn provider_normalization_is_idempotent() {
    for id in ProviderId::ALL {
        let catalog = catalog_for(id);
        for raw in ["en_GB", "en-GB", "pt_BR", "zh_hk"] {
            let once = normalize_for(raw, catalog).unwrap();
            assert_eq!(normalize_for(once.as_str(), catalog).unwrap(), once, "{id} {raw}");
        }
    }
    assert_eq!(
        normalize_for("en_GB", catalog_for(ProviderId::DeepL)).unwrap().as_str(),
        "en-GB"
    );
}

#[test]
fn invalid_locales_are_rejected() {
    assert!(locale::normalize("").is_err());
    assert!(locale::normalize("english").is_err());
    assert!(locale::normalize("en__GB").is_err());
}

#[test]
fn regional_variants_share_a_language() {
    let en = locale::normalize("en").unwrap();
    let en_gb = locale::normalize("en_GB").unwrap();
    let de = locale::normalize("de").unwrap();
    assert!(same_language(&en, &en_gb));
    assert!(!same_language(&en, &de));
}

#[test]
fn short_text_is_a_single_identical_chunk() {
    let text = "Hello world.\n\nSecond paragraph.";
    let chunks = split(text, 5000);
    assert_eq!(chunks, vec![text.to_string()]);
    assert_eq!(join(&chunks), text);
}

#[test]
fn long_text_splits_in_order_and_rejoins_exactly() {
    let text = (0..40)
        .map(|i| format!("Sentence {i} talks about something. Then it continues."))
        .collect::<Vec<_>>()
        .join("\n\n");

    let chunks = split(&text, 120);

    assert!(chunks.len() > 1);
    assert!(chunks.iter().all(|c| c.chars().count() <= 120));
    assert_eq!(join(&chunks), text);
    let firsts: Vec<usize> = (0..40)
        .map(|i| text.find(&format!("Sentence {i} ")).unwrap())
        .collect();
    assert!(firsts.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn multibyte_text_is_cut_on_character_boundaries() {
    let text = "こんにちは世界".repeat(30);

    let chunks = split(&text, 16);

    assert!(chunks.iter().all(|c| c.chars().count() <= 16));
    assert_eq!(join(&chunks), text);
}

//! Accept-Language negotiation.
//!
//! Resolves the locale a caller most likely wants among the configured
//! target locales, falling back to the default locale.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use crate::locale::{self, LocaleTag};
use crate::state::AppState;

/// The locale resolved for the current request.
///
/// Stored in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocale(pub LocaleTag);

/// Picks the best known locale from an Accept-Language header.
#[derive(Debug, Clone)]
pub struct AcceptLanguageNegotiator {
    known: Vec<LocaleTag>,
}

impl AcceptLanguageNegotiator {
    pub fn new(known: Vec<LocaleTag>) -> Self {
        Self { known }
    }

    /// Parse the header into (tag, quality) pairs, best first. Ties keep
    /// header order; wildcards and malformed tags are dropped.
    fn parse_accept_language(header: &str) -> Vec<(LocaleTag, f32)> {
        let mut langs: Vec<(LocaleTag, f32)> = header
            .split(',')
            .filter_map(|part| {
                let mut segments = part.trim().split(';');
                let tag = locale::normalize(segments.next()?.trim()).ok()?;

                let quality = segments
                    .find_map(|s| {
                        s.trim()
                            .strip_prefix("q=")
                            .and_then(|q| q.trim().parse::<f32>().ok())
                    })
                    .unwrap_or(1.0)
                    .clamp(0.0, 1.0);

                (quality > 0.0).then_some((tag, quality))
            })
            .collect();

        langs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        langs
    }

    pub fn negotiate(&self, header: &str) -> Option<LocaleTag> {
        for (wanted, _quality) in Self::parse_accept_language(header) {
            if self.known.contains(&wanted) {
                return Some(wanted);
            }
            // "en-US" is served by a configured "en".
            let base = wanted.base();
            if self.known.contains(&base) {
                return Some(base);
            }
            // "pt" is served by a configured "pt-BR".
            if let Some(variant) = self.known.iter().find(|k| k.language() == wanted.language()) {
                return Some(variant.clone());
            }
        }
        None
    }

    pub fn negotiate_headers(&self, headers: &HeaderMap) -> Option<LocaleTag> {
        let header = headers.get("accept-language")?.to_str().ok()?;
        self.negotiate(header)
    }
}

/// Middleware inserting a [`ResolvedLocale`] for each request.
pub async fn negotiate_language(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let resolved = state
        .language_negotiator()
        .negotiate_headers(request.headers())
        .unwrap_or_else(|| state.default_locale().clone());

    tracing::debug!(locale = %resolved, "resolved request locale");
    request.extensions_mut().insert(ResolvedLocale(resolved));
    next.run(request).await
}

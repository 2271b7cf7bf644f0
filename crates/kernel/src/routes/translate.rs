//! On-demand post translation.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::{Extensions, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::content::{ContentItem, ItemRef};
use crate::error::{AppError, AppResult};
use crate::locale::{self, LocaleTag};
use crate::middleware::{ResolvedLocale, get_client_id, rate_limit_response};
use crate::services::orchestrator::Orchestrator;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/translate", post(translate_post))
}

#[derive(Debug, Deserialize)]
pub struct TranslateRequest {
    pub post_id: i64,
    /// Defaults to the negotiated request locale.
    #[serde(default)]
    pub target_locale: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TranslateResponse {
    pub translation: String,
    pub detected_lang: String,
    /// Present when the post opens its topic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_translation: Option<String>,
}

async fn translate_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    extensions: Extensions,
    Json(request): Json<TranslateRequest>,
) -> AppResult<Response> {
    if !state.config().translator_enabled {
        return Err(AppError::Disabled);
    }

    let addr = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = get_client_id(addr, &headers);
    if let Err(retry_after) = state.rate_limiter().check("translate", &client).await {
        state.metrics().record_rate_limit();
        return Ok(rate_limit_response(retry_after));
    }

    let target = resolve_target(&state, &headers, &extensions, request.target_locale.as_deref())?;
    let orchestrator = state.orchestrator()?;

    let item = match state.source().get(ItemRef::post(request.post_id)).await? {
        Some(item) if !item.is_deleted() => item,
        _ => return Err(AppError::NotFound),
    };

    let outcome = orchestrator.translate(&item, &target).await?;
    debug!(
        post_id = request.post_id,
        target = %target,
        origin = ?outcome.origin,
        "served translation"
    );

    let title_translation = translate_title(&state, &orchestrator, &item, &target).await;

    Ok(Json(TranslateResponse {
        translation: outcome.text,
        detected_lang: outcome.source_locale.to_string(),
        title_translation,
    })
    .into_response())
}

/// Explicit target, else the negotiated request locale, else the default.
fn resolve_target(
    state: &AppState,
    headers: &HeaderMap,
    extensions: &Extensions,
    requested: Option<&str>,
) -> AppResult<LocaleTag> {
    if let Some(raw) = requested.filter(|r| !r.trim().is_empty()) {
        return locale::normalize(raw).map_err(|e| AppError::BadRequest(e.to_string()));
    }
    if let Some(ResolvedLocale(tag)) = extensions.get::<ResolvedLocale>() {
        return Ok(tag.clone());
    }
    Ok(state
        .language_negotiator()
        .negotiate_headers(headers)
        .unwrap_or_else(|| state.default_locale().clone()))
}

/// The topic title in `target` when `item` opens its topic. Failures only
/// drop the title.
async fn translate_title(
    state: &AppState,
    orchestrator: &Orchestrator,
    item: &ContentItem,
    target: &LocaleTag,
) -> Option<String> {
    let post = item.as_post().filter(|p| p.is_thread_opener())?;

    let topic = match state.source().get(ItemRef::topic(post.topic_id)).await {
        Ok(Some(topic)) if !topic.is_deleted() => topic,
        Ok(_) => return None,
        Err(e) => {
            warn!(topic_id = post.topic_id, error = %e, "failed to load topic for title");
            return None;
        }
    };

    match orchestrator.translate(&topic, target).await {
        Ok(outcome) => Some(outcome.text),
        Err(e) => {
            warn!(topic_id = post.topic_id, target = %target, error = %e, "title translation failed");
            None
        }
    }
}

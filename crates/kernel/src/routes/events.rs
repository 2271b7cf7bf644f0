//! Content lifecycle notifications from the host.
//!
//! The host reports creates, edits and deletes; stale translations are
//! dropped and follow-up jobs queued for the next cron run.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::content::{ContentKind, ItemRef};
use crate::error::{AppError, AppResult};
use crate::services::content_source::{ContentEvent, handle_content_event};
use crate::state::AppState;

use super::secret_matches;

pub const EVENTS_KEY_HEADER: &str = "x-polyglot-key";

pub fn router() -> Router<AppState> {
    Router::new().route("/content-events", post(content_event))
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum EventType {
    Created,
    Edited,
    Deleted,
}

#[derive(Debug, Deserialize)]
pub struct ContentEventRequest {
    event: EventType,
    item_type: ContentKind,
    item_id: i64,
    /// Only meaningful for edits; metadata-only edits keep translations.
    #[serde(default)]
    text_changed: bool,
}

impl ContentEventRequest {
    fn into_event(self) -> ContentEvent {
        let item = ItemRef::new(self.item_type, self.item_id);
        match self.event {
            EventType::Created => ContentEvent::Created { item },
            EventType::Edited => ContentEvent::Edited {
                item,
                text_changed: self.text_changed,
            },
            EventType::Deleted => ContentEvent::Deleted { item },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ContentEventResponse {
    pub invalidated: bool,
    pub jobs_enqueued: usize,
}

async fn content_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ContentEventRequest>,
) -> AppResult<(StatusCode, Json<ContentEventResponse>)> {
    let provided = headers
        .get(EVENTS_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !secret_matches(provided, state.config().events_key.as_deref()) {
        return Err(AppError::Unauthorized);
    }

    let config = state.config();
    let outcome = handle_content_event(
        request.into_event(),
        state.store().as_ref(),
        state.queue().as_ref(),
        config.translator_enabled && config.auto_translate_on_edit,
        &config.backfill_target_locales,
    )
    .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ContentEventResponse {
            invalidated: outcome.invalidated,
            jobs_enqueued: outcome.jobs_enqueued,
        }),
    ))
}

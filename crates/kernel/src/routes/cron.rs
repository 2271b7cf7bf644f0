//! Cron route handlers.

use std::time::Instant;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tracing::{info, warn};

use crate::cron::{BackfillResult, BackfillStats, EventJobStats, JOBS_QUEUE, cursor_queue};
use crate::state::AppState;

use super::secret_matches;

/// Create the cron router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cron/{key}", post(run_cron))
        .route("/cron/{key}/status", get(cron_status))
}

/// Cron run response.
#[derive(Debug, Serialize)]
pub struct CronResponse {
    pub status: &'static str,
    pub event_jobs: Option<EventJobReport>,
    pub backfill: Vec<KindReport>,
    pub duration_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct EventJobReport {
    pub processed: usize,
    pub failed: usize,
    pub requeued: usize,
    pub dropped: usize,
}

impl From<EventJobStats> for EventJobReport {
    fn from(stats: EventJobStats) -> Self {
        Self {
            processed: stats.processed,
            failed: stats.failed,
            requeued: stats.requeued,
            dropped: stats.dropped,
        }
    }
}

/// Outcome of one kind's backfill.
#[derive(Debug, Serialize)]
pub struct KindReport {
    pub kind: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatsReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatsReport {
    pub candidates: usize,
    pub detected: usize,
    pub translated: usize,
    pub cached: usize,
    pub skipped: usize,
    pub failed: usize,
    pub resumable: bool,
}

impl From<BackfillStats> for StatsReport {
    fn from(stats: BackfillStats) -> Self {
        Self {
            candidates: stats.candidates,
            detected: stats.detected,
            translated: stats.translated,
            cached: stats.cached,
            skipped: stats.skipped,
            failed: stats.failed,
            resumable: stats.resumable,
        }
    }
}

fn forbidden() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(serde_json::json!({ "error": "invalid cron key" })),
    )
        .into_response()
}

/// Drain event jobs, then backfill every configured kind.
async fn run_cron(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    if !secret_matches(&key, state.config().cron_key.as_deref()) {
        warn!("invalid cron key");
        return forbidden();
    }

    info!("cron triggered via HTTP");
    let started = Instant::now();
    let backfill = state.backfill();

    let event_jobs = match backfill.process_event_jobs().await {
        Ok(stats) => Some(EventJobReport::from(stats)),
        Err(e) => {
            warn!(error = %e, "event job processing failed");
            None
        }
    };

    let reports: Vec<KindReport> = backfill
        .run_all()
        .await
        .into_iter()
        .map(|(kind, result)| {
            let kind = kind.to_string();
            match result {
                BackfillResult::Completed(stats) => KindReport {
                    kind,
                    status: "completed",
                    stats: Some(stats.into()),
                    message: None,
                },
                BackfillResult::Skipped => KindReport {
                    kind,
                    status: "skipped",
                    stats: None,
                    message: Some("another instance is running this backfill".to_string()),
                },
                BackfillResult::Failed(error) => KindReport {
                    kind,
                    status: "failed",
                    stats: None,
                    message: Some(error),
                },
            }
        })
        .collect();

    let failed = event_jobs.is_none() || reports.iter().any(|r| r.status == "failed");
    let status_code = if failed {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };

    (
        status_code,
        Json(CronResponse {
            status: if failed { "failed" } else { "completed" },
            event_jobs,
            backfill: reports,
            duration_ms: started.elapsed().as_millis() as u64,
        }),
    )
        .into_response()
}

/// Queue lengths.
#[derive(Debug, Serialize)]
pub struct CronStatusResponse {
    pub provider: &'static str,
    pub provider_configured: bool,
    pub pending_jobs: u64,
    /// Kinds with a continuation cursor waiting.
    pub resumable_kinds: Vec<String>,
}

async fn cron_status(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    if !secret_matches(&key, state.config().cron_key.as_deref()) {
        return forbidden();
    }

    let queue = state.queue();
    let pending_jobs = queue.len(JOBS_QUEUE).await.unwrap_or_else(|e| {
        warn!(error = %e, "failed to read job queue length");
        0
    });

    let mut resumable_kinds = Vec::new();
    for kind in &state.backfill().settings().kinds {
        if let Ok(n) = queue.len(&cursor_queue(*kind)).await
            && n > 0
        {
            resumable_kinds.push(kind.to_string());
        }
    }

    Json(CronStatusResponse {
        provider: state.registry().selected_id().as_str(),
        provider_configured: state.registry().is_configured(),
        pending_jobs,
        resumable_kinds,
    })
    .into_response()
}

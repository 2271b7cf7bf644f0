//! HTTP route handlers.

pub mod cron;
pub mod events;
pub mod health;
pub mod metrics;
pub mod translate;

use axum::Router;
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The full HTTP surface.
///
/// Layers, outermost first: trace, request metrics, locale negotiation.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(translate::router())
        .merge(events::router())
        .merge(cron::router())
        .merge(health::router())
        .merge(metrics::router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::negotiate_language,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::track_requests,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Constant-time comparison against a configured secret.
///
/// An unset secret matches nothing.
pub(crate) fn secret_matches(provided: &str, expected: Option<&str>) -> bool {
    match expected {
        Some(expected) => bool::from(provided.as_bytes().ct_eq(expected.as_bytes())),
        None => false,
    }
}

//! Error types.
//!
//! `TranslatorError` is what the translation core raises; `AppError` is the
//! HTTP-facing wrapper.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::locale::LocaleError;

/// Conditions raised by the orchestrator and provider adapters.
#[derive(Debug, Error)]
pub enum TranslatorError {
    #[error("translation provider {0} is not configured")]
    MisconfiguredProvider(String),

    #[error("{provider} request failed: {message}")]
    Provider {
        provider: String,
        message: String,
        /// Timeouts, connection failures and 5xx responses.
        transient: bool,
    },

    #[error("{0} is rate limiting requests")]
    RateLimited(String),

    #[error("{provider} cannot translate {source_locale} to {target}")]
    UnsupportedLanguagePair {
        provider: String,
        source_locale: String,
        target: String,
    },

    #[error("{0} does not support language detection")]
    DetectionUnsupported(String),

    #[error("could not reach translation service: {0}")]
    LookupFailure(String),

    #[error(transparent)]
    UnsupportedLocale(#[from] LocaleError),

    #[error("{0} is already being translated")]
    ItemBusy(String),

    #[error("{0} not found")]
    ContentNotFound(String),

    #[error("translation storage failed")]
    Storage(#[source] anyhow::Error),
}

/// How a backfill run should report a per-item failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Expected to clear on its own; debug log only.
    Silent,
    /// Semantic, will not change on retry; info log and move on.
    Skip,
    /// Worth an operator's attention.
    Warn,
}

impl TranslatorError {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            transient: false,
        }
    }

    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            transient: true,
        }
    }

    /// Whether retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Provider { transient, .. } => *transient,
            Self::RateLimited(_) | Self::ItemBusy(_) | Self::LookupFailure(_) => true,
            Self::Storage(_) => true,
            _ => false,
        }
    }

    pub fn backfill_severity(&self) -> Severity {
        match self {
            Self::LookupFailure(_) | Self::ItemBusy(_) => Severity::Silent,
            Self::UnsupportedLanguagePair { .. }
            | Self::UnsupportedLocale(_)
            | Self::DetectionUnsupported(_)
            | Self::ContentNotFound(_) => Severity::Skip,
            Self::MisconfiguredProvider(_)
            | Self::Provider { .. }
            | Self::RateLimited(_)
            | Self::Storage(_) => Severity::Warn,
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MisconfiguredProvider(_) => "misconfigured",
            Self::Provider { .. } => "provider_error",
            Self::RateLimited(_) => "rate_limited",
            Self::UnsupportedLanguagePair { .. } => "unsupported_pair",
            Self::DetectionUnsupported(_) => "detection_unsupported",
            Self::LookupFailure(_) => "lookup_failure",
            Self::UnsupportedLocale(_) => "unsupported_locale",
            Self::ItemBusy(_) => "item_busy",
            Self::ContentNotFound(_) => "not_found",
            Self::Storage(_) => "storage",
        }
    }
}

/// Application errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("not found")]
    NotFound,

    #[error("unauthorized")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("too many requests")]
    TooManyRequests,

    #[error("translation is disabled")]
    Disabled,

    #[error(transparent)]
    Translator(#[from] TranslatorError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            AppError::Disabled => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Translator(e) => match e {
                TranslatorError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
                TranslatorError::MisconfiguredProvider(_) => StatusCode::SERVICE_UNAVAILABLE,
                TranslatorError::ContentNotFound(_) => StatusCode::NOT_FOUND,
                TranslatorError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match &self {
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal server error");
                "internal server error".to_string()
            }
            AppError::Translator(TranslatorError::Storage(e)) => {
                tracing::error!(error = %e, "translation storage error");
                "internal server error".to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(TranslatorError::transient("deepl", "timed out").is_transient());
        assert!(!TranslatorError::provider("deepl", "forbidden").is_transient());
        assert!(TranslatorError::RateLimited("google".into()).is_transient());
        assert!(
            !TranslatorError::UnsupportedLanguagePair {
                provider: "deepl".into(),
                source_locale: "tlh".into(),
                target: "de".into(),
            }
            .is_transient()
        );
    }

    #[test]
    fn lookup_failures_are_silent_in_backfill() {
        assert_eq!(
            TranslatorError::LookupFailure("translate.internal".into()).backfill_severity(),
            Severity::Silent
        );
        assert_eq!(
            TranslatorError::provider("google", "boom").backfill_severity(),
            Severity::Warn
        );
        assert_eq!(
            TranslatorError::DetectionUnsupported("x".into()).backfill_severity(),
            Severity::Skip
        );
    }

    #[test]
    fn http_status_mapping() {
        let status = |e: TranslatorError| AppError::from(e).status();
        assert_eq!(
            status(TranslatorError::RateLimited("deepl".into())),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status(TranslatorError::MisconfiguredProvider("deepl".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(TranslatorError::provider("deepl", "bad")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(TranslatorError::ContentNotFound("post:1".into())),
            StatusCode::NOT_FOUND
        );
    }
}

//! HTTP middleware components.

pub mod language;
pub mod metrics;
pub mod rate_limit;

pub use language::{AcceptLanguageNegotiator, ResolvedLocale, negotiate_language};
pub use metrics::track_requests;
pub use rate_limit::{RateLimitConfig, RateLimiter, get_client_id, rate_limit_response};

//! Rate limiting using Redis for distributed counting.
//!
//! Fixed-window counter per category and identity: atomic INCR + EXPIRE.

use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use redis::Client as RedisClient;
use tracing::{debug, warn};

/// Limits per endpoint category.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// On-demand translation requests: (max requests, window).
    pub translate: (u32, Duration),
    /// Content event submissions.
    pub events: (u32, Duration),
}

impl RateLimitConfig {
    pub fn per_minute(translate: u32) -> Self {
        Self {
            translate: (translate, Duration::from_secs(60)),
            ..Self::default()
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            translate: (10, Duration::from_secs(60)),
            events: (600, Duration::from_secs(60)),
        }
    }
}

/// Rate limiter using Redis for distributed counting.
#[derive(Clone)]
pub struct RateLimiter {
    redis: RedisClient,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(redis: RedisClient, config: RateLimitConfig) -> Self {
        Self { redis, config }
    }

    /// `Err(retry_after_secs)` when `identifier` exceeded the category's limit.
    ///
    /// Fails open when Redis is unreachable.
    pub async fn check(&self, category: &str, identifier: &str) -> Result<(), u64> {
        let (limit, window) = self.get_limit(category);
        if limit == 0 {
            return Ok(());
        }
        let key = format!("rate:{category}:{identifier}");
        let window_secs = window.as_secs();

        let count = match self.increment(&key, window_secs).await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "rate limit check failed, allowing request");
                return Ok(());
            }
        };

        if count > i64::from(limit) {
            debug!(
                category = category,
                identifier = identifier,
                count = count,
                limit = limit,
                "rate limit exceeded"
            );
            Err(window_secs)
        } else {
            Ok(())
        }
    }

    /// Limit for a category; zero disables limiting.
    fn get_limit(&self, category: &str) -> (u32, Duration) {
        match category {
            "events" => self.config.events,
            _ => self.config.translate,
        }
    }

    async fn increment(&self, key: &str, ttl_secs: u64) -> Result<i64, redis::RedisError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let script = redis::Script::new(
            r"local count = redis.call('INCR', KEYS[1])
              if count == 1 then
                redis.call('EXPIRE', KEYS[1], ARGV[1])
              end
              return count",
        );

        let count: i64 = script
            .key(key)
            .arg(ttl_secs as i64)
            .invoke_async(&mut conn)
            .await?;

        Ok(count)
    }
}

/// Identity for rate limiting: the authenticated user when the host passes
/// one, otherwise the client address.
pub fn get_client_id(addr: Option<std::net::SocketAddr>, headers: &HeaderMap) -> String {
    if let Some(user) = headers.get("x-user-id")
        && let Ok(value) = user.to_str()
        && !value.trim().is_empty()
    {
        return format!("user:{}", value.trim());
    }

    if let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(ip) = value.split(',').next()
    {
        return ip.trim().to_string();
    }

    if let Some(real_ip) = headers.get("x-real-ip")
        && let Ok(value) = real_ip.to_str()
    {
        return value.to_string();
    }

    addr.map(|a| a.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rate limit exceeded response.
pub fn rate_limit_response(retry_after: u64) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [
            ("retry-after", retry_after.to_string()),
            ("content-type", "application/json".to_string()),
        ],
        format!(r#"{{"error":"rate limit exceeded","retry_after":{retry_after}}}"#),
    )
        .into_response()
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn user_header_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("42"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
        assert_eq!(get_client_id(None, &headers), "user:42");
    }

    #[test]
    fn falls_back_to_forwarded_then_socket() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.2"));
        assert_eq!(get_client_id(None, &headers), "203.0.113.9");

        let addr: std::net::SocketAddr = "198.51.100.7:5555".parse().unwrap();
        assert_eq!(get_client_id(Some(addr), &HeaderMap::new()), "198.51.100.7");
        assert_eq!(get_client_id(None, &HeaderMap::new()), "unknown");
    }

    #[test]
    fn per_minute_config() {
        let config = RateLimitConfig::per_minute(3);
        assert_eq!(config.translate, (3, Duration::from_secs(60)));
        assert_eq!(config.events.0, 600);
    }

    #[test]
    fn limited_response_carries_retry_after() {
        let response = rate_limit_response(60);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "60");
    }
}

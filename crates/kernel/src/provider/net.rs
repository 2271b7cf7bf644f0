//! HTTP plumbing shared by the provider adapters.

use std::collections::HashSet;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use moka::future::Cache;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::ProviderId;
use crate::error::TranslatorError;

/// Provider language lists change rarely.
const LANGUAGE_LIST_TTL_SECS: u64 = 24 * 60 * 60;

/// Longest error body excerpt carried into an error message.
const ERROR_BODY_EXCERPT: usize = 200;

/// Build the HTTP client every adapter shares; `timeout` bounds each call.
pub fn build_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .user_agent(concat!("polyglot/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")
}

/// Map a transport failure. Timeouts and connection errors are transient.
pub(crate) fn send_error(provider: ProviderId, err: reqwest::Error) -> TranslatorError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        TranslatorError::transient(provider.as_str(), err.to_string())
    } else {
        TranslatorError::provider(provider.as_str(), err.to_string())
    }
}

/// Turn a non-success HTTP status into the error taxonomy.
pub(crate) async fn check_status(
    provider: ProviderId,
    response: Response,
) -> Result<Response, TranslatorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(ERROR_BODY_EXCERPT).collect();
    debug!(%provider, status = status.as_u16(), body = %excerpt, "provider returned error status");

    Err(status_error(provider, status, &excerpt))
}

fn status_error(provider: ProviderId, status: StatusCode, excerpt: &str) -> TranslatorError {
    match status.as_u16() {
        429 => TranslatorError::RateLimited(provider.to_string()),
        // DeepL: quota exceeded
        456 if provider == ProviderId::DeepL => TranslatorError::RateLimited(provider.to_string()),
        401 | 403 => TranslatorError::provider(
            provider.as_str(),
            format!("authentication rejected ({status})"),
        ),
        s if s >= 500 => {
            TranslatorError::transient(provider.as_str(), format!("server error ({status})"))
        }
        _ => TranslatorError::provider(provider.as_str(), format!("{status}: {excerpt}")),
    }
}

/// Check the status, then decode a JSON body.
pub(crate) async fn read_json<T: DeserializeOwned>(
    provider: ProviderId,
    response: Response,
) -> Result<T, TranslatorError> {
    let response = check_status(provider, response).await?;
    response.json::<T>().await.map_err(|e| {
        TranslatorError::provider(provider.as_str(), format!("unexpected response: {e}"))
    })
}

/// Resolve the host of a self-hosted endpoint and refuse private targets.
///
/// Runs before every call so a DNS change cannot redirect requests into the
/// internal network.
pub(crate) async fn ensure_public_host(url: &Url, allow_private: bool) -> Result<(), TranslatorError> {
    let host = url
        .host_str()
        .ok_or_else(|| TranslatorError::LookupFailure(url.to_string()))?;
    let port = url.port_or_known_default().unwrap_or(80);

    let addrs: Vec<IpAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| TranslatorError::LookupFailure(format!("{host}: {e}")))?
        .map(|addr| addr.ip())
        .collect();

    if addrs.is_empty() {
        return Err(TranslatorError::LookupFailure(format!(
            "{host}: no addresses"
        )));
    }
    if !allow_private && addrs.iter().any(is_internal) {
        return Err(TranslatorError::LookupFailure(format!(
            "{host} resolves to a private address"
        )));
    }
    Ok(())
}

fn is_internal(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                // 100.64.0.0/10 carrier-grade NAT
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xc0) == 64)
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_internal(&IpAddr::V4(mapped));
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
    }
}

/// Live language lists, cached per direction (`source` / `target`).
#[derive(Clone)]
pub(crate) struct LanguageListCache {
    cache: Cache<&'static str, Arc<HashSet<String>>>,
}

impl LanguageListCache {
    pub(crate) fn new() -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(8)
                .time_to_live(Duration::from_secs(LANGUAGE_LIST_TTL_SECS))
                .build(),
        }
    }

    /// Cached list for `key`, fetching it on a miss. Codes are lowercased.
    pub(crate) async fn get_or_fetch<Fut>(
        &self,
        key: &'static str,
        fetch: Fut,
    ) -> Result<Arc<HashSet<String>>, TranslatorError>
    where
        Fut: Future<Output = Result<HashSet<String>, TranslatorError>> + Send,
    {
        self.cache
            .try_get_with(key, async move {
                fetch.await.map(|codes| {
                    Arc::new(codes.into_iter().map(|c| c.to_ascii_lowercase()).collect())
                })
            })
            .await
            .map_err(|e| shared_error(&e))
    }
}

/// Rebuild an error shared by moka's loader.
fn shared_error(err: &TranslatorError) -> TranslatorError {
    match err {
        TranslatorError::RateLimited(p) => TranslatorError::RateLimited(p.clone()),
        TranslatorError::LookupFailure(h) => TranslatorError::LookupFailure(h.clone()),
        TranslatorError::Provider {
            provider,
            message,
            transient,
        } => TranslatorError::Provider {
            provider: provider.clone(),
            message: message.clone(),
            transient: *transient,
        },
        other => TranslatorError::provider("unknown", other.to_string()),
    }
}

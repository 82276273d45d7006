//! Outbound fetching with bounded redirect following.
//!
//! An [`Upstream`] performs exactly one hop: one GET, one fully collected
//! response. [`fetch`] drives the hops as an explicit loop with the
//! redirect budget as loop state, applies the per-hop timeout (dropping
//! the in-flight future, which releases its connection), and re-checks
//! every redirect location against the allowlist.
//!
//! Upstream 4xx/5xx statuses are returned as ordinary responses; only
//! network, protocol and redirect problems become a [`FetchError`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::header::LOCATION;
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use url::Url;

use crate::config::model::{Config, UpstreamPolicy};

use super::headers::build_upstream_headers;
use super::resolve::ResolvedTarget;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} timed out after {after_ms}ms")]
    Timeout { url: String, after_ms: u64 },

    #[error("connection to {url} failed: {message}")]
    Connection {
        url: String,
        code: String,
        message: String,
    },

    #[error("gave up on {url} after {limit} redirects")]
    TooManyRedirects { url: String, limit: u32 },

    #[error("invalid redirect location '{location}': {reason}")]
    InvalidRedirect { location: String, reason: String },

    #[error("redirect to '{host}' leaves the allowlist")]
    RedirectNotAllowed { host: String },

    #[error("failed to read response body from {url}: {message}")]
    Body { url: String, message: String },

    #[error("failed to build request for {url}: {message}")]
    Request { url: String, message: String },
}

/// One outbound GET.
#[derive(Debug, Clone)]
pub struct Hop {
    pub url: Url,
    pub headers: HeaderMap,
    pub verify_tls: bool,
    pub body_limit: usize,
}

#[derive(Debug, Clone)]
pub struct HopResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Terminal (non-redirect) upstream answer.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub final_url: Url,
    pub redirects: u32,
}

// async_trait keeps Upstream object safe: AppState stores Arc<dyn Upstream>
// so tests can swap in scripted upstreams.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn send(&self, hop: &Hop) -> Result<HopResponse, FetchError>;
}

#[allow(clippy::cast_possible_truncation)]
pub async fn fetch(
    upstream: &dyn Upstream,
    target: &ResolvedTarget,
    config: &Config,
    redirect_budget: u32,
) -> Result<UpstreamResponse, FetchError> {
    let timeout = Duration::from_millis(config.fetch.timeout_ms);
    let headers = build_upstream_headers(&config.fetch);

    let mut url = target.url.clone();
    let mut verify_tls = target.verify_tls;
    let mut remaining = redirect_budget;

    loop {
        let hop = Hop {
            url: url.clone(),
            headers: headers.clone(),
            verify_tls,
            body_limit: config.fetch.max_body_bytes,
        };

        let start = Instant::now();
        let response = tokio::time::timeout(timeout, upstream.send(&hop))
            .await
            .map_err(|_| FetchError::Timeout {
                url: url.to_string(),
                after_ms: config.fetch.timeout_ms,
            })??;

        tracing::debug!(
            target = %url,
            status = response.status.as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "upstream hop completed"
        );

        let location = response
            .status
            .is_redirection()
            .then(|| response.headers.get(LOCATION).cloned())
            .flatten();

        let Some(location) = location else {
            return Ok(UpstreamResponse {
                status: response.status,
                headers: response.headers,
                body: response.body,
                final_url: url,
                redirects: redirect_budget - remaining,
            });
        };

        if remaining == 0 {
            return Err(FetchError::TooManyRedirects {
                url: target.url.to_string(),
                limit: redirect_budget,
            });
        }

        let (next, policy) = next_location(&url, location.as_bytes(), config)?;
        url = next;
        verify_tls = policy.verify_tls;
        remaining -= 1;
        tracing::debug!(
            target = %url,
            policy = %policy.name,
            verify_tls,
            remaining,
            "following redirect"
        );
    }
}

/// Resolve a `Location` value against the current URL and re-check the allowlist.
///
/// The matched policy decides certificate verification for the next hop.
fn next_location<'c>(
    current: &Url,
    location: &[u8],
    config: &'c Config,
) -> Result<(Url, &'c UpstreamPolicy), FetchError> {
    let raw = String::from_utf8_lossy(location);
    let invalid = |reason: String| FetchError::InvalidRedirect {
        location: raw.to_string(),
        reason,
    };

    let next = current.join(&raw).map_err(|e| invalid(e.to_string()))?;

    if !matches!(next.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", next.scheme())));
    }

    let host = next.host_str().unwrap_or_default();
    let Some(policy) = config.policy_for(host) else {
        return Err(FetchError::RedirectNotAllowed {
            host: host.to_string(),
        });
    };

    Ok((next, policy))
}

//! Core forwarding pipeline behind `GET /proxy?url=`.
//!
//! [`proxy_handler`] extracts the target, runs [`forward`] and turns the
//! resulting [`ProxyOutcome`] into a response carrying diagnostic headers.
//! The pipeline is strictly linear per request: [`validate`](validate::validate)
//! → [`resolve`](resolve::resolve) → [`fetch`](fetch::fetch) →
//! [`relay`](relay::relay). Nothing in it is shared or mutable across
//! requests except the atomic counters in [`AppState`].

pub mod client;
pub mod fetch;
pub mod headers;
pub mod relay;
pub mod resolve;
pub mod validate;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};

use crate::config::model::Config;
use crate::server::AppState;

use fetch::Upstream;
use headers::X_CORRELATION_ID;
use relay::{Failure, ProxyOutcome};

/// First `url` pair of the raw query string, percent-decoded.
#[must_use]
pub fn target_param(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "url")
        .map(|(_, value)| value.into_owned())
}

pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
    req_headers: HeaderMap,
) -> Response {
    let correlation_id = headers::correlation_id(&req_headers);
    let raw_url = query.as_deref().and_then(target_param);

    let outcome = forward(
        &state.config,
        state.upstream.as_ref(),
        raw_url.as_deref(),
        &correlation_id,
    )
    .await;

    let counter = match &outcome {
        ProxyOutcome::Success { .. } => &state.stats.relayed,
        ProxyOutcome::Failure(f) if f.kind.is_rejection() => &state.stats.rejected,
        ProxyOutcome::Failure(_) => &state.stats.failed,
    };
    counter.fetch_add(1, Ordering::Relaxed);

    let mut response = outcome.into_response();
    if let Ok(val) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(X_CORRELATION_ID, val);
    }
    response
}

/// Run one request through the whole pipeline.
#[allow(clippy::cast_possible_truncation)]
pub async fn forward(
    config: &Config,
    upstream: &dyn Upstream,
    raw_url: Option<&str>,
    correlation_id: &str,
) -> ProxyOutcome {
    tracing::info!(
        correlation_id = %correlation_id,
        url = raw_url.unwrap_or_default(),
        "request received"
    );

    let parsed = match validate::validate(raw_url, config) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(
                correlation_id = %correlation_id,
                url = raw_url.unwrap_or_default(),
                error = %e,
                "target rejected"
            );
            return ProxyOutcome::Failure(Failure::rejected(&e, config));
        }
    };

    let target = resolve::resolve(&parsed);
    tracing::info!(
        correlation_id = %correlation_id,
        requested = %parsed.url,
        target = %target.url,
        policy = %target.policy,
        verify_tls = target.verify_tls,
        "target resolved"
    );

    let start = Instant::now();
    let result = fetch::fetch(upstream, &target, config, config.fetch.max_redirects).await;
    let latency_ms = start.elapsed().as_millis() as u64;

    let redirects = result.as_ref().map_or(0, |r| r.redirects);
    let outcome = relay::relay(result, &target);

    match &outcome {
        ProxyOutcome::Success {
            status,
            content_type,
            body,
        } => tracing::info!(
            correlation_id = %correlation_id,
            target = %target.url,
            status = status.as_u16(),
            content_type = %content_type,
            bytes = body.len(),
            redirects,
            latency_ms,
            "upstream relayed"
        ),
        ProxyOutcome::Failure(failure) => tracing::error!(
            correlation_id = %correlation_id,
            target = %target.url,
            kind = failure.kind.as_str(),
            code = failure.code.as_deref().unwrap_or("-"),
            error = %failure.message,
            latency_ms,
            "proxy request failed"
        ),
    }

    outcome
}

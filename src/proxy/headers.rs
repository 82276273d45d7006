//! Outbound identity headers and inbound diagnostic headers.
//!
//! [`build_upstream_headers`] produces the browser-like request identity
//! sent on every hop (`User-Agent`, `Accept`, `Accept-Language`); at
//! least one upstream varies its answer on these. The diagnostic header
//! names and small helpers for the inbound side live here too.

use axum::http::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, USER_AGENT};
use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::config::model::FetchSettings;

pub const X_PROXY_STATUS: HeaderName = HeaderName::from_static("x-proxy-status");
pub const X_PROXY_ERROR: HeaderName = HeaderName::from_static("x-proxy-error");
pub const X_CORRELATION_ID: HeaderName = HeaderName::from_static("x-correlation-id");

pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

pub fn build_upstream_headers(fetch: &FetchSettings) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (name, value) in [
        (USER_AGENT, &fetch.user_agent),
        (ACCEPT, &fetch.accept),
        (ACCEPT_LANGUAGE, &fetch.accept_language),
    ] {
        match HeaderValue::from_str(value) {
            Ok(val) => {
                headers.insert(name, val);
            }
            Err(_) => {
                tracing::warn!(header = %name, "invalid identity header value, skipping");
            }
        }
    }

    headers
}

/// Upstream `Content-Type`, or `application/json` when absent or not ASCII.
#[must_use]
pub fn content_type_of(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| DEFAULT_CONTENT_TYPE.to_string(), String::from)
}

/// Echo the caller's correlation ID or mint a fresh one.
#[must_use]
pub fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(&X_CORRELATION_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from)
}

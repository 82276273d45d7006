//! [`Upstream`] implementation over the pooled hyper client.
//!
//! [`HyperUpstream`] owns two immutable clients built once at startup,
//! one verifying certificates against `webpki-roots` and one accepting any
//! certificate. Each hop picks the client named by its `verify_tls` flag.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};

use crate::server::{build_http_client, HttpClient};

use super::fetch::{FetchError, Hop, HopResponse, Upstream};

#[derive(Clone)]
pub struct HyperUpstream {
    verified: HttpClient,
    insecure: HttpClient,
}

impl Default for HyperUpstream {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperUpstream {
    #[must_use]
    pub fn new() -> Self {
        Self {
            verified: build_http_client(true),
            insecure: build_http_client(false),
        }
    }
}

#[async_trait]
impl Upstream for HyperUpstream {
    async fn send(&self, hop: &Hop) -> Result<HopResponse, FetchError> {
        let url = hop.url.to_string();

        let mut req_builder = hyper::Request::builder()
            .method(hyper::Method::GET)
            .uri(url.as_str());
        for (key, value) in &hop.headers {
            req_builder = req_builder.header(key, value);
        }
        let req = req_builder
            .body(Full::new(Bytes::new()))
            .map_err(|e| FetchError::Request {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let client = if hop.verify_tls {
            &self.verified
        } else {
            &self.insecure
        };

        let response = client
            .request(req)
            .await
            .map_err(|e| FetchError::Connection {
                url: url.clone(),
                code: error_code(&e),
                message: e.to_string(),
            })?;

        let (parts, body) = response.into_parts();
        let body = Limited::new(body, hop.body_limit)
            .collect()
            .await
            .map_err(|e| FetchError::Body {
                url,
                message: e.to_string(),
            })?
            .to_bytes();

        Ok(HopResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

/// Short, stable code for a connection failure, taken from the innermost
/// `io::Error` in the source chain.
#[must_use]
pub fn error_code(err: &(dyn std::error::Error + 'static)) -> String {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if let Some(code) = io_error_code(io.kind()) {
                return code.to_string();
            }
        }
        if e.to_string().contains("dns error") {
            return "ENOTFOUND".to_string();
        }
        current = e.source();
    }
    "UNKNOWN".to_string()
}

#[must_use]
pub fn io_error_code(kind: std::io::ErrorKind) -> Option<&'static str> {
    use std::io::ErrorKind;

    let code = match kind {
        ErrorKind::ConnectionRefused => "ECONNREFUSED",
        ErrorKind::ConnectionReset | ErrorKind::UnexpectedEof => "ECONNRESET",
        ErrorKind::ConnectionAborted => "ECONNABORTED",
        ErrorKind::TimedOut => "ETIMEDOUT",
        ErrorKind::AddrNotAvailable => "EADDRNOTAVAIL",
        ErrorKind::BrokenPipe => "EPIPE",
        ErrorKind::NotConnected => "ENOTCONN",
        ErrorKind::InvalidData => "EPROTO",
        _ => return None,
    };
    Some(code)
}

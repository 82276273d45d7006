//! Mapping of fetch results onto the outbound response.
//!
//! Every request ends in exactly one [`ProxyOutcome`]. Input rejections
//! and fetch failures are both normalized here into a [`Failure`] and
//! rendered as the same JSON [`ErrorEnvelope`], so callers see one error
//! shape. An empty upstream body is a failure, never a success.

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::config::model::Config;

use super::fetch::{FetchError, UpstreamResponse};
use super::headers::{content_type_of, X_PROXY_ERROR, X_PROXY_STATUS};
use super::resolve::ResolvedTarget;
use super::validate::TargetError;

pub const USAGE: &str = "/proxy?url=<encoded_url>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    MissingParameter,
    MalformedUrl,
    UnsupportedScheme,
    DomainNotAllowed,
    ConnectionError,
    Timeout,
    TooManyRedirects,
    InvalidRedirect,
    RedirectNotAllowed,
    UpstreamBody,
    RequestBuild,
    EmptyUpstreamResponse,
}

impl FailureKind {
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::MissingParameter | Self::MalformedUrl | Self::UnsupportedScheme => {
                StatusCode::BAD_REQUEST
            }
            Self::DomainNotAllowed => StatusCode::FORBIDDEN,
            Self::ConnectionError | Self::TooManyRedirects | Self::RequestBuild => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::InvalidRedirect
            | Self::RedirectNotAllowed
            | Self::UpstreamBody
            | Self::EmptyUpstreamResponse => StatusCode::BAD_GATEWAY,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingParameter => "MissingParameter",
            Self::MalformedUrl => "MalformedUrl",
            Self::UnsupportedScheme => "UnsupportedScheme",
            Self::DomainNotAllowed => "DomainNotAllowed",
            Self::ConnectionError => "ConnectionError",
            Self::Timeout => "Timeout",
            Self::TooManyRedirects => "TooManyRedirects",
            Self::InvalidRedirect => "InvalidRedirect",
            Self::RedirectNotAllowed => "RedirectNotAllowed",
            Self::UpstreamBody => "UpstreamBody",
            Self::RequestBuild => "RequestBuild",
            Self::EmptyUpstreamResponse => "EmptyUpstreamResponse",
        }
    }

    /// Short headline used as the envelope's `error` field.
    #[must_use]
    pub const fn headline(self) -> &'static str {
        match self {
            Self::MissingParameter => "Missing url parameter",
            Self::MalformedUrl | Self::UnsupportedScheme => "Invalid URL format",
            Self::DomainNotAllowed => "Domain not allowed",
            Self::Timeout => "Upstream request timed out",
            Self::TooManyRedirects => "Too many redirects",
            Self::EmptyUpstreamResponse => "Empty response from upstream",
            Self::ConnectionError
            | Self::InvalidRedirect
            | Self::RedirectNotAllowed
            | Self::UpstreamBody
            | Self::RequestBuild => "Proxy request failed",
        }
    }

    /// Rejected before any network activity.
    #[must_use]
    pub fn is_rejection(self) -> bool {
        self.status().is_client_error()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    pub detail: Option<String>,
    pub code: Option<String>,
    pub upstream_status: Option<u16>,
    pub allowed_domains: Option<Vec<String>>,
}

impl Failure {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
            code: None,
            upstream_status: None,
            allowed_domains: None,
        }
    }

    #[must_use]
    pub fn rejected(err: &TargetError, config: &Config) -> Self {
        let kind = match err {
            TargetError::MissingParameter => FailureKind::MissingParameter,
            TargetError::MalformedUrl { .. } => FailureKind::MalformedUrl,
            TargetError::UnsupportedScheme { .. } => FailureKind::UnsupportedScheme,
            TargetError::DomainNotAllowed { .. } => FailureKind::DomainNotAllowed,
        };
        let mut failure = Self::new(kind, err.to_string());
        if kind == FailureKind::DomainNotAllowed {
            failure.allowed_domains = Some(config.allowed_domains());
        }
        failure
    }

    #[must_use]
    pub fn from_fetch(err: &FetchError, target: &ResolvedTarget) -> Self {
        let kind = match err {
            FetchError::Timeout { .. } => FailureKind::Timeout,
            FetchError::Connection { .. } => FailureKind::ConnectionError,
            FetchError::TooManyRedirects { .. } => FailureKind::TooManyRedirects,
            FetchError::InvalidRedirect { .. } => FailureKind::InvalidRedirect,
            FetchError::RedirectNotAllowed { .. } => FailureKind::RedirectNotAllowed,
            FetchError::Body { .. } => FailureKind::UpstreamBody,
            FetchError::Request { .. } => FailureKind::RequestBuild,
        };
        let mut failure = Self::new(kind, err.to_string());
        failure.detail = Some(target.to_string());
        if let FetchError::Connection { code, .. } = err {
            failure.code = Some(code.clone());
        }
        failure
    }

    #[must_use]
    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: self.kind.headline().to_string(),
            kind: self.kind,
            message: Some(self.message.clone()),
            detail: self.detail.clone(),
            code: self.code.clone(),
            usage: (self.kind == FailureKind::MissingParameter).then(|| USAGE.to_string()),
            allowed_domains: self.allowed_domains.clone(),
            status_code: self.upstream_status,
        }
    }
}

/// JSON body of every failed `/proxy` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub error: String,
    pub kind: FailureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_domains: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyOutcome {
    Success {
        status: StatusCode,
        content_type: String,
        body: Bytes,
    },
    Failure(Failure),
}

impl ProxyOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

pub fn relay(result: Result<UpstreamResponse, FetchError>, target: &ResolvedTarget) -> ProxyOutcome {
    match result {
        Ok(response) if response.body.is_empty() => {
            let mut failure = Failure::new(
                FailureKind::EmptyUpstreamResponse,
                format!("{} returned an empty body", response.final_url),
            );
            failure.detail = Some(target.to_string());
            failure.upstream_status = Some(response.status.as_u16());
            ProxyOutcome::Failure(failure)
        }
        Ok(response) => ProxyOutcome::Success {
            status: response.status,
            content_type: content_type_of(&response.headers),
            body: response.body,
        },
        Err(e) => ProxyOutcome::Failure(Failure::from_fetch(&e, target)),
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        let status = self.kind.status();
        let kind = HeaderValue::from_static(self.kind.as_str());
        (
            status,
            [
                (X_PROXY_STATUS, HeaderValue::from_static("error")),
                (X_PROXY_ERROR, kind),
            ],
            Json(self.envelope()),
        )
            .into_response()
    }
}

impl IntoResponse for ProxyOutcome {
    fn into_response(self) -> Response {
        match self {
            Self::Success {
                status,
                content_type,
                body,
            } => Response::builder()
                .status(status)
                .header(CONTENT_TYPE, content_type)
                .header(X_PROXY_STATUS, "success")
                .body(axum::body::Body::from(body))
                .unwrap_or_else(|e| {
                    tracing::error!(error = %e, "failed to build response");
                    StatusCode::BAD_GATEWAY.into_response()
                }),
            Self::Failure(failure) => failure.into_response(),
        }
    }
}

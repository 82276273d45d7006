//! Target URL validation against the allowlist.
//!
//! [`validate`] turns the raw `url` query parameter into a [`ParsedUrl`]
//! bound to the [`UpstreamPolicy`] whose domain it matched. Nothing here
//! touches the network: a rejected URL never reaches the fetcher.

use url::Url;

use crate::config::model::{Config, UpstreamPolicy};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("missing url parameter")]
    MissingParameter,

    #[error("'{input}' is not an absolute URL: {reason}")]
    MalformedUrl { input: String, reason: String },

    #[error("unsupported scheme '{scheme}' (expected http or https)")]
    UnsupportedScheme { scheme: String },

    #[error("host '{host}' is not allowlisted")]
    DomainNotAllowed { host: String },
}

/// A syntactically valid, allowlisted target and the policy it matched.
#[derive(Debug, Clone)]
pub struct ParsedUrl<'a> {
    pub url: Url,
    pub policy: &'a UpstreamPolicy,
}

impl ParsedUrl<'_> {
    #[must_use]
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }
}

pub fn validate<'a>(raw: Option<&str>, config: &'a Config) -> Result<ParsedUrl<'a>, TargetError> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(TargetError::MissingParameter);
    }

    let url = Url::parse(raw).map_err(|e| TargetError::MalformedUrl {
        input: raw.to_string(),
        reason: e.to_string(),
    })?;

    let Some(host) = url.host_str().filter(|h| !h.is_empty()) else {
        return Err(TargetError::MalformedUrl {
            input: raw.to_string(),
            reason: "URL has no host".into(),
        });
    };

    if !matches!(url.scheme(), "http" | "https") {
        return Err(TargetError::UnsupportedScheme {
            scheme: url.scheme().to_string(),
        });
    }

    let policy = config
        .policy_for(host)
        .ok_or_else(|| TargetError::DomainNotAllowed {
            host: host.to_string(),
        })?;

    Ok(ParsedUrl { url, policy })
}

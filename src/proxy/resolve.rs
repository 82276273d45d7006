//! Per-domain target resolution.
//!
//! [`resolve`] applies the matched [`UpstreamPolicy`] to a validated URL:
//! host rewrite first, then the scheme policy, then the port. A port
//! written in the request URL always wins over the policy default.
//! Resolution is pure, so the same URL always yields the same target.

use url::Url;

use crate::config::model::SchemePolicy;

use super::validate::ParsedUrl;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub url: Url,
    pub policy: String,
    pub host: String,
    pub port: u16,
    pub verify_tls: bool,
}

impl ResolvedTarget {
    #[must_use]
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }
}

impl std::fmt::Display for ResolvedTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}:{}, {})", self.url, self.host, self.port, self.policy)
    }
}

fn well_known_port(scheme: &str) -> u16 {
    if scheme == "https" {
        443
    } else {
        80
    }
}

#[must_use]
pub fn resolve(parsed: &ParsedUrl<'_>) -> ResolvedTarget {
    let policy = parsed.policy;
    let mut url = parsed.url.clone();

    // `Url::port` is `None` both for a missing port and for the scheme's
    // default port, so `https://host:443` counts as "no explicit port".
    let explicit_port = url.port();

    if let Some(to) = policy.rewrite_hosts.get(parsed.host()) {
        if let Err(e) = url.set_host(Some(to)) {
            tracing::warn!(from = %parsed.host(), to = %to, error = %e, "host rewrite skipped");
        }
    }

    let scheme = match policy.scheme {
        SchemePolicy::Http => "http",
        SchemePolicy::Https => "https",
        SchemePolicy::Preserve => parsed.url.scheme(),
    };
    if url.scheme() != scheme {
        // http <-> https is always a permitted switch for special schemes
        let _ = url.set_scheme(scheme);
    }

    let port = explicit_port
        .or(policy.default_port)
        .unwrap_or_else(|| well_known_port(scheme));
    // validated URLs always carry a host, so setting the port cannot fail
    let _ = url.set_port(Some(port));

    ResolvedTarget {
        host: url.host_str().unwrap_or_default().to_string(),
        port,
        url,
        policy: policy.name.clone(),
        verify_tls: policy.verify_tls,
    }
}

//! Serde data structures for the relay policy table.
//!
//! Contains [`Config`] (the root), [`UpstreamPolicy`] (one allowlisted
//! domain family with its protocol quirks), [`FetchSettings`] and
//! [`HostMatch`]. All types derive `Serialize` and `Deserialize` with
//! `deny_unknown_fields` for strict parsing. [`Config::default`] is the
//! canonical two-upstream policy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_REDIRECTS: u32 = 5;
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

const fn default_max_redirects() -> u32 {
    DEFAULT_MAX_REDIRECTS
}

const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36"
        .to_string()
}

fn default_accept() -> String {
    "application/json, text/plain, text/xml, */*".to_string()
}

fn default_accept_language() -> String {
    "ko-KR,ko;q=0.9".to_string()
}

fn is_false(v: &bool) -> bool {
    !*v
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub host_match: HostMatch,

    pub upstreams: Vec<UpstreamPolicy>,

    #[serde(default)]
    pub fetch: FetchSettings,
}

/// How a request hostname is compared against an upstream `domain`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostMatch {
    /// Exact host or any subdomain of it (`a.b.example.com` matches `example.com`).
    #[default]
    Suffix,
    /// Host contains the domain anywhere. Accepts `evilexample.com` too.
    Substring,
}

impl HostMatch {
    #[must_use]
    pub fn matches(self, host: &str, domain: &str) -> bool {
        match self {
            Self::Substring => host.contains(domain),
            Self::Suffix => {
                host == domain
                    || host
                        .strip_suffix(domain)
                        .is_some_and(|prefix| prefix.ends_with('.'))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemePolicy {
    /// Keep whatever scheme the caller asked for.
    #[default]
    Preserve,
    Http,
    Https,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamPolicy {
    pub name: String,

    pub domain: String,

    #[serde(default)]
    pub scheme: SchemePolicy,

    /// Port used when the request URL carries none. Falls back to the
    /// scheme's well-known port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_port: Option<u16>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rewrite_hosts: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub verify_tls: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FetchSettings {
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_accept")]
    pub accept: String,

    #[serde(default = "default_accept_language")]
    pub accept_language: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout(),
            max_redirects: default_max_redirects(),
            max_body_bytes: default_max_body_bytes(),
            user_agent: default_user_agent(),
            accept: default_accept(),
            accept_language: default_accept_language(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host_match: HostMatch::default(),
            upstreams: vec![
                // HTTPS on the exchange-rate API has returned empty bodies; the
                // legacy www host moved to oapi.
                UpstreamPolicy {
                    name: "koreaexim".into(),
                    domain: "koreaexim.go.kr".into(),
                    scheme: SchemePolicy::Http,
                    default_port: None,
                    rewrite_hosts: BTreeMap::from([(
                        "www.koreaexim.go.kr".to_string(),
                        "oapi.koreaexim.go.kr".to_string(),
                    )]),
                    verify_tls: false,
                },
                UpstreamPolicy {
                    name: "unipass".into(),
                    domain: "unipass.customs.go.kr".into(),
                    scheme: SchemePolicy::Https,
                    default_port: Some(38010),
                    rewrite_hosts: BTreeMap::new(),
                    verify_tls: false,
                },
            ],
            fetch: FetchSettings::default(),
        }
    }
}

impl Config {
    /// First upstream whose domain matches `host` under the configured mode.
    #[must_use]
    pub fn policy_for(&self, host: &str) -> Option<&UpstreamPolicy> {
        self.upstreams
            .iter()
            .find(|p| self.host_match.matches(host, &p.domain))
    }

    #[must_use]
    pub fn allowed_domains(&self) -> Vec<String> {
        self.upstreams.iter().map(|p| p.domain.clone()).collect()
    }
}

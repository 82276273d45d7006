//! Policy table validation with detailed error reporting.
//!
//! The [`validate`] function checks a parsed [`Config`] for structural
//! errors such as an empty allowlist, duplicate or malformed domains,
//! rewrites that escape their own domain, and out-of-range fetch
//! settings. Every problem is collected into a [`ValidationError`] with
//! an optional suggestion instead of stopping at the first one.

use std::collections::HashSet;

use axum::http::HeaderValue;

use super::model::{Config, FetchSettings};
use crate::error::ValidationError;

pub const MAX_REDIRECT_LIMIT: u32 = 20;

/// Validate a single allowlist domain. Returns `Ok(())` or a human-readable error.
pub fn validate_domain(domain: &str) -> Result<(), String> {
    if domain.is_empty() {
        return Err("domain cannot be empty".into());
    }
    if domain.contains("://") {
        return Err("domain must not include a scheme".into());
    }
    if domain.contains(['/', ':', '?', '#']) || domain.chars().any(char::is_whitespace) {
        return Err(format!("'{domain}' is not a bare hostname"));
    }
    if domain != domain.to_ascii_lowercase() {
        return Err("domain must be lowercase (hostnames are normalized before matching)".into());
    }
    Ok(())
}

fn err(field: impl Into<String>, message: impl Into<String>) -> ValidationError {
    ValidationError {
        field: field.into(),
        message: message.into(),
        suggestion: None,
    }
}

pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.upstreams.is_empty() {
        errors.push(err("upstreams", "at least one upstream must be defined"));
    }

    let mut seen_names = HashSet::new();
    let mut seen_domains = HashSet::new();

    for (i, upstream) in config.upstreams.iter().enumerate() {
        let prefix = format!("upstreams[{i}]");

        if upstream.name.is_empty() {
            errors.push(err(format!("{prefix}.name"), "name cannot be empty"));
        } else if !seen_names.insert(upstream.name.as_str()) {
            errors.push(err(
                format!("{prefix}.name"),
                format!("duplicate upstream name '{}'", upstream.name),
            ));
        }

        if let Err(msg) = validate_domain(&upstream.domain) {
            let suggestion = upstream
                .domain
                .split_once("://")
                .map(|(_, rest)| format!("did you mean '{}'?", rest.trim_end_matches('/')));
            errors.push(ValidationError {
                field: format!("{prefix}.domain"),
                message: msg,
                suggestion,
            });
        } else if !seen_domains.insert(upstream.domain.as_str()) {
            errors.push(err(
                format!("{prefix}.domain"),
                format!("duplicate domain '{}'", upstream.domain),
            ));
        }

        if upstream.default_port == Some(0) {
            errors.push(err(
                format!("{prefix}.default_port"),
                "port must be between 1 and 65535",
            ));
        }

        for (from, to) in &upstream.rewrite_hosts {
            if !config.host_match.matches(from, &upstream.domain) {
                errors.push(err(
                    format!("{prefix}.rewrite_hosts.{from}"),
                    format!("source host does not belong to '{}'", upstream.domain),
                ));
            }
            if let Err(msg) = validate_domain(to) {
                errors.push(err(format!("{prefix}.rewrite_hosts.{from}"), msg));
            } else if !config.host_match.matches(to, &upstream.domain) {
                errors.push(ValidationError {
                    field: format!("{prefix}.rewrite_hosts.{from}"),
                    message: format!("rewrite target '{to}' leaves '{}'", upstream.domain),
                    suggestion: Some("rewrites must stay inside the allowlisted domain".into()),
                });
            }
        }
    }

    validate_fetch(&config.fetch, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_fetch(fetch: &FetchSettings, errors: &mut Vec<ValidationError>) {
    if fetch.timeout_ms == 0 {
        errors.push(err("fetch.timeout_ms", "timeout must be greater than 0"));
    }
    if fetch.max_redirects > MAX_REDIRECT_LIMIT {
        errors.push(ValidationError {
            field: "fetch.max_redirects".into(),
            message: format!("{} exceeds the limit of {MAX_REDIRECT_LIMIT}", fetch.max_redirects),
            suggestion: Some("the canonical budget is 5".into()),
        });
    }
    if fetch.max_body_bytes == 0 {
        errors.push(err("fetch.max_body_bytes", "body limit must be greater than 0"));
    }
    for (field, value) in [
        ("fetch.user_agent", &fetch.user_agent),
        ("fetch.accept", &fetch.accept),
        ("fetch.accept_language", &fetch.accept_language),
    ] {
        if HeaderValue::from_str(value).is_err() {
            errors.push(err(field, "not a valid header value"));
        }
    }
}

/// One-line summary printed by `kapi-relay validate` on success.
#[must_use]
pub fn format_validation_report(path: &str, config: &Config) -> String {
    let domains = config.allowed_domains().join(", ");
    format!(
        "{path} is valid ({} upstreams: {domains}; timeout {}ms, {} redirects)",
        config.upstreams.len(),
        config.fetch.timeout_ms,
        config.fetch.max_redirects
    )
}

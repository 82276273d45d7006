//! Integration tests for the `/proxy` pipeline against scripted upstreams.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use common::{proxy_url, start_relay, Scripted, ScriptedUpstream};
use kapi_relay::config::model::{Config, SchemePolicy, UpstreamPolicy};
use kapi_relay::proxy::forward;
use kapi_relay::proxy::relay::{ErrorEnvelope, FailureKind, ProxyOutcome};

const EXIM_URL: &str = "https://www.koreaexim.go.kr/site/program/financial/exchangeJSON";
const EXIM_RESOLVED: &str = "http://oapi.koreaexim.go.kr/site/program/financial/exchangeJSON";

#[tokio::test]
async fn missing_url_returns_400_with_usage() {
    let upstream = Arc::new(ScriptedUpstream::new());
    let (addr, shutdown) = start_relay(Config::default(), upstream.clone()).await;

    for url in [format!("http://{addr}/proxy"), format!("http://{addr}/proxy?url=")] {
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 400);
        assert_eq!(resp.headers()["x-proxy-status"], "error");
        assert_eq!(resp.headers()["x-proxy-error"], "MissingParameter");
        let envelope: ErrorEnvelope = resp.json().await.unwrap();
        assert_eq!(envelope.error, "Missing url parameter");
        assert_eq!(envelope.usage.as_deref(), Some("/proxy?url=<encoded_url>"));
    }
    assert_eq!(upstream.calls(), 0);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn malformed_urls_return_400_without_fetching() {
    let upstream = Arc::new(ScriptedUpstream::new());
    let (addr, shutdown) = start_relay(Config::default(), upstream.clone()).await;

    for target in ["not a url", "koreaexim.go.kr/x", "http://", "ftp://evil.com/x"] {
        let resp = reqwest::get(proxy_url(addr, target)).await.unwrap();
        assert_eq!(resp.status(), 400, "{target}");
        let envelope: ErrorEnvelope = resp.json().await.unwrap();
        assert_eq!(envelope.error, "Invalid URL format");
    }
    assert_eq!(upstream.calls(), 0);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn disallowed_hosts_return_403_without_fetching() {
    let upstream = Arc::new(ScriptedUpstream::new());
    let (addr, shutdown) = start_relay(Config::default(), upstream.clone()).await;

    for target in [
        "https://example.com/",
        "https://evilkoreaexim.go.kr/site",
        "https://unipass.customs.go.kr.evil.com/x",
        "http://127.0.0.1:8080/",
    ] {
        let resp = reqwest::get(proxy_url(addr, target)).await.unwrap();
        assert_eq!(resp.status(), 403, "{target}");
        let envelope: ErrorEnvelope = resp.json().await.unwrap();
        assert_eq!(envelope.kind, FailureKind::DomainNotAllowed);
        assert_eq!(
            envelope.allowed_domains.unwrap(),
            vec!["koreaexim.go.kr", "unipass.customs.go.kr"]
        );
    }
    assert_eq!(upstream.calls(), 0);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn exim_request_is_rewritten_and_relayed() {
    let json = r#"[{"result":1,"cur_unit":"USD","deal_bas_r":"1,380.5"}]"#;
    let upstream = Arc::new(
        ScriptedUpstream::new().route(EXIM_RESOLVED, Scripted::ok("application/json;charset=UTF-8", json)),
    );
    let (addr, shutdown) = start_relay(Config::default(), upstream.clone()).await;

    let resp = reqwest::get(proxy_url(addr, EXIM_URL)).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-proxy-status"], "success");
    assert_eq!(resp.headers()["content-type"], "application/json;charset=UTF-8");
    assert!(resp.headers().contains_key("x-correlation-id"));
    assert_eq!(resp.text().await.unwrap(), json);

    let hops = upstream.hops();
    assert_eq!(hops.len(), 1);
    assert_eq!(hops[0].url.as_str(), EXIM_RESOLVED);
    assert_eq!(hops[0].headers["accept-language"], "ko-KR,ko;q=0.9");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn unipass_request_goes_to_port_38010_without_verification() {
    let upstream = Arc::new(ScriptedUpstream::new().route(
        "https://unipass.customs.go.kr:38010/something",
        Scripted::ok("text/xml", "<cargCsclPrgsInfoQryRtnVo/>"),
    ));
    let (addr, shutdown) = start_relay(Config::default(), upstream.clone()).await;

    let resp = reqwest::get(proxy_url(addr, "https://unipass.customs.go.kr/something"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "text/xml");

    let hops = upstream.hops();
    assert_eq!(hops[0].url.port(), Some(38010));
    assert_eq!(hops[0].url.scheme(), "https");
    assert!(!hops[0].verify_tls);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn upstream_error_status_is_relayed_not_rewritten() {
    let mut not_found = Scripted::ok("text/html", "<h1>Not Found</h1>");
    not_found.status = 404;
    let upstream = Arc::new(ScriptedUpstream::new().route(EXIM_RESOLVED, not_found));
    let (addr, shutdown) = start_relay(Config::default(), upstream).await;

    let resp = reqwest::get(proxy_url(addr, EXIM_URL)).await.unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(resp.headers()["x-proxy-status"], "success");
    assert_eq!(resp.text().await.unwrap(), "<h1>Not Found</h1>");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn empty_body_returns_502() {
    let upstream = Arc::new(
        ScriptedUpstream::new().route(EXIM_RESOLVED, Scripted::ok("application/json", "")),
    );
    let (addr, shutdown) = start_relay(Config::default(), upstream).await;

    let resp = reqwest::get(proxy_url(addr, EXIM_URL)).await.unwrap();
    assert_eq!(resp.status(), 502);
    assert_eq!(resp.headers()["x-proxy-error"], "EmptyUpstreamResponse");
    let envelope: ErrorEnvelope = resp.json().await.unwrap();
    assert_eq!(envelope.error, "Empty response from upstream");
    assert_eq!(envelope.status_code, Some(200));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn three_redirects_within_budget_are_followed() {
    let base = "http://oapi.koreaexim.go.kr";
    let upstream = Arc::new(ScriptedUpstream::new().redirect_chain(base, 3, r#"{"ok":true}"#));
    let (addr, shutdown) = start_relay(Config::default(), upstream.clone()).await;

    let resp = reqwest::get(proxy_url(addr, &format!("{base}/r0"))).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), r#"{"ok":true}"#);
    assert_eq!(upstream.calls(), 4);
    assert_eq!(
        upstream.hops().last().unwrap().url.as_str(),
        "http://oapi.koreaexim.go.kr/final"
    );

    let _ = shutdown.send(());
}

#[tokio::test]
async fn five_redirects_exhaust_but_do_not_exceed_budget() {
    let base = "http://oapi.koreaexim.go.kr";
    let upstream = ScriptedUpstream::new().redirect_chain(base, 5, "done");
    let start = format!("{base}/r0");
    let outcome = forward(&Config::default(), &upstream, Some(start.as_str()), "t").await;
    assert!(outcome.is_success());
    assert_eq!(upstream.calls(), 6);
}

#[tokio::test]
async fn six_redirects_exceed_budget() {
    let base = "http://oapi.koreaexim.go.kr";
    let upstream = Arc::new(ScriptedUpstream::new().redirect_chain(base, 6, "never"));
    let (addr, shutdown) = start_relay(Config::default(), upstream.clone()).await;

    let resp = reqwest::get(proxy_url(addr, &format!("{base}/r0"))).await.unwrap();
    assert_eq!(resp.status(), 500);
    let envelope: ErrorEnvelope = resp.json().await.unwrap();
    assert_eq!(envelope.kind, FailureKind::TooManyRedirects);
    // initial request plus five followed redirects; the sixth is never requested
    assert_eq!(upstream.calls(), 6);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn self_redirect_loop_terminates() {
    let target = "http://oapi.koreaexim.go.kr/loop";
    let upstream = ScriptedUpstream::new().route(target, Scripted::redirect("/loop"));
    let outcome = forward(&Config::default(), &upstream, Some(target), "t").await;

    let ProxyOutcome::Failure(failure) = outcome else {
        panic!("expected failure");
    };
    assert_eq!(failure.kind, FailureKind::TooManyRedirects);
    assert_eq!(upstream.calls(), 6);
}

#[tokio::test]
async fn redirect_off_allowlist_is_refused() {
    let upstream = ScriptedUpstream::new()
        .route(EXIM_RESOLVED, Scripted::redirect("https://evil.com/steal"))
        .route("https://evil.com/steal", Scripted::ok("text/plain", "gotcha"));
    let outcome = forward(&Config::default(), &upstream, Some(EXIM_URL), "t").await;

    let ProxyOutcome::Failure(failure) = outcome else {
        panic!("expected failure");
    };
    assert_eq!(failure.kind, FailureKind::RedirectNotAllowed);
    assert_eq!(upstream.calls(), 1);
}

fn policy(name: &str, domain: &str, verify_tls: bool) -> UpstreamPolicy {
    UpstreamPolicy {
        name: name.into(),
        domain: domain.into(),
        scheme: SchemePolicy::Preserve,
        default_port: None,
        rewrite_hosts: BTreeMap::new(),
        verify_tls,
    }
}

#[tokio::test]
async fn redirect_hop_uses_tls_setting_of_its_own_domain() {
    let config = Config {
        upstreams: vec![
            policy("loose", "loose.example", false),
            policy("strict", "strict.example", true),
        ],
        ..Config::default()
    };
    let upstream = ScriptedUpstream::new()
        .route(
            "https://loose.example/a",
            Scripted::redirect("https://strict.example/b"),
        )
        .route("https://strict.example/b", Scripted::ok("text/plain", "ok"))
        .route(
            "https://strict.example/c",
            Scripted::redirect("https://loose.example/d"),
        )
        .route("https://loose.example/d", Scripted::ok("text/plain", "ok"));

    let outcome = forward(&config, &upstream, Some("https://loose.example/a"), "t").await;
    assert!(outcome.is_success());
    let outcome = forward(&config, &upstream, Some("https://strict.example/c"), "t").await;
    assert!(outcome.is_success());

    let hops: Vec<(String, bool)> = upstream
        .hops()
        .iter()
        .map(|hop| (hop.url.to_string(), hop.verify_tls))
        .collect();
    assert_eq!(
        hops,
        vec![
            ("https://loose.example/a".to_string(), false),
            ("https://strict.example/b".to_string(), true),
            ("https://strict.example/c".to_string(), true),
            ("https://loose.example/d".to_string(), false),
        ]
    );
}

#[tokio::test]
async fn connection_error_returns_500_with_code() {
    let upstream = Arc::new(ScriptedUpstream::new());
    let (addr, shutdown) = start_relay(Config::default(), upstream).await;

    let resp = reqwest::get(proxy_url(addr, EXIM_URL)).await.unwrap();
    assert_eq!(resp.status(), 500);
    let envelope: ErrorEnvelope = resp.json().await.unwrap();
    assert_eq!(envelope.error, "Proxy request failed");
    assert_eq!(envelope.code.as_deref(), Some("ENOTFOUND"));
    assert!(envelope.detail.unwrap().contains("oapi.koreaexim.go.kr"));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn same_request_twice_yields_same_outcome() {
    let upstream = ScriptedUpstream::new().route(EXIM_RESOLVED, Scripted::ok("application/json", "[1]"));
    let config = Config::default();

    let first = forward(&config, &upstream, Some(EXIM_URL), "a").await;
    let second = forward(&config, &upstream, Some(EXIM_URL), "b").await;
    assert_eq!(first, second);
    assert!(first.is_success());
}

#[tokio::test(start_paused = true)]
async fn slow_upstream_times_out_after_30s() {
    let upstream = ScriptedUpstream::new().route(
        EXIM_RESOLVED,
        Scripted::ok("application/json", "[]").delayed(Duration::from_secs(31)),
    );
    let outcome = forward(&Config::default(), &upstream, Some(EXIM_URL), "t").await;

    let ProxyOutcome::Failure(failure) = outcome else {
        panic!("expected failure");
    };
    assert_eq!(failure.kind, FailureKind::Timeout);
    assert_eq!(failure.kind.status(), 504);
}

#[tokio::test(start_paused = true)]
async fn timeout_budget_applies_per_hop() {
    let upstream = ScriptedUpstream::new()
        .route(
            EXIM_RESOLVED,
            Scripted::redirect("/second").delayed(Duration::from_secs(20)),
        )
        .route(
            "http://oapi.koreaexim.go.kr/second",
            Scripted::ok("application/json", "[]").delayed(Duration::from_secs(20)),
        );
    let outcome = forward(&Config::default(), &upstream, Some(EXIM_URL), "t").await;
    assert!(outcome.is_success());
}

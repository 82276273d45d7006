//! Shared helpers: scripted upstreams and an in-process relay server.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;

use kapi_relay::config::model::Config;
use kapi_relay::config::{ConfigVersion, LoadedConfig};
use kapi_relay::proxy::fetch::{FetchError, Hop, HopResponse, Upstream};
use kapi_relay::server::{self, AppState};

#[derive(Clone)]
pub struct Scripted {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
    pub delay: Option<Duration>,
}

impl Scripted {
    pub fn ok(content_type: &str, body: &str) -> Self {
        Self {
            status: 200,
            headers: vec![("content-type", content_type.to_string())],
            body: body.to_string(),
            delay: None,
        }
    }

    pub fn redirect(location: &str) -> Self {
        Self {
            status: 302,
            headers: vec![("location", location.to_string())],
            body: String::new(),
            delay: None,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Upstream answering from a fixed URL -> response table and recording every hop.
#[derive(Default)]
pub struct ScriptedUpstream {
    routes: HashMap<String, Scripted>,
    hops: Mutex<Vec<Hop>>,
}

impl ScriptedUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, url: &str, response: Scripted) -> Self {
        self.routes.insert(url.to_string(), response);
        self
    }

    /// `{base}/r0` redirects to `/r1` ... `/r{n-1}` redirects to `/final`.
    pub fn redirect_chain(mut self, base: &str, hops: usize, body: &str) -> Self {
        for i in 0..hops {
            let next = if i + 1 == hops {
                "/final".to_string()
            } else {
                format!("/r{}", i + 1)
            };
            self.routes
                .insert(format!("{base}/r{i}"), Scripted::redirect(&next));
        }
        self.routes.insert(
            format!("{base}/final"),
            Scripted::ok("application/json", body),
        );
        self
    }

    pub fn hops(&self) -> Vec<Hop> {
        self.hops.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.hops.lock().unwrap().len()
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    async fn send(&self, hop: &Hop) -> Result<HopResponse, FetchError> {
        self.hops.lock().unwrap().push(hop.clone());

        let Some(scripted) = self.routes.get(hop.url.as_str()).cloned() else {
            return Err(FetchError::Connection {
                url: hop.url.to_string(),
                code: "ENOTFOUND".into(),
                message: "no scripted response".into(),
            });
        };

        if let Some(delay) = scripted.delay {
            tokio::time::sleep(delay).await;
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &scripted.headers {
            headers.insert(*name, value.parse().unwrap());
        }
        Ok(HopResponse {
            status: StatusCode::from_u16(scripted.status).unwrap(),
            headers,
            body: Bytes::from(scripted.body),
        })
    }
}

pub fn loaded(config: Config) -> LoadedConfig {
    LoadedConfig {
        config,
        version: ConfigVersion::Hash("0123456789abcdef".into()),
        source_name: "test".into(),
    }
}

pub async fn start_relay(
    config: Config,
    upstream: Arc<dyn Upstream>,
) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
    let state = Arc::new(AppState::with_upstream(loaded(config), upstream));
    serve(server::build_router(state)).await
}

pub async fn serve(router: axum::Router) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
    });

    (addr, shutdown_tx)
}

pub fn proxy_url(addr: SocketAddr, target: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
    format!("http://{addr}/proxy?url={encoded}")
}

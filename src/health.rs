//! `GET /health` and `GET /` handlers.
//!
//! [`health_handler`] returns a [`HealthResponse`] with the server
//! version, a timestamp, uptime, policy metadata and cumulative request
//! counters.
//! [`index_handler`] describes the relay's endpoints and allowlist.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::proxy::relay::USAGE;
use crate::server::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// RFC 3339 time the response was produced, in UTC.
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub config: ConfigHealth,
    pub stats: StatsResponse,
}

#[derive(Serialize, Deserialize)]
pub struct ConfigHealth {
    pub source: String,
    pub version: String,
    pub upstreams: usize,
}

#[derive(Serialize, Deserialize)]
pub struct StatsResponse {
    pub relayed: u64,
    pub failed: u64,
    pub rejected: u64,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexResponse {
    pub name: String,
    pub version: String,
    pub endpoints: Endpoints,
    pub allowed_domains: Vec<String>,
}

#[derive(Serialize, Deserialize)]
pub struct Endpoints {
    pub proxy: String,
    pub health: String,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        config: ConfigHealth {
            source: state.source_name.clone(),
            version: state.version.short().to_string(),
            upstreams: state.config.upstreams.len(),
        },
        stats: StatsResponse {
            relayed: state.stats.relayed.load(Ordering::Relaxed),
            failed: state.stats.failed.load(Ordering::Relaxed),
            rejected: state.stats.rejected.load(Ordering::Relaxed),
        },
    })
}

pub async fn index_handler(State(state): State<Arc<AppState>>) -> Json<IndexResponse> {
    Json(IndexResponse {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: Endpoints {
            proxy: USAGE.to_string(),
            health: "/health".to_string(),
        },
        allowed_domains: state.config.allowed_domains(),
    })
}

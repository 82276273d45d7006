//! kapi-relay is a restricted HTTP forwarding relay.
//!
//! It accepts a caller-supplied target URL, checks it against a fixed
//! domain allowlist, fetches it on the caller's behalf while working
//! around the TLS, protocol and port quirks of the Export-Import Bank
//! API and the customs single-window (UNI-PASS), and returns the upstream
//! response verbatim.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, init, validate, health).
//! - [`config`] -- The per-domain policy table: model, validation, loading.
//! - [`error`] -- Process-level error types using `thiserror`.
//! - [`health`] -- `GET /health` and `GET /` handlers.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`proxy`] -- The forwarding pipeline: validate, resolve, fetch, relay.
//! - [`server`] -- Axum server setup, shared read-only state, HTTP client,
//!   and graceful shutdown.
//! - [`tls`] -- rustls configuration for upstreams with unverifiable chains.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML policy file support _(enabled by default)_ |
//! | `json` | JSON policy file support |
//! | `toml` | TOML policy file support |
//! | `file-backends` | All policy file formats |
//! | `full` | All features |

// Binary crate — public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod proxy;
pub mod server;
pub mod tls;

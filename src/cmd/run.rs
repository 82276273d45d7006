//! `kapi-relay run` — start the relay server.
//!
//! Loads the policy (file or built-in), applies CLI overrides, validates
//! the result, builds the shared upstream client once, and serves until
//! Ctrl+C / SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::cli::RunArgs;
use crate::config::validation::validate;
use crate::config::{self, LoadedConfig};
use crate::error::RelayError;
use crate::logging;
use crate::server::{self, AppState};

pub async fn execute(args: RunArgs) -> Result<(), RelayError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    logging::init(&args.log_level, log_format);

    let mut loaded = match args.config.as_deref() {
        Some(path) => config::load_file(path).await?,
        None => config::builtin()?,
    };
    apply_overrides(&mut loaded, &args)?;

    let domains = loaded.config.allowed_domains().join(",");
    let timeout_ms = loaded.config.fetch.timeout_ms;
    let max_redirects = loaded.config.fetch.max_redirects;
    let source = loaded.source_name.clone();

    let state = Arc::new(AppState::new(loaded));
    let router = server::build_router(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        policy = %source,
        allowed_domains = %domains,
        timeout_ms,
        max_redirects,
        "kapi-relay started"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(server::shutdown_signal())
        .await?;

    tracing::info!("kapi-relay stopped");
    Ok(())
}

/// CLI tuning flags replace policy values; the result is validated again.
fn apply_overrides(loaded: &mut LoadedConfig, args: &RunArgs) -> Result<(), RelayError> {
    if let Some(timeout) = args.timeout {
        loaded.config.fetch.timeout_ms = timeout;
    }
    if let Some(max_redirects) = args.max_redirects {
        loaded.config.fetch.max_redirects = max_redirects;
    }
    validate(&loaded.config).map_err(|errors| RelayError::ConfigValidation { errors })
}

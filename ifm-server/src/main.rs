//! ifm-server: HTTP front end of the IFM defect-inference runtime.
//!
//! Configuration comes from `IFM_*` environment variables (see
//! [`config::Config`]).  Analysis entries are persisted in SQLite; archive
//! documents land in the managed uploads below `IFM_UPLOAD_ROOT`.

mod config;
mod db;
mod error;
mod middleware;
mod routes;
mod schemas;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::db::sqlite::SqliteStore;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::from_env();
    init_tracing(&cfg);
    info!(version = env!("CARGO_PKG_VERSION"), "ifm-server starting");

    let store = SqliteStore::connect(&cfg.database_url)
        .await
        .with_context(|| format!("opening analysis store at {}", cfg.database_url))?;
    info!(database_url = %cfg.database_url, "analysis store ready");

    tokio::fs::create_dir_all(&cfg.upload_root)
        .await
        .with_context(|| format!("creating upload root {}", cfg.upload_root.display()))?;
    let state = Arc::new(AppState::new(cfg.clone(), store));
    info!(
        upload_root = %cfg.upload_root.display(),
        recognizer = %cfg.recognizer_program,
        model_timeout_secs = cfg.model_timeout_secs,
        max_attempts = cfg.max_attempts,
        "inference runtime started"
    );

    let addr: SocketAddr = cfg
        .bind_address
        .parse()
        .with_context(|| format!("invalid IFM_BIND address {}", cfg.bind_address))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, swagger = cfg.enable_swagger, "HTTP server listening");

    axum::serve(listener, routes::build(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("ifm-server stopped");
    Ok(())
}

/// Install the global subscriber: `RUST_LOG` wins over `IFM_LOG`, and an
/// invalid filter falls back to `info`.
fn init_tracing(cfg: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| cfg.log_level.parse::<EnvFilter>())
        .unwrap_or_else(|e| {
            eprintln!(
                "WARN: IFM_LOG='{}' is not a valid tracing filter ({e}); falling back to 'info'",
                cfg.log_level
            );
            EnvFilter::new("info")
        });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Resolves on SIGINT or SIGTERM.  In-flight runs are abandoned with the
/// process; their entries keep the last refreshed status.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; draining HTTP connections");
}

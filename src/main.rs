//! bridge-proxy
//!
//! An HTTP/1.1 reverse proxy. Each client connection is bridged to one
//! backend picked round-robin, skipping backends that keep failing.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client                 ┌──────────────────────────────────────────────┐
//!     ───────────────────────┼─▶ net::Listener ─▶ http::ProxyServer         │
//!                            │                        │                     │
//!                            │                        ▼                     │
//!                            │               bridge::session ◀── LoadBalancer
//!                            │                 (Bridge state)       ▲       │
//!                            │                        │             │       │
//!                            │                        ▼        failures /   │
//!     ◀──────────────────────┼──── client ◀──── backend dial ── successes   │──▶ Backend
//!                            │                                              │
//!                            │  config · observability · lifecycle          │
//!                            └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use bridge_proxy::config::{self, BackendConfig, ProxyConfig};
use bridge_proxy::lifecycle::{wait_for_signal, Shutdown};
use bridge_proxy::net::Listener;
use bridge_proxy::observability::logging;
use bridge_proxy::ProxyServer;

#[derive(Parser, Debug)]
#[command(name = "bridge-proxy", version, about = "HTTP/1.1 round-robin reverse proxy")]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,

    /// Backend as host:port. Repeat to list several; replaces configured backends.
    #[arg(long = "backend", value_name = "HOST:PORT")]
    backends: Vec<BackendConfig>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => config::read_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }
    if !args.backends.is_empty() {
        config.backends = args.backends;
    }
    if let Err(errors) = config::validate_config(&config) {
        for e in &errors {
            eprintln!("config error: {e}");
        }
        return Err(config::ConfigError::Validation(errors).into());
    }

    let _log_guard = logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "bridge-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        backends = config.backends.len(),
        failure_threshold = config.health_check.failure_threshold,
        "Configuration loaded"
    );

    let listener = Listener::bind(&config.listener).await?;
    let server = ProxyServer::new(&config)?;

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener, receiver).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

//! Fieldwake Server
//!
//! Long-poll command rendezvous and status report server for field devices.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use fieldwake_core::config::load_config;
use fieldwake_core::tracing_init::{default_filter, init_tracing};
use fieldwake_server::tasks::{shutdown_signal, spawn_status_sweep};
use fieldwake_server::{AppState, build_router};

#[derive(Parser, Debug)]
#[command(name = "fieldwake-server")]
#[command(version, about = "Fieldwake server - device long-poll rendezvous and status log")]
struct Args {
    /// JSON config file (defaults to ~/.config/fieldwake/settings.json if present).
    #[arg(long, env = "FIELDWAKE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Path of the durable event log document.
    #[arg(long)]
    data_file: Option<PathBuf>,

    /// Long-poll timeout in seconds.
    #[arg(long)]
    wait_timeout: Option<u64>,

    /// Maximum number of simultaneously parked long-polls.
    #[arg(long)]
    max_waiters: Option<usize>,

    /// Status cache TTL in seconds.
    #[arg(long)]
    status_ttl: Option<u64>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.listen_addr = addr;
    }
    if let Some(path) = args.data_file {
        config.data_file = path;
    }
    if let Some(secs) = args.wait_timeout {
        config.wait_timeout_secs = secs;
    }
    if let Some(n) = args.max_waiters {
        config.max_waiters = n;
    }
    if let Some(secs) = args.status_ttl {
        config.status_ttl_secs = secs;
    }
    config.log_json |= args.log_json;

    init_tracing(&default_filter(&config.log_level), config.log_json)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.listen_addr,
        data_file = %config.data_file.display(),
        wait_timeout_secs = config.wait_timeout_secs,
        max_waiters = config.max_waiters,
        "Starting fieldwake-server"
    );

    let state = AppState::from_config(&config)?;

    let sweep_handle = config
        .sweep_interval()
        .map(|every| spawn_status_sweep(Arc::clone(&state.status_cache), every));

    let rendezvous = Arc::clone(&state.rendezvous);
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Server ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(rendezvous))
        .await?;

    if let Some(handle) = sweep_handle {
        handle.abort();
    }

    info!("Server stopped");
    Ok(())
}

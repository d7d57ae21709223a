//! Background tasks and shutdown wiring.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use fieldwake_core::{Rendezvous, StatusCache};

/// Periodically drop expired status entries. Expiry is already enforced on
/// read, so this only reclaims memory.
pub fn spawn_status_sweep(cache: Arc<StatusCache>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            let removed = cache.sweep();
            if removed > 0 {
                debug!(removed, remaining = cache.len(), "Status cache sweep completed");
            }
        }
    })
}

/// Resolve on Ctrl+C or SIGTERM, then release every parked long-poll so the
/// server's graceful shutdown does not wait out their timeouts.
pub async fn shutdown_signal(rendezvous: Arc<Rendezvous>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C shutdown signal"),
        () = terminate => info!("Received SIGTERM shutdown signal"),
    }

    let released = rendezvous.shutdown();
    info!(released, "Released pending waiters, draining connections");
}

// Unix signal handling for interactive sessions
// Resolves on SIGTERM or SIGINT so open chat sockets can close intentionally

use anyhow::Result;
use futures::StreamExt;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use tracing::{debug, info};

/// Create a future that resolves when a shutdown signal is received
pub fn create_shutdown_listener() -> Result<impl std::future::Future<Output = i32>> {
    let signals = Signals::new([SIGTERM, SIGINT])?;

    Ok(async move {
        let mut signals = signals;

        while let Some(signal) = signals.next().await {
            match signal {
                SIGTERM | SIGINT => {
                    info!(signal, "Shutdown signal received");
                    return signal;
                }
                _ => debug!(signal, "Ignoring unexpected signal"),
            }
        }

        SIGTERM
    })
}

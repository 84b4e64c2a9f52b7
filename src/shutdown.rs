//! Termination-signal handling for a running batch.

use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

/// Cancels `token` on the first SIGINT/SIGTERM (Ctrl+C elsewhere).
pub fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_signal() => {
                eprintln!("\nReceived termination signal, stopping downloads...");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    // Registration can fail in restricted environments.
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM"),
                _ = sigint.recv() => info!("Received SIGINT"),
            }
        }
        (Err(e), Ok(mut sigint)) => {
            warn!("Could not register SIGTERM handler ({}), waiting for SIGINT only", e);
            sigint.recv().await;
            info!("Received SIGINT");
        }
        (Ok(mut sigterm), Err(e)) => {
            warn!("Could not register SIGINT handler ({}), waiting for SIGTERM only", e);
            sigterm.recv().await;
            info!("Received SIGTERM");
        }
        (Err(e), Err(_)) => {
            error!("Could not register signal handlers ({}), using ctrl_c fallback", e);
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C"),
        Err(e) => {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}


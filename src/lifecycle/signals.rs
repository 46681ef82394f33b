//! OS signal handling.
//!
//! SIGINT (Ctrl-C) and SIGTERM both mean "shut down gracefully". On
//! non-Unix platforms only Ctrl-C is available.

use tokio::signal;

use crate::lifecycle::Shutdown;

/// Resolve on the first termination signal the process receives.
///
/// If a handler cannot be installed, that source is ignored and a warning is
/// logged; the other source still works.
pub async fn termination_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT"),
        () = terminate => tracing::info!("Received SIGTERM"),
    }
}

/// Trigger `shutdown` on the first termination signal, or return early if
/// something else triggers it first.
pub async fn forward_termination(shutdown: Shutdown) {
    let mut signal = shutdown.subscribe();
    tokio::select! {
        () = termination_signal() => shutdown.trigger(),
        () = signal.recv() => {}
    }
}

//! Lifecycle Supervisor (spec.md §5 "Graceful shutdown"): starts the Host,
//! the session sweep timer and the bridge's event-fanout task, then tears
//! all three down on Ctrl+C/SIGTERM with a hard deadline.
//!
//! Grounded on the teacher's `server::core` signal-handling pattern — spawn
//! a task awaiting `ctrl_c()`, spawn a `cfg(unix)` task awaiting
//! `SignalKind::terminate()`, both trigger the same shutdown path — and its
//! `server::shutdown::ShutdownHandle` wrapper.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use mcphost_bridge::session::SessionManager;
use mcphost_core::Host;
use tokio::task::JoinHandle;

/// Runs `serve` to completion, then tears down the Host, session sweep and
/// fanout task once either `serve` returns or a shutdown signal arrives —
/// whichever comes first — and force-exits if teardown exceeds
/// `shutdown_timeout`.
pub async fn run_until_shutdown<F>(
    host: Arc<Host>,
    sessions: Arc<SessionManager>,
    fanout_handle: JoinHandle<()>,
    shutdown_timeout: Duration,
    serve: F,
) where
    F: Future<Output = std::io::Result<()>>,
{
    let sweep_handle = mcphost_bridge::session::spawn_sweep(sessions.clone(), {
        let host = host.clone();
        move |request_id| {
            host.sampling_broker().complete(
                request_id,
                Err(mcphost_types::HostError::new(
                    mcphost_types::ErrorKind::InternalError,
                    "session expired",
                )),
            );
        }
    });

    tokio::select! {
        result = serve => {
            if let Err(err) = result {
                tracing::error!(error = %err, "HTTP server exited with an error");
            }
        }
        () = wait_for_shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    sweep_handle.abort();
    fanout_handle.abort();

    let teardown = async {
        host.stop().await;
    };
    if tokio::time::timeout(shutdown_timeout, teardown).await.is_err() {
        tracing::warn!(timeout_secs = shutdown_timeout.as_secs(), "graceful shutdown timed out, forcing exit");
        std::process::exit(1);
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

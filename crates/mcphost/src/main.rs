//! Standalone `mcphost` binary: wires configuration, the Host engine and
//! the HTTP/SSE/WS bridge into a runnable process, for local/manual testing
//! and as a reference embedder.
//!
//! Grounded on the teacher's `turbomcp-proxy` binary entry point: parse a
//! `clap`-derived CLI, delegate to an async run function, map errors to a
//! process exit code.

mod api;
mod config;
mod supervisor;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use mcphost_bridge::session::SessionManager;
use mcphost_bridge::{bridge, AuthConfig};
use mcphost_core::SamplingBroker;

use crate::api::HostHandle;
use crate::config::AppConfig;

/// Embeddable client host for the Model Context Protocol.
#[derive(Debug, Parser)]
#[command(name = "mcphost", version, about)]
struct Cli {
    /// Path to the host's JSON configuration file.
    #[arg(long, env = "MCPHOST_CONFIG", default_value = "mcphost.json")]
    config: PathBuf,

    /// Address to bind the HTTP/SSE/WS bridge to. Overrides the config
    /// file/environment-derived port when set.
    #[arg(long, env = "MCPHOST_BIND")]
    bind: Option<SocketAddr>,

    /// Increase log verbosity (`-v` = debug, `-vv` = trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("mcphost={default_level},mcphost_core={default_level},mcphost_bridge={default_level}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        tracing::error!(error = %err, "mcphost exited with an error");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let app_config = AppConfig::load(&cli.config);

    let sampling = Arc::new(SamplingBroker::with_timeout(Duration::from_millis(app_config.sampling_timeout_ms)));
    let handle = HostHandle::from_config(&app_config.host, sampling);
    handle.start().await;

    let sessions = SessionManager::new(Duration::from_millis(app_config.session_idle_ttl_ms));
    let auth = AuthConfig::new(app_config.api_keys.clone(), app_config.auth_required_override);
    let bridge_config = bridge::BridgeConfig { mcp_path: app_config.mcp_path.clone() };

    let (router, fanout_handle) =
        bridge::build_router(handle.inner().clone(), sessions.clone(), auth, bridge_config);

    let bind_addr = cli.bind.unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], app_config.port)));
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;

    tracing::info!(%bind_addr, mcp_path = %app_config.mcp_path, "mcphost listening");

    let serve = axum::serve(listener, router.into_make_service());
    supervisor::run_until_shutdown(
        handle.inner().clone(),
        sessions,
        fanout_handle,
        Duration::from_secs(10),
        async move { serve.await },
    )
    .await;

    Ok(())
}

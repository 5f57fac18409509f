//! Modax daemon - module activation and rebootless update engine.
//!
//! Runs the bootstrap activation pass, the full boot activation, then
//! serves queries and update submissions over a unix socket.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use modaxd::config::Config;
use modaxd::orchestrator::Engine;
use modaxd::rpc_server;
use modaxd::supervisor::ProcessSupervisor;

#[derive(Parser)]
#[command(name = "modaxd", version, about = "Module activation daemon")]
struct Args {
    /// Configuration file (default: /etc/modax/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Unix socket to serve on
    #[arg(long, default_value = modax_shared::SOCKET_PATH)]
    socket: PathBuf,

    /// Skip the early-boot bootstrap activation pass
    #[arg(long)]
    skip_bootstrap: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!("modaxd v{} starting", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load(),
    };

    let supervisor = Arc::new(ProcessSupervisor::new());
    let engine = Arc::new(Engine::new(config, supervisor)?);

    if !args.skip_bootstrap {
        engine.bootstrap().await?;
    }
    engine.boot().await?;

    info!("modaxd ready");
    rpc_server::start_server(engine, &args.socket).await
}

//! edge-scaffold service binary.
//!
//! Loads configuration, installs logging, builds the application and serves
//! until SIGINT/SIGTERM (or the SLT kill switch) triggers a graceful stop.

use std::path::PathBuf;

use clap::Parser;

use edge_scaffold::config;
use edge_scaffold::lifecycle::{forward_termination, App, Shutdown};
use edge_scaffold::observability::logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "edge-scaffold", version, about = "HTTP edge service")]
struct Args {
    /// Path to a TOML config file. Defaults and EDGE_* variables apply without one.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = config::load(args.config.as_deref())?;
    init_logging(&config.log)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        bind_host = %config.http_server.bind_host,
        port = config.http_server.port,
        "edge-scaffold starting"
    );

    let shutdown = Shutdown::new();
    let app = App::build(&config, shutdown.clone())?;

    tokio::spawn(forward_termination(shutdown));
    app.run().await?;

    Ok(())
}

//! dev-proxy
//!
//! Serves every locally running backend of a project behind one port.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌───────────────────────────────────────────────┐
//!                       │                  DEV PROXY                     │
//!   Client Request      │  ┌─────────┐   ┌────────────┐   ┌───────────┐ │
//!   ────────────────────┼─▶│   net   │──▶│    mux     │──▶│ forwarder │─┼──▶ Backend
//!                       │  │listener │   │ (prefixes) │   │ http / ws │ │    Service
//!   Client Response     │  └─────────┘   └────────────┘   └─────┬─────┘ │
//!   ◀───────────────────┼───────────────────────────────────────┘       │
//!                       │                                               │
//!                       │  config + watcher │ registry │ observability  │
//!                       │  lifecycle (state, shutdown hooks, context)   │
//!                       └───────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use dev_proxy::config::watcher::ConfigWatcher;
use dev_proxy::config::{load_config, ServerConfig};
use dev_proxy::observability::{logging, metrics};
use dev_proxy::ProxyServer;

#[derive(Parser)]
#[command(name = "dev-proxy")]
#[command(about = "Local reverse proxy for development services", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "dev-proxy.toml")]
    config: PathBuf,

    /// Listen port; overrides the file and skips the free-port probe
    #[arg(short, long)]
    port: Option<u16>,

    /// Keep the call log directory after exit
    #[arg(long)]
    save_logs: bool,

    /// Reload services when the configuration file changes
    #[arg(short, long)]
    watch: bool,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    tracing::info!("dev-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli.config)?;
    tracing::info!(
        path = ?cli.config,
        services = config.services.len(),
        "Configuration loaded"
    );

    if let Some(address) = &config.observability.metrics_address {
        match address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(metrics_address = %address, error = %e, "Failed to parse metrics address"),
        }
    }

    let context = CancellationToken::new();
    let mut server_config = ServerConfig::from_settings(&config.server).with_context(context.clone());
    if let Some(port) = cli.port {
        server_config = server_config.with_listen_port(port);
    }
    if cli.save_logs {
        server_config = server_config.with_save_logs(true);
    }

    let server = Arc::new(ProxyServer::new(server_config)?);
    for service in config.to_services() {
        server.add_service(service)?;
    }
    server.issue_all()?;

    println!("Proxy listening on port {}", server.listen_port());
    for endpoint in server.endpoints() {
        println!("  {}", endpoint);
    }
    println!("Call logs: {}", server.log_dir().display());

    let _watcher = if cli.watch {
        let (watcher, mut updates) = ConfigWatcher::new(&cli.config);
        let handle = watcher.run()?;
        let reloader = server.clone();
        tokio::spawn(async move {
            while let Some(config) = updates.recv().await {
                if let Err(e) = reloader.reload(config.to_services()) {
                    tracing::error!(error = %e, "Reload failed");
                }
            }
        });
        Some(handle)
    } else {
        None
    };

    let signal_server = server.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        tracing::info!("Shutdown signal received");
        signal_server.shutdown();
        context.cancel();
    });

    server.serve().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

//! Host process: application services behind the IPC server.

use anyhow::{Context, Result};
use bridge_core::{HostDispatcher, IpcServer, LaunchConfig};
use clap::Args;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
}

pub async fn run(args: ServeArgs) -> Result<()> {
    info!("Starting bridge host");

    let registry = bridge_services::registry()?;
    let stateful = registry.list_stateful();
    let dispatcher = Arc::new(HostDispatcher::with_memory_store(registry));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", args.host, args.port))?;
    let mut server = IpcServer::start_on(dispatcher, addr).await?;

    // Launch markers for the parent process (intentional stdout)
    println!("{}{}", LaunchConfig::PORT_PREFIX, server.port);
    println!("{}", LaunchConfig::READY_LINE);

    info!(
        "Bridge host running on {} ({} stateful services)",
        server.addr(),
        stateful.len()
    );

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");
    server.shutdown();

    Ok(())
}

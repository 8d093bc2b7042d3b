//! Bridge RPC - command-line host and satellite for the service bridge.
//!
//! `serve` runs the host: the application services behind the TCP IPC server.
//! `call` runs a one-shot satellite that forwards a single method call and
//! prints the result together with the mutations it replayed.

mod call;
mod serve;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "bridge-rpc")]
#[command(about = "Host and satellite front end for the service bridge")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the host process
    Serve(serve::ServeArgs),
    /// Forward one method call to a running host
    Call(call::CallArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the launch markers and call output
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match cli.command {
        Command::Serve(args) => serve::run(args).await,
        Command::Call(args) => call::run(args).await,
    }
}

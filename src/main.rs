mod cache;
mod cli;
mod config;
mod entities;
mod error;
mod resolver;
mod server;
mod sources;
mod tools;
mod util;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    init_tracing(args.verbose);

    match &args.command {
        cli::Commands::Serve { .. } => {
            let (settings, config) = args.server_launch()?;
            server::run(settings, config).await
        }
        _ => {
            let output = cli::run(args).await?;
            println!("{output}");
            Ok(())
        }
    }
}

/// Logs go to stderr so stdout stays clean for command output and the
/// stdio MCP transport.
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "otmcp_cli=debug,info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .init();
}

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod console;
mod options;
mod server;

use options::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout may be carrying the thumbnail.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config();

    match cli.command {
        Command::Server(_) => server::run(config).await,
        Command::Console(args) => console::run(args, config).await,
    }
}

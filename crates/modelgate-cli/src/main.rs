mod cli;
mod commands;
mod config;
mod output;
mod setup;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so --format json output stays parseable.
    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = config::CliConfig::load(cli.config.as_deref());

    match cli.command {
        Commands::Resolve(args) => commands::resolve::run(&config, args, cli.format),
        Commands::Health(args) => commands::health::run(&config, args, cli.format).await,
        Commands::Invoke(args) => commands::invoke::run(&config, args, cli.format).await,
        Commands::Compact(args) => commands::compact::run(&config, args, cli.format).await,
    }
}

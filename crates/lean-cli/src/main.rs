//! lean - prebuilt C/C++ package sync CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use lean_cli::cmd;
use lean_cli::{Cli, Commands, ConfigCommands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };

    match cli.command {
        Commands::Sync { selection } => cmd::sync::sync(&root, &selection, cli.quiet).await,
        Commands::Fetch {
            package,
            manifest,
            compiler,
        } => {
            cmd::fetch::fetch(&root, &package, manifest.as_deref(), compiler.as_deref(), cli.quiet)
                .await
        }
        Commands::Status { selection } => cmd::status::status(&root, &selection, cli.quiet).await,
        Commands::Remote { filter } => cmd::remote::remote(filter.as_deref(), cli.quiet).await,
        Commands::Config { command } => match command {
            ConfigCommands::Get { key } => cmd::config::get(&key),
            ConfigCommands::Set { key, value } => cmd::config::set(&key, &value),
            ConfigCommands::List => cmd::config::list(),
        },
    }
}

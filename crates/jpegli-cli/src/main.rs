//! CLI entry point for the sandboxed jpegli codec.
//!
//! This binary provides the `jpegli` command with subcommands for probing,
//! decoding and encoding JPEG files.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(if cli.verbose { "debug" } else { "info" });

    let config = commands::load_config(cli.config.as_deref(), cli.module.as_deref())?;
    let codec = commands::open_codec(config).await?;

    match cli.command {
        Commands::Info { input, json } => commands::cmd_info(codec, &input, json).await,
        Commands::Decode {
            input,
            output,
            opts,
        } => commands::cmd_decode(codec, &input, &output, opts.to_options()).await,
        Commands::Encode {
            input,
            output,
            opts,
        } => commands::cmd_encode(codec, &input, &output, opts.to_options()).await,
    }
}

/// Initialize the tracing subscriber with a sensible default filter.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

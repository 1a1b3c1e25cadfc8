// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! wardenctl - run and inspect warden node managers

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod commands;
mod error;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{node_id, release, run, status};
use std::path::PathBuf;

use crate::error::CliError;

#[derive(Parser)]
#[command(
    name = "wardenctl",
    version,
    about = "Warden - live/backup coordination for broker nodes"
)]
struct Cli {
    /// Configuration file
    #[arg(long, short, global = true, default_value = "warden.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a node manager until interrupted
    Run(run::RunArgs),
    /// Show the live lock record and this node's identity
    Status(status::StatusArgs),
    /// Print this node's identity, creating it if needed
    NodeId,
    /// Remove a lock record left behind by a dead holder
    Release(release::ReleaseArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_logging();

    if let Err(e) = dispatch(cli).await {
        match e.downcast_ref::<CliError>() {
            Some(cli_error) => eprint!("{}", cli_error),
            None => eprintln!("error: {:#}", e),
        }
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = commands::load_config(&cli.config)?;

    match cli.command {
        Commands::Run(args) => run::run(args, config).await,
        Commands::Status(args) => status::status(args, &config).await,
        Commands::NodeId => node_id::node_id(&config),
        Commands::Release(args) => release::release(args, &config).await,
    }
}

/// Logs go to stderr so stdout stays machine-readable
fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

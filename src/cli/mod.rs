//! CLI module for ailb
//!
//! Operator commands:
//! - `check`: validate a route file and print the resolved configuration
//! - `select`: run one selection against the live metric store

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod check;
pub mod select;

/// Metric-driven AI provider load balancer
#[derive(Parser, Debug)]
#[command(name = "ailb")]
#[command(about = "Metric-driven AI provider load balancer")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a route file and print the resolved configuration
    Check {
        /// Route file (TOML, JSON or YAML)
        route: PathBuf,
    },
    /// Run the header and body phases once against the metric store
    Select {
        /// Route file (TOML, JSON or YAML)
        route: PathBuf,
        /// JSON request body to run through the body phase
        #[arg(long)]
        body: Option<PathBuf>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Check { route }) => check::run(&route),
        Some(Commands::Select { route, body, json }) => {
            select::run(&route, body.as_deref(), json).await
        }
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}

//! # lbmirror
//!
//! Command-line front end for the load-balancer configuration mirror.
//!
//! - `lbmirror commit <FILE|->` mirrors one batch of records and pushes it
//! - `lbmirror config` prints the effective configuration (credential hidden)
//! - `lbmirror home` prints the configuration directory
//!
//! The configuration is read from `$(lbmirror home)/config.toml` unless
//! `--config` is given. Set `RUST_LOG=lbmirror=info` for step-by-step logs.

use anyhow::Result;
use clap::{Parser, Subcommand};
use lbmirror::{cmd_commit, cmd_config, init_logging, lbmirror_home};
use std::path::PathBuf;

/// Command-line interface definition.
#[derive(Parser, Debug)]
#[command(
    name = "lbmirror",
    version,
    about = "lbmirror - git-backed mirror for load-balancer configuration records",
    arg_required_else_help = true
)]
struct Cli {
    /// Path to config.toml (defaults to $(lbmirror home)/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Write a JSON batch of records into the mirror, commit and push
    Commit {
        /// Batch file, or `-` for stdin
        input: PathBuf,
    },
    /// Print the effective configuration with the credential redacted
    Config,
    /// Print the lbmirror configuration directory
    Home,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.cmd {
        Cmd::Commit { input } => cmd_commit(cli.config.as_deref(), &input),
        Cmd::Config => cmd_config(cli.config.as_deref()),
        Cmd::Home => {
            println!("{}", lbmirror_home()?.display());
            Ok(())
        }
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! mpathctl - inspect alias bindings and reconcile multipath maps
//!
//! Path discovery and table disassembly live outside this tool: the
//! `coalesce` command reads a JSON snapshot of discovered paths and the
//! currently active maps, then drives `dmsetup` to match it.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use multipath_engine::DEFAULT_CONFIG_FILE;
use multipath_types::PathGroupingPolicy;
use tracing_subscriber::{EnvFilter, fmt};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "mpathctl", version)]
#[command(about = "Manage multipath alias bindings and device-mapper maps")]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Bindings file, overriding the configured one
    #[arg(long, global = true)]
    bindings_file: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the alias bound to a wwid, allocating one if needed
    Alias { wwid: String },

    /// Print the wwid bound to an alias
    Wwid { alias: String },

    /// List every binding in the bindings file
    Bindings,

    /// Build multipath devices from a discovery snapshot and apply them
    Coalesce {
        /// JSON snapshot with `paths` and `maps`
        #[arg(long)]
        snapshot: PathBuf,

        /// Print the resulting maps without touching device-mapper
        #[arg(short = 'd', long)]
        dry_run: bool,

        /// Override the configured path grouping policy
        #[arg(short = 'p', long)]
        policy: Option<PathGroupingPolicy>,
    },
}

fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter(cli.verbose))),
        )
        .with_writer(std::io::stderr)
        .init();

    commands::run(cli)
}

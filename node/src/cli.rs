//! # CLI Interface
//!
//! Defines the command-line argument structure for `crowdvault` using
//! `clap` derive. Supports two subcommands: `simulate` and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::{LogFormat, DEFAULT_FILTER};

/// crowdvault escrow simulator.
///
/// Replays a JSON scenario against an in-memory ledger: creates vaults,
/// moves deposits and time, redeems shares, and prints the resulting
/// factory snapshot.
#[derive(Parser, Debug)]
#[command(
    name = "crowdvault",
    about = "crowdvault escrow simulator",
    version,
    propagate_version = true
)]
pub struct CrowdvaultCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a scenario file and print the final state as JSON.
    Simulate(SimulateArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `simulate` subcommand.
#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Path to the scenario file (JSON).
    #[arg(long, short = 's', env = "CROWDVAULT_SCENARIO")]
    pub scenario: PathBuf,

    /// Log output format.
    #[arg(long, value_enum, env = "CROWDVAULT_LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Default log filter when `RUST_LOG` is not set.
    #[arg(long, default_value = DEFAULT_FILTER)]
    pub log_level: String,

    /// Abort on the first failing step instead of recording it.
    #[arg(long)]
    pub strict: bool,

    /// Print Prometheus metrics to stderr after the run.
    #[arg(long)]
    pub metrics: bool,
}

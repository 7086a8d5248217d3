// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # crowdvault
//!
//! Entry point for the `crowdvault` binary. Parses CLI arguments,
//! initializes logging and metrics, and replays escrow scenarios against an
//! in-memory ledger.
//!
//! The binary supports two subcommands:
//!
//! - `simulate`: run a scenario file and print the resulting state
//! - `version`: print build version information

mod cli;
mod logging;
mod metrics;
mod scenario;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Commands, CrowdvaultCli, SimulateArgs};
use metrics::VaultMetrics;
use scenario::Scenario;

fn main() -> Result<()> {
    let cli = CrowdvaultCli::parse();

    match cli.command {
        Commands::Simulate(args) => simulate(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Loads a scenario, runs it, and prints the report as JSON on stdout.
fn simulate(args: SimulateArgs) -> Result<()> {
    logging::init_logging(&args.log_level, args.log_format);

    let raw = std::fs::read_to_string(&args.scenario)
        .with_context(|| format!("failed to read scenario {}", args.scenario.display()))?;
    let scenario: Scenario = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse scenario {}", args.scenario.display()))?;

    tracing::info!(
        scenario = %args.scenario.display(),
        strict = args.strict,
        "starting simulation"
    );

    let metrics = VaultMetrics::new().context("failed to create metrics registry")?;
    let report = scenario::run(scenario, &metrics, args.strict)?;

    let failed = report
        .steps
        .iter()
        .filter(|s| matches!(s.result, scenario::StepResult::Failed { .. }))
        .count();
    tracing::info!(
        steps = report.steps.len(),
        failed,
        vaults = report.vaults.len(),
        "simulation finished"
    );

    println!("{}", serde_json::to_string_pretty(&report)?);

    if args.metrics {
        eprint!("{}", metrics.encode()?);
    }
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("crowdvault {}", env!("CARGO_PKG_VERSION"));
    println!("rustc      {}", option_env!("RUSTC_VERSION").unwrap_or("unknown"));
}

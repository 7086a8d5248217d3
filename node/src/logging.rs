//! # Structured Logging
//!
//! Sets up the `tracing` subscriber for the `crowdvault` binary. Everything
//! goes to stderr; stdout is reserved for the JSON simulation report.
//!
//! Records are filtered per crate target:
//!
//! | target                 | what it emits                                             |
//! |------------------------|-----------------------------------------------------------|
//! | `crowdvault`           | run start/finish and per-step outcomes of a scenario      |
//! | `crowdvault_contracts` | `warn` for failed token legs, `info` for vault creation and every vault event, `debug` for pro-rata splits |
//! | `crowdvault_ledger`    | `debug` for every mint and applied transfer               |
//!
//! The filter comes from `RUST_LOG` when it is set and parses, otherwise from
//! `--log-level` ([`DEFAULT_FILTER`] unless overridden). For example
//! `RUST_LOG=crowdvault_contracts=warn` keeps only failed token legs from the
//! vaults, and `RUST_LOG=crowdvault_ledger=debug` traces every balance move.

use clap::ValueEnum;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor `--log-level` says otherwise.
pub const DEFAULT_FILTER: &str = "crowdvault=info,crowdvault_contracts=info,crowdvault_ledger=warn";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable, colored output.
    Pretty,
    /// JSON lines, one event per line.
    Json,
}

/// Picks the active filter: a parseable `env_override` wins, anything else
/// falls back to `default_level`.
fn resolve_filter(default_level: &str, env_override: Option<&str>) -> EnvFilter {
    env_override
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default_level))
}

/// Installs the global subscriber. Call once, before the scenario runs.
pub fn init_logging(default_level: &str, format: LogFormat) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let env_filter = resolve_filter(default_level, rust_log.as_deref());

    match format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr).with_target(true))
                .init();
        }
    }

    tracing::debug!(?format, from_env = rust_log.is_some(), "logging initialized");
}

#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs a Skirmish battle headless.

mod battle;
mod scenario;

use std::{path::PathBuf, time::Duration};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::{battle::Battle, scenario::Scenario};

/// Runs a skirmish between autonomous teams and prints the outcome.
#[derive(Debug, Parser)]
#[command(name = "skirmish", version)]
struct Cli {
    /// TOML scenario to run instead of the built-in battle.
    #[arg(long, value_name = "PATH")]
    scenario: Option<PathBuf>,
    /// Maximum number of ticks to simulate.
    #[arg(long, default_value_t = 1_200)]
    ticks: u32,
    /// Simulated milliseconds per tick.
    #[arg(long = "dt-ms", default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    dt_ms: u64,
    /// Seed for the strategist's randomness.
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Log filter directive, for example `debug` or `skirmish_system_tactics=trace`.
    #[arg(long, value_name = "FILTER")]
    log: Option<String>,
}

/// Entry point for the Skirmish command-line interface.
fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log.as_deref())?;

    let scenario = match &cli.scenario {
        Some(path) => Scenario::load(path)?,
        None => Scenario::built_in(),
    };
    let mut battle = Battle::new(&scenario, cli.seed);
    let report = battle.run(cli.ticks, Duration::from_millis(cli.dt_ms));
    print!("{report}");
    Ok(())
}

fn init_logging(directive: Option<&str>) -> Result<()> {
    let filter = match directive {
        Some(directive) => EnvFilter::try_new(directive)
            .with_context(|| format!("invalid log filter `{directive}`"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow!(error))
        .context("failed to install the log subscriber")
}

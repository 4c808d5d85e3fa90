//! Run an automatic calibration against a simulated module.
//!
//! Loads `config/autocal.toml` (or `--config`), builds a [`MockModule`] from the
//! `[simulation]` section and polls the sequencer until the run ends.
//!
//! ```text
//! RUST_LOG=debug autocal_sim --mode offset-and-volume --module-id 3
//! AUTOCAL_SIMULATION__REJECT_VOLUME_START=true autocal_sim --mode offset-and-volume
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rust_autocal::config::{AutoCalConfig, DEFAULT_CONFIG_PATH};
use rust_autocal::device::{ModuleId, MockModule};
use rust_autocal::runner::{run_to_completion, GatePolicy, RunnerOptions};
use rust_autocal::sequencer::{describe_phase, AutoCalSequencer, CalMode};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "autocal_sim", about = "Automatic calibration against a simulated module")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Module to calibrate (overrides the configuration)
    #[arg(long)]
    module_id: Option<ModuleId>,

    /// Calibration mode (overrides the configuration)
    #[arg(long, value_enum)]
    mode: Option<CalMode>,

    /// Abort at the operator gate instead of continuing
    #[arg(long)]
    abort_at_gate: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Validate once, after the command line has had its say
    let config = AutoCalConfig::extract_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?
        .with_overrides(cli.module_id, cli.mode, cli.abort_at_gate);
    config.validate()?;

    if cli.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    // Initialize tracing with RUST_LOG env var, falling back to the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.application.log_level)),
        )
        .init();

    info!(name = %config.application.name, "Starting calibration simulator");

    let module = MockModule::from_config(&config.simulation);
    let mut seq = AutoCalSequencer::with_device(module);
    seq.start_calibration(
        config.calibration.module_id,
        config.calibration.mode,
        config.calibration.params,
    )?;

    let options = RunnerOptions::from(&config.runner);
    if options.gate == GatePolicy::Abort {
        info!("Operator gate will be answered with abort");
    }
    let report = run_to_completion(&mut seq, &options).await?;

    println!("\n=== Calibration finished ===");
    println!("Polls:      {}", report.polls);
    println!("Outcome:    {:?}", report.outcome);
    println!(
        "Last error: {}",
        describe_phase(u8::try_from(report.last_error).unwrap_or(u8::MAX))
    );
    println!("Alarm:      {}", report.alarm);

    if report.outcome.is_some_and(|outcome| outcome.is_success()) {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

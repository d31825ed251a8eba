//! PF SIM: A command line driver for the landmark particle filter.
//!
//! This program runs the particle filter over either a recorded dataset directory or a synthetic drive and
//! writes the per-step estimates, errors and association diagnostics to CSV.
//!
//! Filter parameters come from a configuration file (TOML/JSON/YAML) given with `--config`, or from the
//! defaults. The particle count, seed and parallelism can be overridden on the command line.

mod common;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use common::{init_logger, validate_dataset_dir, validate_output_path};
use log::{LevelFilter, info};

use localization::config::FilterConfig;
use localization::sim::{Dataset, LocalizationResult, Scenario, run_localization};

const LONG_ABOUT: &str = "PF SIM: A command line driver for the landmark particle filter.

The filter localizes a vehicle against a known map of point landmarks using a velocity/yaw-rate motion
model and noisy vehicle-frame landmark observations.

- run: Load a dataset directory (map.csv, controls.csv, ground_truth.csv and
  observations/observations_NNNNNN.csv) and run the filter over it.
- synthetic: Generate a drive through a landmark grid from a seed and run the filter over it.
- config: Write a template filter configuration file.

Filter parameters are read from --config (TOML/JSON/YAML) when given, otherwise defaults are used.";

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about = "A command line driver for the landmark particle filter.", long_about = LONG_ABOUT)]
struct Cli {
    /// Filter configuration file (TOML/JSON/YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,

    /// Log level (off, error, warn, info, debug, trace); RUST_LOG refines it per module
    #[arg(long, default_value = "info", global = true)]
    log_level: LevelFilter,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Clone, Debug)]
enum Command {
    #[command(
        name = "run",
        about = "Run the filter over a dataset directory",
        long_about = "Run the particle filter over a recorded dataset. The filter is initialized around a noisy estimate of the first ground-truth pose (drawn with the configured position_std) and then predicts with each control, weighs against each step's observations and resamples."
    )]
    Run(RunArgs),
    #[command(
        name = "synthetic",
        about = "Run the filter over a generated drive",
        long_about = "Generate a constant-control drive through a landmark grid with noisy observations of every landmark within sensor range, then run the particle filter over it."
    )]
    Synthetic(SyntheticArgs),
    #[command(name = "config", about = "Write a template filter configuration file")]
    Config(CreateConfigArgs),
}

/// Command line overrides applied on top of the configuration file
#[derive(Args, Clone, Debug, Default)]
struct FilterOverrides {
    /// Number of particles
    #[arg(short = 'n', long)]
    num_particles: Option<usize>,
    /// Seed for the filter's random number generator
    #[arg(long)]
    seed: Option<u64>,
    /// Run the per-particle loops on the rayon thread pool
    #[arg(long)]
    parallel: bool,
}

impl FilterOverrides {
    fn apply(&self, config: &mut FilterConfig) {
        if let Some(n) = self.num_particles {
            config.num_particles = n;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if self.parallel {
            config.parallel = true;
        }
    }
}

#[derive(Args, Clone, Debug)]
struct RunArgs {
    /// Dataset directory
    #[arg(short, long)]
    input: PathBuf,
    /// Output CSV file for the per-step results
    #[arg(short, long, default_value = "localization.csv")]
    output: PathBuf,
    #[command(flatten)]
    overrides: FilterOverrides,
}

#[derive(Args, Clone, Debug)]
struct SyntheticArgs {
    /// Number of timesteps to generate
    #[arg(long, default_value_t = 200)]
    steps: usize,
    /// Seed for the generated observation noise
    #[arg(long, default_value_t = 0)]
    scenario_seed: u64,
    /// Output CSV file for the per-step results
    #[arg(short, long, default_value = "localization.csv")]
    output: PathBuf,
    /// Also write the generated dataset to this directory
    #[arg(long)]
    save_dataset: Option<PathBuf>,
    #[command(flatten)]
    overrides: FilterOverrides,
}

#[derive(Args, Clone, Debug)]
struct CreateConfigArgs {
    /// Output configuration file; the extension selects the format
    #[arg(short, long, default_value = "pf_config.toml")]
    output: PathBuf,
}

fn load_config(path: Option<&PathBuf>, overrides: &FilterOverrides) -> Result<FilterConfig> {
    let mut config = match path {
        Some(path) => FilterConfig::from_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => FilterConfig::default(),
    };
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn localize_and_write(dataset: &Dataset, config: &FilterConfig, output: &Path) -> Result<()> {
    info!(
        "Running {} particles over {} steps (seed {:?}, parallel: {})",
        config.num_particles,
        dataset.steps(),
        config.seed,
        config.parallel
    );
    let result: LocalizationResult = run_localization(dataset, config)?;
    validate_output_path(output)?;
    result
        .to_csv(output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    if let Some([x, y, theta]) = result.mean_error() {
        info!(
            "Mean absolute error: x {:.3} m, y {:.3} m, heading {:.4} rad",
            x, y, theta
        );
    }
    info!("Results written to {}", output.display());
    Ok(())
}

fn run_dataset(args: &RunArgs, config_path: Option<&PathBuf>) -> Result<()> {
    validate_dataset_dir(&args.input)?;
    let config = load_config(config_path, &args.overrides)?;
    let dataset = Dataset::from_dir(&args.input)
        .with_context(|| format!("failed to load dataset {}", args.input.display()))?;
    localize_and_write(&dataset, &config, &args.output)
}

fn run_synthetic(args: &SyntheticArgs, config_path: Option<&PathBuf>) -> Result<()> {
    let config = load_config(config_path, &args.overrides)?;
    let scenario = Scenario {
        steps: args.steps,
        delta_t: config.delta_t,
        sensor_range: config.sensor_range,
        observation_std: config.landmark_std,
        ..Scenario::default()
    };
    let dataset = scenario.generate(args.scenario_seed)?;
    if let Some(dir) = &args.save_dataset {
        dataset
            .to_dir(dir)
            .with_context(|| format!("failed to write dataset to {}", dir.display()))?;
        info!("Generated dataset written to {}", dir.display());
    }
    localize_and_write(&dataset, &config, &args.output)
}

fn create_config_file(args: &CreateConfigArgs) -> Result<()> {
    validate_output_path(&args.output)?;
    FilterConfig::default()
        .to_file(&args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    info!("Template configuration written to {}", args.output.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.log_level, cli.log_file.as_deref())?;

    match &cli.command {
        Command::Run(args) => {
            info!("Running dataset {}", args.input.display());
            run_dataset(args, cli.config.as_ref())
        }
        Command::Synthetic(args) => run_synthetic(args, cli.config.as_ref()),
        Command::Config(args) => create_config_file(args),
    }
}

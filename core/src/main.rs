//! ASLAM: run the FastSLAM particle filter against synthetic scenarios.
//!
//! - `aslam config --output scenario.yaml` writes a template scenario (JSON, YAML or TOML by extension).
//! - `aslam sim --config scenario.yaml --output estimates.csv` runs the scenario and writes one CSV row
//!   per step and landmark.
use aslam::config::{ConfigFile, LogLevel, ScenarioConfig};
use aslam::sim::{simulate, write_csv};

use clap::{Parser, Subcommand};
use log::{LevelFilter, info};
use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};

const LONG_ABOUT: &str = "ASLAM: a FastSLAM-style particle filter for vehicle pose and landmark estimation.

Every particle carries a vehicle pose hypothesis and one Kalman filter per landmark. Relative
heading/pitch/range observations refine the landmark filters and re-weight the particles; systematic
resampling concentrates the population on the hypotheses that explain the observations best.

Scenarios are loaded from configuration files (TOML/JSON/YAML). Use the `config` subcommand to
write a template.";

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about = "A FastSLAM particle filter for vehicle pose and landmark estimation.", long_about = LONG_ABOUT)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (off, error, warn, info, debug, trace); overrides the scenario's logging section
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

/// Top-level commands
#[derive(Subcommand, Clone)]
enum Command {
    #[command(
        name = "sim",
        about = "Run a simulation scenario",
        long_about = "Run the particle filter against a synthetic scenario loaded from a configuration file and write the per-step estimates to CSV."
    )]
    Sim {
        /// Scenario configuration file (TOML/JSON/YAML)
        #[arg(short, long)]
        config: PathBuf,
        /// Output CSV file
        #[arg(short, long)]
        output: PathBuf,
        /// Override the number of simulation steps
        #[arg(long)]
        steps: Option<usize>,
        /// Override the number of particles
        #[arg(long)]
        particles: Option<usize>,
        /// Override the random seed
        #[arg(long)]
        seed: Option<u64>,
    },
    #[command(
        name = "config",
        about = "Write a template scenario configuration",
        long_about = "Write the default scenario configuration to a file. The format is chosen from the file extension (.json, .yaml/.yml, .toml)."
    )]
    Config {
        /// Output configuration file
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Pick the log level: the `--log-level` flag when given, the scenario's logging section otherwise.
fn resolve_level(flag: Option<&str>, configured: LogLevel) -> Result<LevelFilter, String> {
    match flag {
        Some(name) => name
            .parse::<LevelFilter>()
            .map_err(|_| format!("invalid log level '{name}'")),
        None => Ok(configured.into()),
    }
}

/// Install the global logger, appending to `log_file` when given and writing to stderr otherwise.
///
/// `ASLAM_LOG` accepts `env_logger` directives (for example `aslam::map=trace`) on top of `level`.
fn init_logger(level: LevelFilter, log_file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(level)
        .parse_env(env_logger::Env::new().filter("ASLAM_LOG"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}: {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        });

    if let Some(path) = log_file {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.try_init()?;
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Sim {
            config,
            output,
            steps,
            particles,
            seed,
        } => {
            let mut scenario = ScenarioConfig::from_file(&config)?;
            let level = resolve_level(cli.log_level.as_deref(), scenario.logging.level)?;
            let log_file = cli
                .log_file
                .or_else(|| scenario.logging.file.as_ref().map(PathBuf::from));
            init_logger(level, log_file.as_deref())?;
            info!("loaded scenario from {}", config.display());

            if let Some(steps) = steps {
                scenario.steps = steps;
            }
            if let Some(particles) = particles {
                scenario.map.num_particles = particles;
            }
            if seed.is_some() {
                scenario.map.seed = seed;
            }
            let records = simulate(&scenario)?;
            write_csv(&output, &records)?;
            info!("wrote {} records to {}", records.len(), output.display());
        }
        Command::Config { output } => {
            let level = resolve_level(cli.log_level.as_deref(), LogLevel::default())?;
            init_logger(level, cli.log_file.as_deref())?;
            ScenarioConfig::default().to_file(&output)?;
            info!("wrote template scenario to {}", output.display());
        }
    }
    Ok(())
}

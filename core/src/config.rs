//! Configuration structures for the particle map and for simulation scenarios.
//!
//! All configuration types are serde-derived and can be read from or written to JSON, YAML or TOML
//! through the [ConfigFile] trait. The generic [ConfigFile::to_file] / [ConfigFile::from_file]
//! helpers select the format from the file extension.
//!
//! ## Example
//!
//! ```no_run
//! use aslam::config::{ConfigFile, ScenarioConfig};
//!
//! let scenario = ScenarioConfig::default();
//! scenario.to_file("scenario.yaml").unwrap();
//! let back = ScenarioConfig::from_file("scenario.yaml").unwrap();
//! assert_eq!(back.steps, scenario.steps);
//! ```
use crate::error::{AslamError, Result};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// File helpers shared by every configuration type.
pub trait ConfigFile: Serialize + DeserializeOwned {
    /// Write the configuration as pretty-printed JSON.
    fn to_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
    /// Read the configuration from a JSON file.
    fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }
    /// Write the configuration as YAML.
    fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = File::create(path)?;
        let s = serde_yaml::to_string(self)?;
        file.write_all(s.as_bytes())?;
        Ok(())
    }
    /// Read the configuration from YAML.
    fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_yaml::from_reader(file)?)
    }
    /// Write the configuration as TOML.
    fn to_toml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = File::create(path)?;
        let s = toml::to_string(self)?;
        file.write_all(s.as_bytes())?;
        Ok(())
    }
    /// Read the configuration from TOML.
    fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut s = String::new();
        let mut file = File::open(path)?;
        file.read_to_string(&mut s)?;
        Ok(toml::from_str(&s)?)
    }
    /// Generic write: choose format by file extension (.json/.yaml/.yml/.toml)
    fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => self.to_json(p),
            Some("yaml") | Some("yml") => self.to_yaml(p),
            Some("toml") => self.to_toml(p),
            _ => Err(unsupported_extension(p)),
        }
    }
    /// Generic read: choose format by file extension (.json/.yaml/.yml/.toml)
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => Self::from_json(p),
            Some("yaml") | Some("yml") => Self::from_yaml(p),
            Some("toml") => Self::from_toml(p),
            _ => Err(unsupported_extension(p)),
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

fn unsupported_extension(path: &Path) -> AslamError {
    AslamError::Config(format!(
        "unsupported file extension for '{}' (expected json, yaml, yml or toml)",
        path.display()
    ))
}

/// Prior for one landmark.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LandmarkConfig {
    pub name: String,
    /// Initial position guess `[north, east, depth]` in meters
    pub initial_position: [f64; 3],
    /// Initial position covariance (row-major)
    pub initial_covariance: [[f64; 3]; 3],
    /// Extra names resolving to this landmark (e.g. the two faces of a gate)
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Particle map construction parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapConfig {
    /// Initial pose `[north, east, depth, heading, pitch, roll]` (meters, radians)
    pub initial_pose: [f64; 6],
    /// Control covariance per unit time (row-major)
    pub control_covariance: [[f64; 6]; 6],
    pub num_particles: usize,
    /// Random seed; `None` seeds from the operating system
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub landmarks: Vec<LandmarkConfig>,
}
impl Default for MapConfig {
    fn default() -> Self {
        let mut control_covariance = [[0.0; 6]; 6];
        for (i, variance) in [1e-2, 1e-2, 1e-3, 1e-5, 1e-6, 1e-6].into_iter().enumerate() {
            control_covariance[i][i] = variance;
        }
        MapConfig {
            initial_pose: [0.0; 6],
            control_covariance,
            num_particles: 100,
            seed: Some(42),
            landmarks: vec![
                LandmarkConfig {
                    name: "buoy".to_string(),
                    initial_position: [18.0, 6.0, 2.0],
                    initial_covariance: diagonal3(25.0),
                    aliases: Vec::new(),
                },
                LandmarkConfig {
                    name: "gate".to_string(),
                    initial_position: [32.0, -4.0, 3.0],
                    initial_covariance: diagonal3(25.0),
                    aliases: vec!["gate_in".to_string(), "gate_out".to_string()],
                },
            ],
        }
    }
}
impl ConfigFile for MapConfig {}

fn diagonal3(value: f64) -> [[f64; 3]; 3] {
    [[value, 0.0, 0.0], [0.0, value, 0.0], [0.0, 0.0, value]]
}

/// Logging verbosity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}
impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
    /// Optional log file; logs go to stderr when absent
    #[serde(default)]
    pub file: Option<String>,
}

/// Ground-truth landmark position used by the simulator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TruthLandmark {
    /// Registered name (or alias) of the landmark in the map
    pub name: String,
    pub position: [f64; 3],
}

/// Synthetic scenario: a vehicle moving with constant body rates past a set of landmarks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub map: MapConfig,
    pub truth: Vec<TruthLandmark>,
    /// Constant body rates `[forward, starboard, down, heading, pitch, roll]` per second
    pub rate: [f64; 6],
    /// Control period in seconds
    pub dt: f64,
    pub steps: usize,
    /// Standard deviation of the simulated `[heading, pitch, range]` readings (radians, meters)
    pub observation_noise_std: [f64; 3],
    #[serde(default)]
    pub logging: LoggingConfig,
}
impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            map: MapConfig::default(),
            truth: vec![
                TruthLandmark {
                    name: "buoy".to_string(),
                    position: [20.0, 5.0, 2.0],
                },
                TruthLandmark {
                    name: "gate".to_string(),
                    position: [30.0, -5.0, 3.0],
                },
            ],
            rate: [1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            dt: 0.1,
            steps: 150,
            observation_noise_std: [0.5_f64.to_radians(), 0.5_f64.to_radians(), 0.1],
            logging: LoggingConfig::default(),
        }
    }
}
impl ConfigFile for ScenarioConfig {}

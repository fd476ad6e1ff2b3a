//! Simulation utilities for running the filter against synthetic ground truth.
//!
//! This module provides:
//! - [simulate]: drive a [CycleRunner] with a vehicle moving at constant body rates past a set of
//!   truth landmarks, with Gaussian noise on every heading/pitch/range reading
//! - [EstimateRecord]: one CSV row per step and landmark, with the estimate and its error to truth
//! - [write_csv] / [read_csv]: CSV export and import of simulation results
use crate::config::ScenarioConfig;
use crate::cycle::{CycleRunner, SensorReading, VehicleState};
use crate::error::{AslamError, Result};
use crate::map::ParticleMap;
use crate::observation::{HeadingPitchRange, ObservationModel};
use crate::{Pose, wrap_to_pi};

use nalgebra::Vector3;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use std::path::Path;

/// One row of simulation output: the aggregated estimate of one landmark at one step.
///
/// Attitude is reported in degrees for readability; everything else is meters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimateRecord {
    pub step: usize,
    /// Simulation time in seconds
    pub time: f64,
    pub north: f64,
    pub east: f64,
    pub depth: f64,
    pub heading: f64,
    pub pitch: f64,
    pub roll: f64,
    pub landmark: String,
    pub landmark_north: f64,
    pub landmark_east: f64,
    pub landmark_depth: f64,
    pub variance_north: f64,
    pub variance_east: f64,
    pub variance_depth: f64,
    /// Euclidean distance between the landmark estimate and its true position
    pub landmark_error: f64,
    /// Horizontal distance between the pose estimate and the true vehicle position
    pub pose_error: f64,
}

/// Advance a pose by body rates over `dt` with the same kinematics the filter uses.
fn advance(pose: &mut Pose, rate: &[f64; 6], dt: f64) {
    pose.heading = wrap_to_pi(pose.heading + rate[3] * dt);
    pose.pitch += rate[4] * dt;
    pose.roll += rate[5] * dt;
    let (sin_h, cos_h) = pose.heading.sin_cos();
    let (forward, lateral) = (rate[0] * dt, rate[1] * dt);
    pose.north += forward * cos_h - lateral * sin_h;
    pose.east += forward * sin_h + lateral * cos_h;
    pose.depth += rate[2] * dt;
}

fn noise(std: f64) -> Result<Normal<f64>> {
    if !(std.is_finite() && std >= 0.0) {
        return Err(AslamError::Config(format!(
            "observation noise std must be finite and non-negative, got {std}"
        )));
    }
    Normal::new(0.0, std)
        .map_err(|e| AslamError::Config(format!("invalid observation noise std {std}: {e}")))
}

/// Run a synthetic scenario end to end.
///
/// The truth vehicle starts at the map's initial pose and moves with `scenario.rate`. At every step
/// the navigation state handed to the filter is the true pose, and each truth landmark yields one
/// heading/pitch/range reading perturbed by `scenario.observation_noise_std`.
///
/// # Returns
/// `steps × truth.len()` records in step order.
///
/// # Errors
/// Map construction errors, [AslamError::UnknownLandmark] if a truth landmark is not registered in
/// the map, and [AslamError::Config] for invalid noise parameters.
pub fn simulate(scenario: &ScenarioConfig) -> Result<Vec<EstimateRecord>> {
    let map = ParticleMap::from_config(&scenario.map)?;
    let mut runner = CycleRunner::new(map);
    let mut rng = match scenario.map.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
        None => StdRng::from_os_rng(),
    };
    let [heading_std, pitch_std, range_std] = scenario.observation_noise_std;
    let (heading_noise, pitch_noise, range_noise) =
        (noise(heading_std)?, noise(pitch_std)?, noise(range_std)?);
    let model = HeadingPitchRange::new();

    log::info!(
        "simulating {} steps of {} s with {} particles and {} truth landmarks",
        scenario.steps,
        scenario.dt,
        scenario.map.num_particles,
        scenario.truth.len()
    );
    let mut truth_pose = Pose::from(scenario.map.initial_pose);
    let mut records = Vec::with_capacity(scenario.steps * scenario.truth.len());
    for step in 0..scenario.steps {
        if step > 0 {
            advance(&mut truth_pose, &scenario.rate, scenario.dt);
        }
        let state = VehicleState {
            north: truth_pose.north,
            east: truth_pose.east,
            depth: truth_pose.depth,
            heading: truth_pose.heading.to_degrees(),
            pitch: truth_pose.pitch.to_degrees(),
            roll: truth_pose.roll.to_degrees(),
        };
        let readings: Vec<SensorReading> = scenario
            .truth
            .iter()
            .map(|truth| {
                let z = model.predict(&truth_pose, &Vector3::from(truth.position));
                SensorReading {
                    landmark: truth.name.clone(),
                    heading: wrap_to_pi(z[0] + heading_noise.sample(&mut rng)),
                    pitch: z[1] + pitch_noise.sample(&mut rng),
                    range: z[2] + range_noise.sample(&mut rng),
                    heading_variance: heading_std.powi(2),
                    pitch_variance: pitch_std.powi(2),
                    range_variance: range_std.powi(2),
                    offset: [0.0; 3],
                }
            })
            .collect();
        let estimate = runner.step(&state, &readings, scenario.dt)?;

        let pose_error = (estimate.pose.position() - truth_pose.position())
            .xy()
            .norm();
        for truth in &scenario.truth {
            let landmark = estimate.landmarks.get(&truth.name).ok_or_else(|| {
                AslamError::UnknownLandmark(truth.name.clone())
            })?;
            records.push(EstimateRecord {
                step,
                time: step as f64 * scenario.dt,
                north: estimate.pose.north,
                east: estimate.pose.east,
                depth: estimate.pose.depth,
                heading: estimate.pose.heading.to_degrees(),
                pitch: estimate.pose.pitch.to_degrees(),
                roll: estimate.pose.roll.to_degrees(),
                landmark: truth.name.clone(),
                landmark_north: landmark.mean[0],
                landmark_east: landmark.mean[1],
                landmark_depth: landmark.mean[2],
                variance_north: landmark.variance[0],
                variance_east: landmark.variance[1],
                variance_depth: landmark.variance[2],
                landmark_error: (landmark.mean - Vector3::from(truth.position)).norm(),
                pose_error,
            });
        }
    }
    for record in records.iter().rev().take(scenario.truth.len()) {
        log::info!(
            "final estimate of '{}': [{:.3}, {:.3}, {:.3}], error {:.3} m",
            record.landmark,
            record.landmark_north,
            record.landmark_east,
            record.landmark_depth,
            record.landmark_error
        );
    }
    Ok(records)
}

/// Write simulation records to a CSV file with a header row.
pub fn write_csv<P: AsRef<Path>>(path: P, records: &[EstimateRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read simulation records back from a CSV file written by [write_csv].
pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Vec<EstimateRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for result in reader.deserialize() {
        let record: EstimateRecord = result?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TruthLandmark;
    use assert_approx_eq::assert_approx_eq;

    fn quiet_scenario() -> ScenarioConfig {
        let mut scenario = ScenarioConfig::default();
        scenario.map.control_covariance = [[0.0; 6]; 6];
        scenario.map.num_particles = 10;
        scenario.observation_noise_std = [1e-4, 1e-4, 1e-3];
        scenario.steps = 60;
        scenario
    }

    #[test]
    fn advance_matches_vehicle_frame_kinematics() {
        let mut pose = Pose::default();
        advance(&mut pose, &[1.0, 0.0, 0.5, std::f64::consts::FRAC_PI_2, 0.0, 0.0], 1.0);
        assert_approx_eq!(pose.north, 0.0, 1e-12);
        assert_approx_eq!(pose.east, 1.0, 1e-12);
        assert_approx_eq!(pose.depth, 0.5, 1e-12);
    }

    #[test]
    fn simulate_produces_one_record_per_step_and_landmark() {
        let scenario = quiet_scenario();
        let records = simulate(&scenario).unwrap();
        assert_eq!(records.len(), scenario.steps * scenario.truth.len());
        assert_eq!(records[0].step, 0);
        assert_eq!(records[1].landmark, "gate");
        let last = records.last().unwrap();
        assert_approx_eq!(last.time, (scenario.steps - 1) as f64 * scenario.dt, 1e-12);
    }

    #[test]
    fn simulate_converges_with_low_noise() {
        let records = simulate(&quiet_scenario()).unwrap();
        let first = &records[0];
        let last = records.iter().rev().find(|r| r.landmark == "buoy").unwrap();
        assert!(last.landmark_error < 0.1, "buoy error {}", last.landmark_error);
        assert!(last.variance_north < first.variance_north);
        assert_approx_eq!(last.pose_error, 0.0, 1e-9);
    }

    #[test]
    fn simulate_default_scenario_beats_prior() {
        let scenario = ScenarioConfig::default();
        let records = simulate(&scenario).unwrap();
        let n = scenario.truth.len();
        for (truth, last) in scenario.truth.iter().zip(&records[records.len() - n..]) {
            let prior = scenario
                .map
                .landmarks
                .iter()
                .find(|l| l.name == truth.name)
                .unwrap();
            let prior_error =
                (Vector3::from(prior.initial_position) - Vector3::from(truth.position)).norm();
            assert_eq!(truth.name, last.landmark);
            assert!(
                last.landmark_error < prior_error,
                "{}: prior {} final {}",
                last.landmark,
                prior_error,
                last.landmark_error
            );
        }
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let mut scenario = ScenarioConfig::default();
        scenario.steps = 20;
        assert_eq!(simulate(&scenario).unwrap(), simulate(&scenario).unwrap());
    }

    #[test]
    fn unregistered_truth_landmark_fails() {
        let mut scenario = quiet_scenario();
        scenario.truth.push(TruthLandmark {
            name: "rock".to_string(),
            position: [5.0, 5.0, 5.0],
        });
        assert!(matches!(
            simulate(&scenario),
            Err(AslamError::UnknownLandmark(_))
        ));
    }

    #[test]
    fn negative_noise_is_config_error() {
        let mut scenario = quiet_scenario();
        scenario.observation_noise_std[2] = -1.0;
        assert!(matches!(simulate(&scenario), Err(AslamError::Config(_))));
    }

    #[test]
    fn csv_round_trip() {
        let mut scenario = quiet_scenario();
        scenario.steps = 3;
        let records = simulate(&scenario).unwrap();
        let path = std::env::temp_dir().join(format!("aslam_sim_{}.csv", std::process::id()));
        write_csv(&path, &records).unwrap();
        let back = read_csv(&path).unwrap();
        assert_eq!(back.len(), records.len());
        assert_eq!(back[0].landmark, records[0].landmark);
        assert_approx_eq!(back[5].landmark_north, records[5].landmark_north, 1e-9);
        let _ = std::fs::remove_file(&path);
    }
}

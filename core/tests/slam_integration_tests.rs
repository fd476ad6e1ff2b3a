//! End-to-end tests of the particle filter cycle.
//!
//! These tests drive [ParticleMap] and [CycleRunner] through full propagate / observe / resample /
//! predict cycles and check the properties that must hold regardless of the random draws:
//! - weights are uniform and the population size is fixed after every resample
//! - every landmark covariance stays symmetric positive semi-definite
//! - repeated consistent observations converge the aggregated landmark estimate
//! - heading wraps cleanly across the ±180° boundary
//!
//! The convergence bounds are regression checks derived from running the filter, not theoretical
//! guarantees.
use aslam::config::{ConfigFile, LandmarkConfig, MapConfig, ScenarioConfig};
use aslam::cycle::{CycleRunner, SensorReading, VehicleState};
use aslam::linalg::is_positive_semidefinite;
use aslam::sim::simulate;
use aslam::{
    AslamError, HeadingPitchRange, ObservationModel, ParticleMap, Pose, ResampleOutcome,
    heading_difference,
};

use assert_approx_eq::assert_approx_eq;
use nalgebra::{Matrix3, Matrix6, Vector3, Vector6};

fn control_covariance() -> Matrix6<f64> {
    Matrix6::from_diagonal(&Vector6::new(1e-2, 1e-2, 1e-3, 1e-5, 1e-6, 1e-6))
}

#[test]
fn test_convergence_from_origin() {
    let mut map = ParticleMap::with_seed(Pose::default(), control_covariance(), 50, 11).unwrap();
    let idx = map
        .register_landmark("target", Vector3::new(10.0, 0.0, 0.0), Matrix3::identity() * 100.0)
        .unwrap();
    let prior_variance = map.predict().landmarks["target"].variance;
    let z = Vector3::new(0.0, 0.0, 10.0);
    let r = Matrix3::identity() * 0.01;
    for _ in 0..50 {
        map.observe_hpr(idx, &z, &r).unwrap();
        map.resample();
    }
    let estimate = map.predict();
    let target = estimate.landmarks["target"];
    assert!((target.mean - Vector3::new(10.0, 0.0, 0.0)).norm() < 0.5);
    for axis in 0..3 {
        assert!(target.variance[axis] < prior_variance[axis]);
    }
}

#[test]
fn test_convergence_from_offset_prior() {
    let mut map = ParticleMap::with_seed(Pose::default(), Matrix6::zeros(), 30, 3).unwrap();
    let idx = map
        .register_landmark("target", Vector3::new(8.0, 2.0, 1.0), Matrix3::identity() * 100.0)
        .unwrap();
    let z = Vector3::new(0.0, 0.0, 10.0);
    let r = Matrix3::identity() * 0.01;
    for _ in 0..50 {
        map.observe_hpr(idx, &z, &r).unwrap();
        map.resample();
    }
    let target = map.predict().landmarks["target"];
    assert!(
        (target.mean - Vector3::new(10.0, 0.0, 0.0)).norm() < 0.5,
        "estimate {:?}",
        target.mean
    );
    assert!(target.variance.iter().all(|v| *v < 100.0));
}

#[test]
fn test_full_cycles_keep_invariants() {
    let truth = Vector3::new(15.0, 4.0, 2.0);
    let mut truth_pose = Pose::default();
    let mut map = ParticleMap::with_seed(truth_pose, control_covariance(), 40, 8).unwrap();
    let idx = map
        .register_landmark("buoy", Vector3::new(13.0, 5.0, 1.0), Matrix3::identity() * 16.0)
        .unwrap();
    let model = HeadingPitchRange::new();
    let r = Matrix3::from_diagonal(&Vector3::new(1e-4, 1e-4, 1e-2));
    let rate = Vector6::new(1.0, 0.0, 0.0, 0.05, 0.0, 0.0);
    let dt = 0.1;
    for _ in 0..100 {
        map.propagate(&rate, dt).unwrap();
        truth_pose.heading += rate[3] * dt;
        let (sin_h, cos_h) = truth_pose.heading.sin_cos();
        truth_pose.north += rate[0] * dt * cos_h;
        truth_pose.east += rate[0] * dt * sin_h;

        let z = model.predict(&truth_pose, &truth);
        map.observe(idx, &model, &z, &r).unwrap();
        for p in map.particles() {
            assert!(is_positive_semidefinite(&p.landmarks[idx].covariance, 1e-9));
            assert!(p.weight.is_finite() && p.weight > 0.0);
        }
        assert_eq!(map.resample(), ResampleOutcome::Resampled);
        assert_eq!(map.particle_count(), 40);
        for p in map.particles() {
            assert_approx_eq!(p.weight, 1.0 / 40.0, 1e-15);
        }
    }
    let estimate = map.predict();
    assert!((estimate.pose.position() - truth_pose.position()).norm() < 1.0);
    assert!((estimate.landmarks["buoy"].mean - truth).norm() < 1.5);
}

#[test]
fn test_heading_wrap_during_observation() {
    let mut map = ParticleMap::with_seed(Pose::default(), Matrix6::zeros(), 10, 1).unwrap();
    let predicted_bearing = 359.0_f64.to_radians();
    let idx = map
        .register_landmark(
            "wrap",
            Vector3::new(10.0 * predicted_bearing.cos(), 10.0 * predicted_bearing.sin(), 0.0),
            Matrix3::identity(),
        )
        .unwrap();
    map.observe_hpr(
        idx,
        &Vector3::new(1.0_f64.to_radians(), 0.0, 10.0),
        &(Matrix3::identity() * 0.01),
    )
    .unwrap();
    for p in map.particles() {
        assert!(p.landmarks[idx].residual_norm < 0.05);
        // A small innovation barely changes the weight.
        assert!(p.weight > 0.1 / 1.05);
    }
    assert_approx_eq!(
        heading_difference(1.0_f64.to_radians(), 359.0_f64.to_radians()).to_degrees(),
        2.0,
        1e-9
    );
}

#[test]
fn test_zero_noise_propagation_is_exact() {
    let mut map = ParticleMap::new(Pose::default(), Matrix6::zeros(), 25).unwrap();
    map.propagate(&Vector6::new(1.0, 0.0, 0.0, 0.0, 0.0, 0.0), 1.0)
        .unwrap();
    for p in map.particles() {
        assert_eq!(p.pose.north, 1.0);
        assert_eq!(p.pose.east, 0.0);
    }
}

#[test]
fn test_degenerate_geometry_observation() {
    let mut map = ParticleMap::with_seed(Pose::default(), Matrix6::zeros(), 5, 1).unwrap();
    let idx = map
        .register_landmark("above", Vector3::new(0.0, 0.0, -4.0), Matrix3::identity())
        .unwrap();
    map.observe_hpr(idx, &Vector3::new(0.3, 1.2, 4.0), &(Matrix3::identity() * 0.1))
        .unwrap();
    map.resample();
    let estimate = map.predict();
    let above = estimate.landmarks["above"];
    assert!(above.mean.iter().all(|v| v.is_finite()));
    assert!(above.variance.iter().all(|v| v.is_finite()));
}

#[test]
fn test_collapsed_weights_recover_on_next_cycle() {
    let mut map = ParticleMap::with_seed(Pose::default(), control_covariance(), 10, 4).unwrap();
    map.propagate(&Vector6::zeros(), 1.0).unwrap();
    let far = map
        .register_landmark("far", Vector3::new(5.0, 0.0, 0.0), Matrix3::identity())
        .unwrap();
    let near = map
        .register_landmark("near", Vector3::new(5.0, 0.0, 0.0), Matrix3::identity())
        .unwrap();
    // Contradictory ranges keep the innovation huge until every weight underflows to zero.
    for i in 0..400 {
        let range = if i % 2 == 0 { 1e10 } else { 1.0 };
        map.observe_hpr(far, &Vector3::new(0.0, 0.0, range), &Matrix3::identity())
            .unwrap();
    }
    let before: Vec<Pose> = map.particles().iter().map(|p| p.pose).collect();
    assert!(map.particles().iter().all(|p| p.weight == 0.0));
    assert_eq!(map.resample(), ResampleOutcome::Skipped);
    let after: Vec<Pose> = map.particles().iter().map(|p| p.pose).collect();
    assert_eq!(before, after);
    for p in map.particles() {
        assert_approx_eq!(p.weight, 0.1, 1e-15);
    }

    for _ in 0..100 {
        map.propagate(&Vector6::zeros(), 0.1).unwrap();
        map.observe_hpr(near, &Vector3::new(0.0, 0.0, 5.0), &(Matrix3::identity() * 0.1))
            .unwrap();
        assert_eq!(map.resample(), ResampleOutcome::Resampled);
        let total: f64 = map.particles().iter().map(|p| p.weight).sum();
        assert_approx_eq!(total, 1.0, 1e-12);
    }
}

#[test]
fn test_cycle_runner_with_aliases() {
    let config = MapConfig {
        initial_pose: [0.0; 6],
        control_covariance: [[0.0; 6]; 6],
        num_particles: 15,
        seed: Some(2),
        landmarks: vec![LandmarkConfig {
            name: "gate".to_string(),
            initial_position: [12.0, 0.0, 1.0],
            initial_covariance: [[9.0, 0.0, 0.0], [0.0, 9.0, 0.0], [0.0, 0.0, 9.0]],
            aliases: vec!["gate_in".to_string(), "gate_out".to_string()],
        }],
    };
    let mut runner = CycleRunner::new(ParticleMap::from_config(&config).unwrap());
    let truth = Vector3::new(10.0, 1.0, 1.0);
    let model = HeadingPitchRange::new();
    let mut estimate = None;
    for step in 0..20 {
        let pose = Pose::new(step as f64 * 0.1, 0.0, 0.0, 0.0, 0.0, 0.0);
        let z = model.predict(&pose, &truth);
        let name = if step % 2 == 0 { "gate_in" } else { "gate_out" };
        let reading = SensorReading {
            landmark: name.to_string(),
            heading: z[0],
            pitch: z[1],
            range: z[2],
            heading_variance: 1e-4,
            pitch_variance: 1e-4,
            range_variance: 1e-2,
            offset: [0.0; 3],
        };
        let state = VehicleState {
            north: pose.north,
            ..Default::default()
        };
        estimate = Some(runner.step(&state, &[reading], 0.1).unwrap());
    }
    let estimate = estimate.unwrap();
    assert_eq!(estimate.landmarks.len(), 3);
    assert_eq!(estimate.landmarks["gate_in"], estimate.landmarks["gate"]);
    assert!((estimate.landmarks["gate"].mean - truth).norm() < 0.5);
    assert_approx_eq!(estimate.pose.north, 1.9, 1e-9);
}

#[test]
fn test_error_reporting() {
    assert!(matches!(
        ParticleMap::new(Pose::default(), Matrix6::zeros(), 0),
        Err(AslamError::EmptyPopulation)
    ));
    let mut map = ParticleMap::new(Pose::default(), Matrix6::zeros(), 3).unwrap();
    map.register_landmark("a", Vector3::zeros(), Matrix3::identity())
        .unwrap();
    assert!(matches!(
        map.register_landmark("a", Vector3::zeros(), Matrix3::identity()),
        Err(AslamError::DuplicateLandmark(_))
    ));
    assert!(matches!(
        map.observe_hpr(1, &Vector3::zeros(), &Matrix3::identity()),
        Err(AslamError::InvalidIndex {
            index: 1,
            registered: 1
        })
    ));
    assert!(matches!(
        map.propagate(&Vector6::zeros(), f64::INFINITY),
        Err(AslamError::InvalidTimeStep(_))
    ));
}

#[test]
fn test_scenario_file_drives_simulation() {
    let mut scenario = ScenarioConfig::default();
    scenario.steps = 30;
    scenario.map.num_particles = 20;
    let path = std::env::temp_dir().join(format!("aslam_it_{}.toml", std::process::id()));
    scenario.to_file(&path).unwrap();
    let loaded = ScenarioConfig::from_file(&path).unwrap();
    let _ = std::fs::remove_file(&path);
    let records = simulate(&loaded).unwrap();
    assert_eq!(records.len(), 30 * loaded.truth.len());
    assert!(records.iter().all(|r| r.landmark_error.is_finite()));
}

//! FastSLAM particle filter map.
//!
//! [ParticleMap] owns the particle population, the landmark registry and the control noise model,
//! and exposes the four operations of a filter cycle: [ParticleMap::propagate],
//! [ParticleMap::observe], [ParticleMap::resample] and [ParticleMap::predict].
//!
//! # Example
//!
//! ```rust
//! use aslam::{ParticleMap, Pose};
//! use nalgebra::{Matrix3, Matrix6, Vector3, Vector6};
//!
//! let mut map = ParticleMap::with_seed(Pose::default(), Matrix6::identity() * 1e-4, 100, 7).unwrap();
//! let buoy = map
//!     .register_landmark("buoy", Vector3::new(10.0, 0.0, 0.0), Matrix3::identity() * 4.0)
//!     .unwrap();
//!
//! map.propagate(&Vector6::new(0.5, 0.0, 0.0, 0.0, 0.0, 0.0), 0.01).unwrap();
//! map.observe_hpr(buoy, &Vector3::new(0.0, 0.0, 10.0), &(Matrix3::identity() * 0.01)).unwrap();
//! map.resample();
//! let estimate = map.predict();
//! assert!(estimate.landmarks.contains_key("buoy"));
//! ```
use crate::config::MapConfig;
use crate::error::{AslamError, Result};
use crate::landmark::LandmarkEstimator;
use crate::linalg::matrix_square_root;
use crate::observation::{HeadingPitchRange, ObservationModel};
use crate::particle::{Particle, effective_sample_size, systematic_resample};
use crate::{Pose, circular_mean, wrap_to_pi};

use nalgebra::{DMatrix, Matrix3, Matrix6, SMatrix, SVector, Vector3, Vector6};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;

use std::collections::BTreeMap;
use std::fmt::{self, Debug};

/// Aggregated belief about one landmark.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LandmarkEstimate {
    /// Mean position `[north, east, depth]` across the population
    pub mean: Vector3<f64>,
    /// Diagonal of the mean covariance (per-axis variance)
    pub variance: Vector3<f64>,
}

/// Aggregated output of one filter cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct Estimate {
    pub pose: Pose,
    /// Keyed by every registered name, aliases included
    pub landmarks: BTreeMap<String, LandmarkEstimate>,
}

/// Result of a resampling attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResampleOutcome {
    /// The population was redrawn and all weights reset to `1/N`.
    Resampled,
    /// The weights summed to zero (or were not finite); poses and landmark filters were left
    /// unchanged and the weights reset to `1/N`.
    Skipped,
}

/// Particle filter over vehicle pose with per-particle landmark Kalman filters.
pub struct ParticleMap {
    particles: Vec<Particle>,
    control_covariance: Matrix6<f64>,
    /// Square root of the control covariance, `L * L^T = control_covariance`
    control_factor: Matrix6<f64>,
    landmark_indices: BTreeMap<String, usize>,
    landmark_count: usize,
    rng: StdRng,
}
impl Debug for ParticleMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let weights: Vec<f64> = self.particles.iter().map(|p| p.weight).collect();
        let min_weight = weights.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_weight = weights.iter().cloned().fold(0.0, f64::max);
        f.debug_struct("ParticleMap")
            .field("num_particles", &self.particles.len())
            .field("effective_particles", &effective_sample_size(&weights))
            .field(
                "weight_range",
                &format_args!("[{:.4e}, {:.4e}]", min_weight, max_weight),
            )
            .field("landmarks", &self.landmark_indices)
            .field("control_covariance", &self.control_covariance)
            .finish()
    }
}
impl ParticleMap {
    /// Create a new map with every particle at `initial_pose`, seeded from the operating system.
    ///
    /// # Arguments
    /// * `initial_pose` - Pose copied into every particle
    /// * `control_covariance` - Covariance of the motion noise per unit time (6×6, full matrix)
    /// * `particle_count` - Size of the population, fixed for the lifetime of the map
    ///
    /// # Errors
    /// [AslamError::EmptyPopulation] if `particle_count` is zero.
    pub fn new(
        initial_pose: Pose,
        control_covariance: Matrix6<f64>,
        particle_count: usize,
    ) -> Result<ParticleMap> {
        Self::with_rng(
            initial_pose,
            control_covariance,
            particle_count,
            StdRng::from_os_rng(),
        )
    }
    /// Same as [ParticleMap::new] with a deterministic random number generator.
    pub fn with_seed(
        initial_pose: Pose,
        control_covariance: Matrix6<f64>,
        particle_count: usize,
        seed: u64,
    ) -> Result<ParticleMap> {
        Self::with_rng(
            initial_pose,
            control_covariance,
            particle_count,
            StdRng::seed_from_u64(seed),
        )
    }
    /// Build a map from its configuration, registering every configured landmark and alias.
    ///
    /// # Errors
    /// Construction errors from [ParticleMap::new] and registration errors from
    /// [ParticleMap::register_landmark] / [ParticleMap::alias_landmark].
    pub fn from_config(config: &MapConfig) -> Result<ParticleMap> {
        let pose = Pose::from(config.initial_pose);
        let covariance = Matrix6::from_fn(|i, j| config.control_covariance[i][j]);
        let mut map = match config.seed {
            Some(seed) => Self::with_seed(pose, covariance, config.num_particles, seed)?,
            None => Self::new(pose, covariance, config.num_particles)?,
        };
        for landmark in &config.landmarks {
            map.register_landmark(
                &landmark.name,
                Vector3::from(landmark.initial_position),
                Matrix3::from_fn(|i, j| landmark.initial_covariance[i][j]),
            )?;
            for alias in &landmark.aliases {
                map.alias_landmark(alias, &landmark.name)?;
            }
        }
        Ok(map)
    }
    fn with_rng(
        initial_pose: Pose,
        control_covariance: Matrix6<f64>,
        particle_count: usize,
        rng: StdRng,
    ) -> Result<ParticleMap> {
        if particle_count == 0 {
            return Err(AslamError::EmptyPopulation);
        }
        let factor = matrix_square_root(&DMatrix::from_column_slice(
            6,
            6,
            control_covariance.as_slice(),
        ));
        let control_factor = Matrix6::from_column_slice(factor.as_slice());
        let weight = 1.0 / particle_count as f64;
        let particles = vec![Particle::new(initial_pose, weight); particle_count];
        log::debug!(
            "initialized particle map with {} particles at {}",
            particle_count,
            initial_pose
        );
        Ok(ParticleMap {
            particles,
            control_covariance,
            control_factor,
            landmark_indices: BTreeMap::new(),
            landmark_count: 0,
            rng,
        })
    }
    /// Register a new landmark and give every particle a filter for it.
    ///
    /// The filter is appended to every particle before the index is returned, so an index handed out
    /// here is valid for the whole population.
    ///
    /// # Errors
    /// [AslamError::DuplicateLandmark] if `name` is already registered (as a landmark or an alias).
    pub fn register_landmark(
        &mut self,
        name: &str,
        initial_position: Vector3<f64>,
        initial_covariance: Matrix3<f64>,
    ) -> Result<usize> {
        if self.landmark_indices.contains_key(name) {
            return Err(AslamError::DuplicateLandmark(name.to_string()));
        }
        let estimator = LandmarkEstimator::new(initial_position, initial_covariance);
        for particle in &mut self.particles {
            particle.landmarks.push(estimator.clone());
        }
        let index = self.landmark_count;
        self.landmark_count += 1;
        self.landmark_indices.insert(name.to_string(), index);
        log::debug!(
            "registered landmark '{}' as index {} at [{:.3}, {:.3}, {:.3}]",
            name,
            index,
            initial_position[0],
            initial_position[1],
            initial_position[2]
        );
        Ok(index)
    }
    /// Make `alias` resolve to the same landmark as `existing`.
    ///
    /// # Errors
    /// [AslamError::UnknownLandmark] if `existing` is not registered, [AslamError::DuplicateLandmark]
    /// if `alias` is taken.
    pub fn alias_landmark(&mut self, alias: &str, existing: &str) -> Result<usize> {
        let index = self
            .landmark_index(existing)
            .ok_or_else(|| AslamError::UnknownLandmark(existing.to_string()))?;
        if self.landmark_indices.contains_key(alias) {
            return Err(AslamError::DuplicateLandmark(alias.to_string()));
        }
        self.landmark_indices.insert(alias.to_string(), index);
        Ok(index)
    }
    pub fn landmark_index(&self, name: &str) -> Option<usize> {
        self.landmark_indices.get(name).copied()
    }
    /// Number of distinct landmark filters per particle.
    pub fn landmark_count(&self) -> usize {
        self.landmark_count
    }
    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }
    pub fn control_covariance(&self) -> &Matrix6<f64> {
        &self.control_covariance
    }
    /// Effective sample size of the current weights.
    pub fn effective_sample_size(&self) -> f64 {
        let weights: Vec<f64> = self.particles.iter().map(|p| p.weight).collect();
        effective_sample_size(&weights)
    }
    /// Draw one motion noise sample `L * sqrt(dt) * u` with `u` standard normal.
    fn sample_noise(&mut self, dt: f64) -> Vector6<f64> {
        let u = Vector6::from_fn(|_, _| StandardNormal.sample(&mut self.rng));
        self.control_factor * u * dt.sqrt()
    }
    /// Motion update from body-relative rates.
    ///
    /// Each particle draws `delta = rate * dt + L * sqrt(dt) * u`. The rotational part is added to
    /// heading, pitch and roll; the forward (`delta[0]`) and lateral (`delta[1]`) translation is
    /// rotated into the north/east frame by the *updated* heading, and `delta[2]` is added to depth.
    ///
    /// # Errors
    /// [AslamError::InvalidTimeStep] unless `dt` is finite and positive; no particle is moved then.
    pub fn propagate(&mut self, rate: &Vector6<f64>, dt: f64) -> Result<()> {
        check_time_step(dt)?;
        let mean_delta = rate * dt;
        let noise: Vec<Vector6<f64>> = (0..self.particles.len())
            .map(|_| self.sample_noise(dt))
            .collect();
        for (particle, noise) in self.particles.iter_mut().zip(noise) {
            let delta = mean_delta + noise;
            let pose = &mut particle.pose;
            let heading = wrap_to_pi(pose.heading + delta[3]);
            let (sin_h, cos_h) = heading.sin_cos();
            pose.north += delta[0] * cos_h - delta[1] * sin_h;
            pose.east += delta[0] * sin_h + delta[1] * cos_h;
            pose.depth += delta[2];
            pose.heading = heading;
            pose.pitch += delta[4];
            pose.roll += delta[5];
        }
        log::trace!("propagated {} particles over dt = {dt}", self.particles.len());
        Ok(())
    }
    /// Motion update from an absolute pose delta in the north/east/depth frame.
    ///
    /// Each particle becomes `pose + delta + L * sqrt(dt) * u`. Used when the motion source already
    /// reports the change in world-frame pose (for example successive navigation-filter outputs).
    ///
    /// # Errors
    /// [AslamError::InvalidTimeStep] unless `dt` is finite and positive.
    pub fn propagate_delta(&mut self, delta: &Vector6<f64>, dt: f64) -> Result<()> {
        check_time_step(dt)?;
        let noise: Vec<Vector6<f64>> = (0..self.particles.len())
            .map(|_| self.sample_noise(dt))
            .collect();
        for (particle, noise) in self.particles.iter_mut().zip(noise) {
            let mut pose: Vector6<f64> = particle.pose.into();
            pose += delta + noise;
            pose[3] = wrap_to_pi(pose[3]);
            particle.pose = Pose::from(pose);
        }
        Ok(())
    }
    /// Observation update of one landmark in every particle.
    ///
    /// For each particle the landmark filter is updated against `observation` using `model`
    /// evaluated at the particle pose (see [LandmarkEstimator::update]), then the particle weight is
    /// divided by `1 + |y|` where `y` is the innovation. Particles are processed in parallel.
    ///
    /// # Errors
    /// [AslamError::InvalidIndex] if `index` was not returned by [ParticleMap::register_landmark].
    pub fn observe<const M: usize, O>(
        &mut self,
        index: usize,
        model: &O,
        observation: &SVector<f64, M>,
        covariance: &SMatrix<f64, M, M>,
    ) -> Result<()>
    where
        O: ObservationModel<M> + ?Sized,
    {
        if index >= self.landmark_count {
            return Err(AslamError::InvalidIndex {
                index,
                registered: self.landmark_count,
            });
        }
        self.particles.par_iter_mut().for_each(|particle| {
            let pose = particle.pose;
            let innovation =
                particle.landmarks[index].update(model, &pose, observation, covariance);
            particle.weight /= 1.0 + innovation.norm();
        });
        Ok(())
    }
    /// Heading / pitch / range observation with the observed point at the landmark itself.
    pub fn observe_hpr(
        &mut self,
        index: usize,
        observation: &Vector3<f64>,
        covariance: &Matrix3<f64>,
    ) -> Result<()> {
        self.observe(index, &HeadingPitchRange::new(), observation, covariance)
    }
    /// Systematic resampling of the population proportional to weight.
    ///
    /// Selected particles are deep-copied into a new population which replaces the old one in a
    /// single assignment; every weight is reset to `1/N`. If the weights have collapsed to zero (or
    /// are not finite) poses and landmark filters are left unchanged, the weights are reset to `1/N`
    /// so later observations can discriminate again, and [ResampleOutcome::Skipped] is returned.
    pub fn resample(&mut self) -> ResampleOutcome {
        let weights: Vec<f64> = self.particles.iter().map(|p| p.weight).collect();
        let uniform = 1.0 / self.particles.len() as f64;
        let Some(indices) = systematic_resample(&weights) else {
            log::warn!(
                "particle weights collapsed (sum = {}), skipping resampling and resetting weights",
                weights.iter().sum::<f64>()
            );
            for particle in &mut self.particles {
                particle.weight = uniform;
            }
            return ResampleOutcome::Skipped;
        };
        let resampled: Vec<Particle> = indices
            .into_iter()
            .map(|i| {
                let mut particle = self.particles[i].clone();
                particle.weight = uniform;
                particle
            })
            .collect();
        self.particles = resampled;
        ResampleOutcome::Resampled
    }
    /// Aggregate the population into a single estimate.
    ///
    /// Particles are weighted uniformly: after resampling, probability mass is carried by particle
    /// multiplicity. Position is the arithmetic mean; heading, pitch and roll use the circular mean.
    /// Each landmark reports the mean position and the diagonal of the mean covariance.
    pub fn predict(&self) -> Estimate {
        let n = self.particles.len() as f64;
        let position = self
            .particles
            .iter()
            .fold(Vector3::zeros(), |acc, p| acc + p.pose.position())
            / n;
        let pose = Pose::new(
            position[0],
            position[1],
            position[2],
            circular_mean(self.particles.iter().map(|p| p.pose.heading)),
            circular_mean(self.particles.iter().map(|p| p.pose.pitch)),
            circular_mean(self.particles.iter().map(|p| p.pose.roll)),
        );

        let mut means = vec![Vector3::<f64>::zeros(); self.landmark_count];
        let mut variances = vec![Vector3::<f64>::zeros(); self.landmark_count];
        for particle in &self.particles {
            for (i, landmark) in particle.landmarks.iter().enumerate() {
                means[i] += landmark.mean / n;
                variances[i] += landmark.variance() / n;
            }
        }
        let landmarks = self
            .landmark_indices
            .iter()
            .map(|(name, &i)| {
                (
                    name.clone(),
                    LandmarkEstimate {
                        mean: means[i],
                        variance: variances[i],
                    },
                )
            })
            .collect();
        Estimate { pose, landmarks }
    }
}

fn check_time_step(dt: f64) -> Result<()> {
    if dt.is_finite() && dt > 0.0 {
        Ok(())
    } else {
        Err(AslamError::InvalidTimeStep(dt))
    }
}

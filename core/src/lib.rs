//! Acoustic/visual SLAM toolbox built around a FastSLAM-style particle filter
//!
//! This crate estimates the pose of a moving vehicle together with the positions of a small, fixed set
//! of landmarks. Each particle in the population carries one pose hypothesis and one independent
//! Extended Kalman Filter per landmark. Relative observations (heading, pitch, range) of a landmark
//! update the landmark filters inside every particle and re-weight the particles; resampling then
//! concentrates the population on the hypotheses that explain the observations best.
//!
//! This crate is primarily built off of the following dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): Provides the linear algebra tools for the filters.
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr): Provides random number generation for motion noise and simulation.
//! - [`rayon`](https://crates.io/crates/rayon): Provides data parallelism for the per-particle Kalman updates.
//!
//! All other functionality is auxiliary (configuration files, CSV export, logging).
//!
//! ## Crate overview
//!
//! - [cycle]: Contains the per-control-period driver that converts raw vehicle/sensor values and runs the filter operations in order.
//! - [config]: Contains serde configuration structures for vehicle and landmark priors and simulation scenarios.
//! - [error]: Contains the crate error type.
//! - [landmark]: Contains the per-particle landmark Extended Kalman Filter.
//! - [linalg]: Contains linear algebra utilities and helper functions.
//! - [map]: Contains the particle filter map (propagate, observe, resample, predict).
//! - [observation]: Contains the observation model trait and the heading/pitch/range models.
//! - [particle]: Contains the particle type and the resampling procedures.
//! - [sim]: Contains simulation utilities for running the filter against synthetic ground truth.
//!
//! ## Coordinate and state definitions
//!
//! The vehicle pose is the six-element vector
//!
//! $$
//! x = [p_n, p_e, p_d, \psi, \theta, \phi]
//! $$
//!
//! Where:
//! - $p_n$, $p_e$, and $p_d$ are the north, east, and depth coordinates (meters) in a local, fixed frame. Depth is positive down.
//! - $\psi$, $\theta$, and $\phi$ are heading, pitch, and roll (radians). Heading is circular and is kept in $(-\pi, \pi]$.
//!
//! Landmarks are points $l = [l_n, l_e, l_d]$ in the same frame. An observation of a landmark from a pose
//! is the triple
//!
//! $$
//! z = \begin{bmatrix} \mathrm{wrap}(\mathrm{atan2}(\Delta_e, \Delta_n) - \psi) \\\\ \mathrm{atan2}(-\Delta_d, \sqrt{\Delta_n^2 + \Delta_e^2}) \\\\ \lVert \Delta \rVert \end{bmatrix}, \quad \Delta = l - p
//! $$
//!
//! ## Filter cycle
//!
//! Each control period runs the four operations of [map::ParticleMap] in order:
//!
//! 1. `propagate`: apply a noisy motion delta to every particle.
//! 2. `observe`: for every available reading, update the landmark filter in every particle and divide
//!    the particle weight by $1 + \lVert y \rVert$ where $y$ is the innovation.
//! 3. `resample`: systematic (low-variance) resampling proportional to weight.
//! 4. `predict`: aggregate the population into a single pose and per-landmark mean/variance.
//!
//! [cycle::CycleRunner] wraps this sequence for callers that hold raw navigation-filter output.
pub mod config;
pub mod cycle;
pub mod error;
pub mod landmark;
pub mod linalg;
pub mod map;
pub mod observation;
pub mod particle;
pub mod sim;

pub use error::{AslamError, Result};
pub use map::{Estimate, LandmarkEstimate, ParticleMap, ResampleOutcome};
pub use observation::{HeadingPitch, HeadingPitchRange, ObservationModel};

use nalgebra::{Vector3, Vector6};
use serde::{Deserialize, Serialize};

use std::f64::consts::{PI, TAU};
use std::fmt::{self, Display};

/// Vehicle pose: position in a local north/east/depth frame and orientation as heading, pitch, roll.
///
/// Angles are stored in radians. The pose has no identity beyond its value; particles each own a copy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// North coordinate in meters
    pub north: f64,
    /// East coordinate in meters
    pub east: f64,
    /// Depth in meters (positive down)
    pub depth: f64,
    /// Heading in radians
    pub heading: f64,
    /// Pitch in radians
    pub pitch: f64,
    /// Roll in radians
    pub roll: f64,
}
impl Pose {
    pub fn new(north: f64, east: f64, depth: f64, heading: f64, pitch: f64, roll: f64) -> Pose {
        Pose {
            north,
            east,
            depth,
            heading,
            pitch,
            roll,
        }
    }
    /// Position component as a vector `[north, east, depth]`.
    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.north, self.east, self.depth)
    }
    /// Orientation component as a vector `[heading, pitch, roll]`.
    pub fn orientation(&self) -> Vector3<f64> {
        Vector3::new(self.heading, self.pitch, self.roll)
    }
}
impl Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pose {{ north: {:.3} m, east: {:.3} m, depth: {:.3} m, heading: {:.2} deg, pitch: {:.2} deg, roll: {:.2} deg }}",
            self.north,
            self.east,
            self.depth,
            self.heading.to_degrees(),
            self.pitch.to_degrees(),
            self.roll.to_degrees()
        )
    }
}
impl From<Vector6<f64>> for Pose {
    fn from(v: Vector6<f64>) -> Self {
        Pose::new(v[0], v[1], v[2], v[3], v[4], v[5])
    }
}
impl From<Pose> for Vector6<f64> {
    fn from(pose: Pose) -> Self {
        Vector6::new(
            pose.north,
            pose.east,
            pose.depth,
            pose.heading,
            pose.pitch,
            pose.roll,
        )
    }
}
impl From<[f64; 6]> for Pose {
    fn from(values: [f64; 6]) -> Self {
        Pose::new(
            values[0], values[1], values[2], values[3], values[4], values[5],
        )
    }
}

// --- Miscellaneous functions for wrapping and averaging angles ---
/// Wrap an angle to the range $(-\pi, \pi]$ radians
///
/// # Arguments
/// * `angle` - The angle to be wrapped in radians.
/// # Returns
/// * The wrapped angle, which will be in the range (-π, π] radians.
/// # Example
/// ```rust
/// use aslam::wrap_to_pi;
/// use std::f64::consts::PI;
/// let wrapped_angle = wrap_to_pi(3.0 * PI / 2.0);
/// assert!((wrapped_angle + PI / 2.0).abs() < 1e-12);
/// ```
pub fn wrap_to_pi(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI { wrapped + TAU } else { wrapped }
}
/// Signed angular difference `x - y` wrapped to $(-\pi, \pi]$.
///
/// # Example
/// ```rust
/// use aslam::heading_difference;
/// let diff = heading_difference(1.0_f64.to_radians(), 359.0_f64.to_radians());
/// assert!((diff.to_degrees() - 2.0).abs() < 1e-9);
/// ```
pub fn heading_difference(x: f64, y: f64) -> f64 {
    wrap_to_pi(x - y)
}
/// Circular mean of a set of angles: the angle of the mean unit vector $(\cos\theta, \sin\theta)$.
///
/// Arithmetic averaging breaks down when the angles straddle the $\pm\pi$ boundary; this does not.
/// An empty input (or one whose unit vectors cancel exactly) returns `0.0`.
pub fn circular_mean<I>(angles: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let (sin_sum, cos_sum) = angles
        .into_iter()
        .fold((0.0, 0.0), |(s, c), a| (s + a.sin(), c + a.cos()));
    if sin_sum == 0.0 && cos_sum == 0.0 {
        return 0.0;
    }
    sin_sum.atan2(cos_sum)
}

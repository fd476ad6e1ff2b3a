//! Particles and the resampling procedure.
use crate::Pose;
use crate::landmark::LandmarkEstimator;

use std::fmt::{self, Display};

/// One hypothesis of the FastSLAM population: a vehicle pose, one landmark filter per registered
/// landmark, and an importance weight.
///
/// Cloning a particle deep-copies its landmark filters; resampled particles never share state.
#[derive(Clone, Debug, PartialEq)]
pub struct Particle {
    pub pose: Pose,
    pub landmarks: Vec<LandmarkEstimator>,
    pub weight: f64,
}
impl Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Particle")
            .field("north", &self.pose.north)
            .field("east", &self.pose.east)
            .field("depth", &self.pose.depth)
            .field("heading", &self.pose.heading.to_degrees())
            .field("pitch", &self.pose.pitch.to_degrees())
            .field("roll", &self.pose.roll.to_degrees())
            .field("landmarks", &self.landmarks.len())
            .field("weight", &self.weight)
            .finish()
    }
}
impl Particle {
    pub fn new(pose: Pose, weight: f64) -> Particle {
        Particle {
            pose,
            landmarks: Vec::new(),
            weight,
        }
    }
}

/// Normalize a weight vector so it sums to one.
///
/// Returns `None` when the sum is zero, negative or not finite; the input is then left untouched.
pub fn normalize_weights(weights: &mut [f64]) -> Option<f64> {
    let sum: f64 = weights.iter().sum();
    if !(sum > 0.0 && sum.is_finite()) {
        return None;
    }
    for w in weights.iter_mut() {
        *w /= sum;
    }
    Some(sum)
}

/// Systematic (low-variance) resampling with deterministic thresholds.
///
/// Weights are normalized, accumulated into a cumulative sum, and for each output slot `i` the
/// first index whose cumulative weight strictly exceeds `i / N` is selected. The result has the
/// same length as the input and may repeat indices.
///
/// # Returns
/// The selected particle indices, or `None` if the weights cannot be normalized.
///
/// # Example
/// ```rust
/// use aslam::particle::systematic_resample;
/// let selected = systematic_resample(&[0.0, 1.0, 0.0]).unwrap();
/// assert_eq!(selected, vec![1, 1, 1]);
/// ```
pub fn systematic_resample(weights: &[f64]) -> Option<Vec<usize>> {
    let n = weights.len();
    if n == 0 {
        return Some(Vec::new());
    }
    let mut normalized = weights.to_vec();
    normalize_weights(&mut normalized)?;
    let cumulative: Vec<f64> = normalized
        .iter()
        .scan(0.0, |sum, w| {
            *sum += w;
            Some(*sum)
        })
        .collect();
    let selected = (0..n)
        .map(|i| {
            let threshold = i as f64 / n as f64;
            cumulative
                .iter()
                .position(|c| *c > threshold)
                .unwrap_or(n - 1)
        })
        .collect();
    Some(selected)
}

/// Effective sample size `1 / Σ w²` of a weight vector (normalized internally).
pub fn effective_sample_size(weights: &[f64]) -> f64 {
    let mut normalized = weights.to_vec();
    if normalize_weights(&mut normalized).is_none() {
        return 0.0;
    }
    let sum_of_squares: f64 = normalized.iter().map(|w| w * w).sum();
    if sum_of_squares > 0.0 {
        1.0 / sum_of_squares
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use nalgebra::{Matrix3, Vector3};

    #[test]
    fn systematic_thresholds_follow_cumulative_sum() {
        // Cumulative sums [0.1, 0.8, 1.0] against thresholds [0, 1/3, 2/3].
        let selected = systematic_resample(&[0.1, 0.7, 0.2]).unwrap();
        assert_eq!(selected, vec![0, 1, 1]);
    }

    #[test]
    fn systematic_is_scale_invariant() {
        let a = systematic_resample(&[1.0, 7.0, 2.0]).unwrap();
        let b = systematic_resample(&[0.1, 0.7, 0.2]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn systematic_uniform_keeps_every_particle() {
        let selected = systematic_resample(&[0.25; 4]).unwrap();
        assert_eq!(selected, vec![0, 1, 2, 3]);
    }

    #[test]
    fn systematic_rejects_zero_sum() {
        assert!(systematic_resample(&[0.0, 0.0, 0.0]).is_none());
        assert!(systematic_resample(&[f64::NAN, 1.0]).is_none());
        assert_eq!(systematic_resample(&[]).unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn normalize_weights_sums_to_one() {
        let mut w = vec![2.0, 6.0, 2.0];
        let sum = normalize_weights(&mut w).unwrap();
        assert_approx_eq!(sum, 10.0, 1e-12);
        assert_approx_eq!(w.iter().sum::<f64>(), 1.0, 1e-12);
        assert_approx_eq!(w[1], 0.6, 1e-12);
    }

    #[test]
    fn effective_sample_size_bounds() {
        assert_approx_eq!(effective_sample_size(&[1.0; 10]), 10.0, 1e-9);
        assert_approx_eq!(effective_sample_size(&[0.0, 5.0, 0.0]), 1.0, 1e-9);
        assert_eq!(effective_sample_size(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn cloned_particles_do_not_alias_landmarks() {
        let mut original = Particle::new(Pose::default(), 1.0);
        original
            .landmarks
            .push(LandmarkEstimator::new(Vector3::new(1.0, 2.0, 3.0), Matrix3::identity()));
        let mut copy = original.clone();
        copy.landmarks[0].mean[0] = 42.0;
        assert_eq!(original.landmarks[0].mean[0], 1.0);
    }
}

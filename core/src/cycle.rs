//! Per-control-period driver.
//!
//! A vehicle navigation filter publishes its pose with attitude in degrees, and perception publishes
//! relative heading/pitch/range readings tagged with a landmark name. [CycleRunner] turns one such
//! batch into the four map operations: propagate by the change in navigation pose since the previous
//! cycle, observe each reading, resample, and predict.
use crate::error::{AslamError, Result};
use crate::map::{Estimate, ParticleMap};
use crate::observation::HeadingPitchRange;
use crate::{Pose, wrap_to_pi};

use nalgebra::{Matrix3, Vector3, Vector6};
use serde::{Deserialize, Serialize};

/// Vehicle state as reported by the navigation filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    /// North in meters
    pub north: f64,
    /// East in meters
    pub east: f64,
    /// Depth in meters (positive down)
    pub depth: f64,
    /// Heading in degrees
    pub heading: f64,
    /// Pitch in degrees
    pub pitch: f64,
    /// Roll in degrees
    pub roll: f64,
}
impl From<VehicleState> for Pose {
    fn from(state: VehicleState) -> Self {
        Pose::new(
            state.north,
            state.east,
            state.depth,
            state.heading.to_radians(),
            state.pitch.to_radians(),
            state.roll.to_radians(),
        )
    }
}

/// One relative landmark reading.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Registered landmark name or alias
    pub landmark: String,
    /// Relative heading in radians
    pub heading: f64,
    /// Pitch in radians
    pub pitch: f64,
    /// Range in meters
    pub range: f64,
    pub heading_variance: f64,
    pub pitch_variance: f64,
    pub range_variance: f64,
    /// Observed point relative to the tracked landmark position `[north, east, depth]`
    #[serde(default)]
    pub offset: [f64; 3],
}
impl SensorReading {
    pub fn observation(&self) -> Vector3<f64> {
        Vector3::new(self.heading, self.pitch, self.range)
    }
    pub fn covariance(&self) -> Matrix3<f64> {
        Matrix3::from_diagonal(&Vector3::new(
            self.heading_variance,
            self.pitch_variance,
            self.range_variance,
        ))
    }
}

/// Runs one filter cycle per control period.
#[derive(Debug)]
pub struct CycleRunner {
    map: ParticleMap,
    previous: Option<Pose>,
}
impl CycleRunner {
    pub fn new(map: ParticleMap) -> CycleRunner {
        CycleRunner {
            map,
            previous: None,
        }
    }
    pub fn map(&self) -> &ParticleMap {
        &self.map
    }
    pub fn into_map(self) -> ParticleMap {
        self.map
    }
    /// Run propagate, observe, resample and predict for one control period.
    ///
    /// The motion delta is the difference between `state` and the state passed to the previous call
    /// (zero on the first call), with the heading difference wrapped. Readings are observed in order.
    ///
    /// # Errors
    /// [AslamError::InvalidTimeStep] for a bad `dt` and [AslamError::UnknownLandmark] for a reading
    /// whose name is not registered. Both are detected before anything is applied, so a failed step
    /// leaves the map and the previous state untouched.
    pub fn step(
        &mut self,
        state: &VehicleState,
        readings: &[SensorReading],
        dt: f64,
    ) -> Result<Estimate> {
        let indices = readings
            .iter()
            .map(|reading| {
                self.map
                    .landmark_index(&reading.landmark)
                    .ok_or_else(|| AslamError::UnknownLandmark(reading.landmark.clone()))
            })
            .collect::<Result<Vec<usize>>>()?;

        let pose = Pose::from(*state);
        let delta = match self.previous {
            Some(previous) => {
                let mut delta = Vector6::from(pose) - Vector6::from(previous);
                delta[3] = wrap_to_pi(delta[3]);
                delta
            }
            None => Vector6::zeros(),
        };
        self.map.propagate_delta(&delta, dt)?;
        self.previous = Some(pose);

        for (reading, index) in readings.iter().zip(indices) {
            let model = HeadingPitchRange::with_offset(Vector3::from(reading.offset));
            self.map.observe(
                index,
                &model,
                &reading.observation(),
                &reading.covariance(),
            )?;
        }
        log::trace!(
            "cycle applied {} readings, effective sample size {:.1}",
            readings.len(),
            self.map.effective_sample_size()
        );
        self.map.resample();
        Ok(self.map.predict())
    }
}

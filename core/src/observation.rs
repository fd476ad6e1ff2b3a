//! Observation models for landmark measurements.
//!
//! An observation model maps a vehicle pose and a landmark position to the measurement a sensor
//! would report, and linearizes that mapping with respect to the landmark position. The landmark
//! Kalman update in [crate::landmark] is written against the [ObservationModel] trait only, so new
//! sensor types plug in without touching the update itself.
//!
//! Two models are provided:
//! - [HeadingPitchRange]: relative heading, pitch and slant range (sonar / stereo vision).
//! - [HeadingPitch]: relative heading and pitch only (monocular bearing).

use crate::{Pose, heading_difference};

use nalgebra::{Matrix2x3, Matrix3, SMatrix, SVector, Vector2, Vector3};

/// Horizontal range below which the heading and pitch gradients are treated as undefined.
pub const DEGENERATE_RANGE: f64 = 1e-9;

/// Generic observation model trait for `M`-dimensional landmark measurements.
pub trait ObservationModel<const M: usize>: Send + Sync {
    /// Expected measurement of `landmark` seen from `pose`.
    fn predict(&self, pose: &Pose, landmark: &Vector3<f64>) -> SVector<f64, M>;
    /// Jacobian of [ObservationModel::predict] with respect to the landmark position.
    fn jacobian(&self, pose: &Pose, landmark: &Vector3<f64>) -> SMatrix<f64, M, 3>;
    /// Innovation `actual - predicted`. Models with angular components override this to wrap them.
    fn residual(&self, actual: &SVector<f64, M>, predicted: &SVector<f64, M>) -> SVector<f64, M> {
        actual - predicted
    }
}

/// Relative geometry between the observed point and the vehicle.
struct Geometry {
    delta: Vector3<f64>,
    horizontal: f64,
    slant: f64,
}
impl Geometry {
    fn new(pose: &Pose, landmark: &Vector3<f64>, offset: &Vector3<f64>) -> Geometry {
        let delta = landmark + offset - pose.position();
        let horizontal = delta[0].hypot(delta[1]);
        let slant = delta.norm();
        Geometry {
            delta,
            horizontal,
            slant,
        }
    }
    fn heading(&self, pose: &Pose) -> f64 {
        heading_difference(self.delta[1].atan2(self.delta[0]), pose.heading)
    }
    fn pitch(&self) -> f64 {
        (-self.delta[2]).atan2(self.horizontal)
    }
    /// Heading and pitch gradient rows; zero when the landmark is directly above or below.
    fn angular_rows(&self) -> Matrix2x3<f64> {
        if self.horizontal < DEGENERATE_RANGE {
            return Matrix2x3::zeros();
        }
        let (dn, de, dd) = (self.delta[0], self.delta[1], self.delta[2]);
        let r = self.horizontal;
        let r2 = r * r;
        let rho2 = self.slant * self.slant;
        Matrix2x3::new(
            -de / r2,
            dn / r2,
            0.0,
            dd * dn / (r * rho2),
            dd * de / (r * rho2),
            -r / rho2,
        )
    }
}

/// Heading / pitch / range observation of a landmark.
///
/// The measurement vector is `[heading, pitch, range]`:
/// - heading: bearing of the observed point relative to the vehicle heading, wrapped to (-π, π]
/// - pitch: `atan2(-Δd, horizontal range)`, positive when the point is shallower than the vehicle
/// - range: Euclidean distance
///
/// `offset` is the position of the observed point relative to the landmark's tracked position
/// (for example a buoy component), expressed in the north/east/depth frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HeadingPitchRange {
    pub offset: Vector3<f64>,
}
impl HeadingPitchRange {
    pub fn new() -> HeadingPitchRange {
        HeadingPitchRange::default()
    }
    pub fn with_offset(offset: Vector3<f64>) -> HeadingPitchRange {
        HeadingPitchRange { offset }
    }
}
impl ObservationModel<3> for HeadingPitchRange {
    fn predict(&self, pose: &Pose, landmark: &Vector3<f64>) -> Vector3<f64> {
        let geometry = Geometry::new(pose, landmark, &self.offset);
        Vector3::new(geometry.heading(pose), geometry.pitch(), geometry.slant)
    }
    /// Jacobian rows:
    ///
    /// $$
    /// H = \begin{bmatrix}
    /// -\Delta_e / r^2 & \Delta_n / r^2 & 0 \\\\
    /// \Delta_d \Delta_n / (r \rho^2) & \Delta_d \Delta_e / (r \rho^2) & -r / \rho^2 \\\\
    /// \Delta_n / \rho & \Delta_e / \rho & \Delta_d / \rho
    /// \end{bmatrix}
    /// $$
    ///
    /// with $r$ the horizontal and $\rho$ the slant range. Degenerate rows are zero.
    fn jacobian(&self, pose: &Pose, landmark: &Vector3<f64>) -> Matrix3<f64> {
        let geometry = Geometry::new(pose, landmark, &self.offset);
        let angular = geometry.angular_rows();
        let mut jacobian = Matrix3::zeros();
        jacobian.fixed_view_mut::<2, 3>(0, 0).copy_from(&angular);
        if geometry.slant >= DEGENERATE_RANGE {
            let range_row = geometry.delta.transpose() / geometry.slant;
            jacobian.set_row(2, &range_row);
        }
        jacobian
    }
    fn residual(&self, actual: &Vector3<f64>, predicted: &Vector3<f64>) -> Vector3<f64> {
        let mut residual = actual - predicted;
        residual[0] = heading_difference(actual[0], predicted[0]);
        residual
    }
}

/// Bearing-only observation: `[heading, pitch]` without range.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HeadingPitch {
    pub offset: Vector3<f64>,
}
impl ObservationModel<2> for HeadingPitch {
    fn predict(&self, pose: &Pose, landmark: &Vector3<f64>) -> Vector2<f64> {
        let geometry = Geometry::new(pose, landmark, &self.offset);
        Vector2::new(geometry.heading(pose), geometry.pitch())
    }
    fn jacobian(&self, pose: &Pose, landmark: &Vector3<f64>) -> Matrix2x3<f64> {
        Geometry::new(pose, landmark, &self.offset).angular_rows()
    }
    fn residual(&self, actual: &Vector2<f64>, predicted: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new(
            heading_difference(actual[0], predicted[0]),
            actual[1] - predicted[1],
        )
    }
}

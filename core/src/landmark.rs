//! Per-particle landmark estimator.
//!
//! Every particle tracks each registered landmark with its own Extended Kalman Filter over the
//! landmark's 3D position. Conditioned on the particle's pose the landmarks are independent, which
//! is what keeps each filter this small.

use crate::Pose;
use crate::linalg::symmetrize;
use crate::observation::ObservationModel;

use nalgebra::linalg::Cholesky;
use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use std::fmt::{self, Display};

/// Extended Kalman Filter tracking one landmark position within one particle.
#[derive(Clone, Debug, PartialEq)]
pub struct LandmarkEstimator {
    /// Position estimate `[north, east, depth]`
    pub mean: Vector3<f64>,
    /// Position covariance
    pub covariance: Matrix3<f64>,
    /// Norm of the innovation from the most recent update
    pub residual_norm: f64,
}
impl Display for LandmarkEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LandmarkEstimator {{ mean: [{:.3}, {:.3}, {:.3}], variance: [{:.4}, {:.4}, {:.4}], residual: {:.4} }}",
            self.mean[0],
            self.mean[1],
            self.mean[2],
            self.covariance[(0, 0)],
            self.covariance[(1, 1)],
            self.covariance[(2, 2)],
            self.residual_norm
        )
    }
}
impl LandmarkEstimator {
    pub fn new(mean: Vector3<f64>, covariance: Matrix3<f64>) -> LandmarkEstimator {
        LandmarkEstimator {
            mean,
            covariance: symmetrize(&covariance),
            residual_norm: 0.0,
        }
    }
    /// Measurement update of the landmark position given an observation taken from `pose`.
    ///
    /// The update consists of:
    /// 1. Predicted measurement $\hat{z} = h(x, l)$ and Jacobian $H = \partial h / \partial l$
    /// 2. Innovation $y = z \ominus \hat{z}$ (the model wraps angular components)
    /// 3. Innovation covariance $S = H P H^T + R$
    /// 4. Gain $K = P H^T S^{-1}$, solved through a Cholesky factorization of $S$
    /// 5. $l \leftarrow l + K y$, $P \leftarrow (I - K H) P$, then $P$ is symmetrized
    ///
    /// If $S$ is not positive definite (for instance a zero measurement noise combined with a
    /// degenerate, all-zero Jacobian) steps 4-5 are skipped and the landmark belief is left as is.
    ///
    /// # Returns
    /// The innovation $y$. Its norm is also kept in [LandmarkEstimator::residual_norm].
    pub fn update<const M: usize, O>(
        &mut self,
        model: &O,
        pose: &Pose,
        observation: &SVector<f64, M>,
        noise: &SMatrix<f64, M, M>,
    ) -> SVector<f64, M>
    where
        O: ObservationModel<M> + ?Sized,
    {
        let predicted = model.predict(pose, &self.mean);
        let jacobian = model.jacobian(pose, &self.mean);
        let innovation = model.residual(observation, &predicted);
        self.residual_norm = innovation.norm();

        let innovation_cov = symmetrize(&(jacobian * self.covariance * jacobian.transpose() + noise));
        let Some(chol) = Cholesky::new(innovation_cov) else {
            log::warn!("innovation covariance not positive definite, skipping landmark update");
            return innovation;
        };
        // S is symmetric, so K^T = S^{-1} H P.
        let gain = chol.solve(&(jacobian * self.covariance)).transpose();
        self.mean += gain * innovation;
        self.covariance = symmetrize(&((Matrix3::identity() - gain * jacobian) * self.covariance));
        innovation
    }
    /// Per-axis variance (diagonal of the covariance).
    pub fn variance(&self) -> Vector3<f64> {
        self.covariance.diagonal()
    }
}

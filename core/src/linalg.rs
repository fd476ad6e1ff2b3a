//! Linear algebra helpers for robust covariance square roots and covariance hygiene.
//!
//! Public API:
//!     pub fn matrix_square_root(matrix: &DMatrix<f64>) -> DMatrix<f64>
//!     pub fn symmetrize(m: &SMatrix<f64, D, D>) -> SMatrix<f64, D, D>
//!     pub fn is_positive_semidefinite(m: &Matrix3<f64>, tolerance: f64) -> bool
//!
//! A control covariance mixes position variances in m² with attitude variances in rad², often six
//! or more orders of magnitude apart, and is frequently rank deficient (an axis with no noise).
//! The square root therefore:
//! 0) returns a zero root for an exactly zero matrix (noise-free motion stays noise-free)
//! 1) symmetrizes P ← 0.5 (P + Pᵀ)
//! 2) tries Cholesky
//! 3) retries Cholesky with diagonal loading scaled to the largest variance
//! 4) falls back to S = U * sqrt(max(Λ, 0)) * Uᵀ

use nalgebra::linalg::{Cholesky, SymmetricEigen};
use nalgebra::{DMatrix, Matrix3, SMatrix};

/// Diagonal loading tried in turn, as a fraction of the largest diagonal entry.
const RELATIVE_LOADING: [f64; 4] = [1e-12, 1e-10, 1e-8, 1e-6];

/// Compute a robust square root `S` such that approximately `matrix ≈ S * Sᵀ`.
///
/// The Cholesky factor is returned when the matrix is positive definite, possibly after a diagonal
/// loading of at most `1e-6` times its largest variance. Otherwise the symmetric root from the
/// eigen decomposition is returned with negative eigenvalues clamped to zero.
///
/// # Panics
/// If `matrix` is not square.
pub fn matrix_square_root(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    assert!(
        matrix.is_square(),
        "matrix_square_root: matrix must be square"
    );
    if matrix.iter().all(|v| *v == 0.0) {
        return DMatrix::zeros(matrix.nrows(), matrix.ncols());
    }
    let p = 0.5 * (matrix + matrix.transpose());
    cholesky_root(&p, 0.0)
        .or_else(|| loaded_cholesky_root(&p))
        .unwrap_or_else(|| clamped_eigen_root(&p))
}
/// Symmetrize a matrix: P ← 0.5 (P + Pᵀ)
///
/// Simple matrix symmetrization function that reduces round-off errors associated
/// with floating point arithmetic. Applied after every Kalman covariance update.
#[inline]
pub fn symmetrize<const D: usize>(m: &SMatrix<f64, D, D>) -> SMatrix<f64, D, D> {
    (m + m.transpose()) * 0.5
}
/// Check that a 3×3 covariance is symmetric and has no eigenvalue below `-tolerance`.
pub fn is_positive_semidefinite(m: &Matrix3<f64>, tolerance: f64) -> bool {
    let asymmetry = (m - m.transpose()).abs().max();
    if asymmetry > tolerance {
        return false;
    }
    let eigen = SymmetricEigen::new(*m);
    eigen.eigenvalues.iter().all(|l| *l >= -tolerance)
}
/// Lower Cholesky factor of `p + loading·I`, or None if that is not positive definite.
fn cholesky_root(p: &DMatrix<f64>, loading: f64) -> Option<DMatrix<f64>> {
    let mut loaded = p.clone();
    loaded.set_diagonal(&(p.diagonal().add_scalar(loading)));
    Cholesky::new(loaded).map(|ch| ch.l().into_owned())
}
/// First Cholesky factor that succeeds over [RELATIVE_LOADING], scaled by the largest variance.
fn loaded_cholesky_root(p: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let scale = p.diagonal().amax();
    if scale == 0.0 {
        return None;
    }
    RELATIVE_LOADING
        .iter()
        .find_map(|fraction| cholesky_root(p, fraction * scale))
}
fn clamped_eigen_root(p: &DMatrix<f64>) -> DMatrix<f64> {
    let se = SymmetricEigen::new(p.clone());
    let roots = se.eigenvalues.map(|l| l.max(0.0).sqrt());
    let u = se.eigenvectors;
    &u * DMatrix::<f64>::from_diagonal(&roots) * u.transpose()
}

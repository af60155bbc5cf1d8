use nalgebra::{DMatrix, DVector, Matrix3, Vector2};
use tracing::debug;

use super::{smallest_singular_vector, solve_least_squares};
use crate::error::{FitError, Result};

/// Solver used for the 2D affine fit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffineSolver {
    /// Direct least squares on the six affine unknowns
    LeastSquares,
    /// Nullspace of the stacked homogeneous system, projected onto the
    /// affine subspace
    Svd,
}

const MIN_POINTS: usize = 3;

/// Fit the homogeneous 3x3 affine transform mapping `observed` to `truth`.
///
/// Used to take out the small per-image drift left behind after bundle
/// adjustment: `observed` are reprojected image points, `truth` the measured
/// ones, and the returned matrix has last row (0, 0, 1).
pub fn fit_affine(
    observed: &[Vector2<f64>],
    truth: &[Vector2<f64>],
    solver: AffineSolver,
) -> Result<Matrix3<f64>> {
    let n = observed.len();
    if n < MIN_POINTS || truth.len() != n {
        return Err(FitError::InsufficientData {
            needed: MIN_POINTS,
            got: n.min(truth.len()),
        }
        .into());
    }
    debug!(points = n, ?solver, "affine fit");

    match solver {
        AffineSolver::LeastSquares => fit_least_squares(observed, truth),
        AffineSolver::Svd => fit_svd(observed, truth),
    }
}

fn fit_least_squares(observed: &[Vector2<f64>], truth: &[Vector2<f64>]) -> Result<Matrix3<f64>> {
    let n = observed.len();
    let mut a = DMatrix::zeros(2 * n, 6);
    let mut b = DVector::zeros(2 * n);

    for (i, (o, t)) in observed.iter().zip(truth.iter()).enumerate() {
        let r0 = 2 * i;
        let r1 = 2 * i + 1;

        a[(r0, 0)] = o.x;
        a[(r0, 1)] = o.y;
        a[(r0, 2)] = 1.0;
        b[r0] = t.x;

        a[(r1, 3)] = o.x;
        a[(r1, 4)] = o.y;
        a[(r1, 5)] = 1.0;
        b[r1] = t.y;
    }

    let x = solve_least_squares(a, b)?;

    Ok(Matrix3::new(
        x[0], x[1], x[2],
        x[3], x[4], x[5],
        0.0, 0.0, 1.0,
    ))
}

fn fit_svd(observed: &[Vector2<f64>], truth: &[Vector2<f64>]) -> Result<Matrix3<f64>> {
    let n = observed.len();
    let mut a = DMatrix::zeros(2 * n, 9);

    for (i, (o, t)) in observed.iter().zip(truth.iter()).enumerate() {
        let (x, y) = (o.x, o.y);
        let (u, v) = (t.x, t.y);

        let r0 = 2 * i;
        let r1 = 2 * i + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    // Pad so the SVD exposes the full right-singular basis
    if a.nrows() < a.ncols() {
        let rows = a.nrows();
        let cols = a.ncols();
        let mut padded = DMatrix::zeros(cols, cols);
        padded.view_mut((0, 0), (rows, cols)).copy_from(&a);
        a = padded;
    }

    let h = smallest_singular_vector(a)?;
    if h[8].abs() < 1e-12 {
        return Err(FitError::RankDeficient { rank: 8, unknowns: 9 }.into());
    }

    // The data is affine up to noise; the perspective entries carry only
    // residual, so the solution is projected onto the affine subspace.
    Ok(Matrix3::new(
        h[0] / h[8], h[1] / h[8], h[2] / h[8],
        h[3] / h[8], h[4] / h[8], h[5] / h[8],
        0.0, 0.0, 1.0,
    ))
}

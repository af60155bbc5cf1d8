use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::error::{FitError, Result};

/// Relative singular-value cutoff below which the design matrix is treated
/// as rank deficient. Exact degeneracies (colinear or coplanar samples)
/// land at machine-epsilon level; honest rational fits of non-polynomial
/// data stay above ~1e-9 even when the data is nearly low-order.
const RANK_TOLERANCE: f64 = 1e-12;

/// Solve the overdetermined system `A x = b` by SVD.
///
/// Fails with a rank error when the design matrix does not constrain every
/// unknown. Retrying a deterministic solve is pointless, so the failure is
/// surfaced immediately.
pub(crate) fn solve_least_squares(a: DMatrix<f64>, b: DVector<f64>) -> Result<DVector<f64>> {
    let unknowns = a.ncols();
    let rows = a.nrows();
    if rows < unknowns {
        return Err(FitError::InsufficientData {
            needed: unknowns,
            got: rows,
        }
        .into());
    }

    let svd = a.svd(true, true);
    let max_sv = svd.singular_values.max();
    let eps = max_sv * RANK_TOLERANCE;
    let rank = svd.rank(eps);
    debug!(rows, unknowns, rank, max_sv, "least-squares solve");

    if rank < unknowns {
        return Err(FitError::RankDeficient { rank, unknowns }.into());
    }

    let x = svd
        .solve(&b, eps)
        .map_err(|_| FitError::RankDeficient { rank, unknowns })?;
    Ok(DVector::from_column_slice(x.as_slice()))
}

/// Right singular vector for the smallest singular value of `A`, the
/// minimizer of |A x| over unit x. Used for nullspace problems (`A x = 0`).
pub(crate) fn smallest_singular_vector(a: DMatrix<f64>) -> Result<DVector<f64>> {
    let cols = a.ncols();
    if a.nrows() < cols {
        return Err(FitError::InsufficientData {
            needed: cols,
            got: a.nrows(),
        }
        .into());
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t.as_ref().expect("svd requested v_t");
    let row = v_t.row(v_t.nrows() - 1);
    Ok(DVector::from_iterator(cols, row.iter().copied()))
}

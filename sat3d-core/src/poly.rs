//! Multivariate polynomial basis shared by the camera models.
//!
//! The fit and evaluation paths both expand a normalized (lon, lat, height)
//! triple into monomials of total degree <= 3, in a fixed graded order. RPC
//! files store the same 20 coefficients in a different, protocol-mandated
//! order; the two permutation tables below translate between them and must
//! never be edited independently.

use nalgebra::{DMatrix, DVector, Vector3};

/// Polynomial order of a rational polynomial model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolyOrder {
    Linear,
    Quadratic,
    Cubic,
}

impl PolyOrder {
    /// Number of monomials up to this total degree in three variables
    pub fn term_count(self) -> usize {
        match self {
            PolyOrder::Linear => 4,
            PolyOrder::Quadratic => 10,
            PolyOrder::Cubic => 20,
        }
    }

    pub fn degree(self) -> u32 {
        match self {
            PolyOrder::Linear => 1,
            PolyOrder::Quadratic => 2,
            PolyOrder::Cubic => 3,
        }
    }
}

/// Full cubic expansion length, and the coefficient count of every RPC file
pub const RPC_TERM_COUNT: usize = 20;

/// Exponent triples (lon, lat, height) in graded order: constant, degree-1,
/// degree-2, degree-3, each degree block in combinations-with-replacement
/// order. `basis_row` and `design_matrix` emit terms in exactly this order.
const EXPONENTS: [(u8, u8, u8); RPC_TERM_COUNT] = [
    (0, 0, 0),
    (1, 0, 0),
    (0, 1, 0),
    (0, 0, 1),
    (2, 0, 0),
    (1, 1, 0),
    (1, 0, 1),
    (0, 2, 0),
    (0, 1, 1),
    (0, 0, 2),
    (3, 0, 0),
    (2, 1, 0),
    (2, 0, 1),
    (1, 2, 0),
    (1, 1, 1),
    (1, 0, 2),
    (0, 3, 0),
    (0, 2, 1),
    (0, 1, 2),
    (0, 0, 3),
];

/// RPC file term order is 1, L, P, H, LP, LH, PH, L2, P2, H2, PLH, L3, LP2,
/// LH2, L2P, P3, PH2, L2H, P2H, H3 with L = lon, P = lat, H = height.
/// `RPC_TO_BASIS[i]` is the graded-order slot of the i-th file term.
pub const RPC_TO_BASIS: [usize; RPC_TERM_COUNT] = [
    0, 1, 2, 3, 5, 6, 8, 4, 7, 9, 14, 10, 13, 15, 11, 16, 18, 12, 17, 19,
];

/// Inverse of `RPC_TO_BASIS`: the file slot of the j-th graded-order term
pub const BASIS_TO_RPC: [usize; RPC_TERM_COUNT] = [
    0, 1, 2, 3, 7, 4, 5, 8, 6, 9, 11, 14, 17, 12, 10, 13, 15, 18, 16, 19,
];

/// Expand one normalized point into its monomial row
pub fn basis_row(point: &Vector3<f64>, order: PolyOrder) -> DVector<f64> {
    let n = order.term_count();
    let mut row = DVector::zeros(n);
    for (j, &(i, k, m)) in EXPONENTS[..n].iter().enumerate() {
        row[j] = point.x.powi(i as i32) * point.y.powi(k as i32) * point.z.powi(m as i32);
    }
    row
}

/// Expand a batch of normalized points into an N x term_count design matrix
pub fn design_matrix(points: &[Vector3<f64>], order: PolyOrder) -> DMatrix<f64> {
    let n = order.term_count();
    let mut m = DMatrix::zeros(points.len(), n);
    for (r, p) in points.iter().enumerate() {
        for (j, &(i, k, l)) in EXPONENTS[..n].iter().enumerate() {
            m[(r, j)] = p.x.powi(i as i32) * p.y.powi(k as i32) * p.z.powi(l as i32);
        }
    }
    m
}

/// Reorder a file-order coefficient array into graded basis order
pub fn rpc_to_basis_order(rpc: &[f64; RPC_TERM_COUNT]) -> [f64; RPC_TERM_COUNT] {
    let mut basis = [0.0; RPC_TERM_COUNT];
    for (i, &c) in rpc.iter().enumerate() {
        basis[RPC_TO_BASIS[i]] = c;
    }
    basis
}

/// Reorder a graded-basis coefficient array into file order
pub fn basis_to_rpc_order(basis: &[f64; RPC_TERM_COUNT]) -> [f64; RPC_TERM_COUNT] {
    let mut rpc = [0.0; RPC_TERM_COUNT];
    for (j, &c) in basis.iter().enumerate() {
        rpc[BASIS_TO_RPC[j]] = c;
    }
    rpc
}

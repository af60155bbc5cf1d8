//! Linear estimation utilities: shared least squares, affine fitting,
//! camera resection

mod affine;
mod lstsq;
mod resection;

pub use affine::{fit_affine, AffineSolver};
pub use resection::{pinhole_from_rpc, resect, ResectedCamera};

pub(crate) use lstsq::{smallest_singular_vector, solve_least_squares};

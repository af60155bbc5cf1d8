//! Physical camera models and projections

mod distortion;
mod pinhole;

pub use distortion::Distortion;
pub use pinhole::{orthonormality_residual, PinholeCamera, PinholeParams};

use nalgebra::Vector2;

use crate::error::Result;
use crate::geodesy::Cartesian;

/// Ground-to-image projection, implemented by every camera family
pub trait GroundCamera {
    /// Project a geocentric Cartesian ground point to pixel coordinates
    fn ground_to_image(&self, ground: &Cartesian) -> Result<Vector2<f64>>;
}

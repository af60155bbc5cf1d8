//! Geographic <-> geocentric coordinate transformations

mod transforms;

pub use transforms::{
    cartesian_to_geodetic, cartesian_to_geodetic_with_tolerance, geodetic_to_cartesian,
    Cartesian, Ellipsoid, Geodetic, DEFAULT_TOLERANCE,
};

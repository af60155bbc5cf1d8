pub mod camera;
pub mod error;
pub mod fit;
pub mod geodesy;
pub mod poly;
pub mod sensor;

pub use camera::{Distortion, GroundCamera, PinholeCamera, PinholeParams};
pub use error::{
    ConfigError, CoordinateError, FitError, GeomError, ProjectionError, Result,
};
pub use fit::{fit_affine, pinhole_from_rpc, resect, AffineSolver};
pub use geodesy::{Ellipsoid, Geodetic};
pub use sensor::rpc::{RpcCoefficients, RpcModel, RpcNormalization, RpcSolver};

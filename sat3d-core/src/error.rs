use thiserror::Error;

/// Common errors across the camera-geometry core
#[derive(Error, Debug)]
pub enum GeomError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("fit error: {0}")]
    Fit(#[from] FitError),

    #[error("projection error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("coordinate transform error: {0}")]
    Coordinate(#[from] CoordinateError),
}

/// Malformed or incomplete camera parameters
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("rectangular pixels unsupported: fu = {fu}, fv = {fv}")]
    RectangularPixels { fu: f64, fv: f64 },

    #[error("normalization offsets/scales not set ({axis} scale is zero)")]
    MissingNormalization { axis: &'static str },

    #[error("forward RPC coefficients not fitted or loaded")]
    ForwardNotComputed,

    #[error("inverse RPC coefficients not computed; call compute_inverse or load them from file")]
    InverseNotComputed,

    #[error("invalid camera parameter: {0}")]
    InvalidParameter(String),
}

/// Degenerate or undersized input to a least-squares fit
#[derive(Error, Debug)]
pub enum FitError {
    #[error("insufficient data: fit needs at least {needed} points, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("rank-deficient design matrix: rank {rank} < {unknowns} unknowns")]
    RankDeficient { rank: usize, unknowns: usize },
}

#[derive(Error, Debug)]
pub enum ProjectionError {
    #[error("point behind camera")]
    BehindCamera,

    #[error("rational polynomial denominator vanishes at evaluation point")]
    ZeroDenominator,

    #[error("distortion removal did not converge after {0} iterations")]
    NoConvergence(usize),
}

#[derive(Error, Debug)]
pub enum CoordinateError {
    #[error("invalid longitude: {0} (must be -360 to 360)")]
    InvalidLongitude(f64),

    #[error("invalid latitude: {0} (must be -360 to 360)")]
    InvalidLatitude(f64),

    #[error("ellipsoid inversion did not converge after {iterations} iterations (tolerance {tolerance})")]
    NoConvergence { iterations: usize, tolerance: f64 },
}

pub type Result<T> = std::result::Result<T, GeomError>;

use serde::{Deserialize, Serialize};

use crate::error::{ProjectionError, Result};

/// Lens distortion attached to a pinhole camera.
///
/// Tsai operates on principal-point offsets normalized by focal length;
/// Photometrix operates in physical millimeters relative to its own
/// principal offsets (xp, yp). The camera converts to the right frame
/// before calling in here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Distortion {
    None,
    Tsai {
        k1: f64,
        k2: f64,
        p1: f64,
        p2: f64,
    },
    Photometrix {
        xp: f64,
        yp: f64,
        k1: f64,
        k2: f64,
        k3: f64,
        p1: f64,
        p2: f64,
        b1: f64,
        b2: f64,
    },
}

const MAX_ITERATIONS: usize = 20;
const CONVERGENCE_TOL: f64 = 1e-12;

impl Distortion {
    /// Map undistorted centered coordinates to distorted ones.
    ///
    /// A point sitting exactly on the principal point along an axis passes
    /// through unmodified on that axis.
    pub(crate) fn distort(&self, x: f64, y: f64) -> (f64, f64) {
        match *self {
            Distortion::None => (x, y),

            Distortion::Tsai { k1, k2, p1, p2 } => {
                let r2 = x * x + y * y;
                let radial = k1 * r2 + k2 * r2 * r2;

                let dx = if x == 0.0 {
                    0.0
                } else {
                    x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x)
                };
                let dy = if y == 0.0 {
                    0.0
                } else {
                    y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y
                };

                (x + dx, y + dy)
            }

            Distortion::Photometrix {
                k1,
                k2,
                k3,
                p1,
                p2,
                b1,
                b2,
                ..
            } => {
                let r2 = x * x + y * y;
                let radial = k1 * r2 + k2 * r2 * r2 + k3 * r2 * r2 * r2;

                let dx = if x == 0.0 {
                    0.0
                } else {
                    x * radial + p1 * (r2 + 2.0 * x * x) + 2.0 * p2 * x * y + b1 * x + b2 * y
                };
                let dy = if y == 0.0 {
                    0.0
                } else {
                    y * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * y * y)
                };

                (x + dx, y + dy)
            }
        }
    }

    /// Invert `distort` by Newton iteration with a finite-difference Jacobian
    pub(crate) fn undistort(&self, x_dist: f64, y_dist: f64) -> Result<(f64, f64)> {
        if matches!(self, Distortion::None) {
            return Ok((x_dist, y_dist));
        }

        let mut x = x_dist;
        let mut y = y_dist;

        for _ in 0..MAX_ITERATIONS {
            let (fx, fy) = self.distort(x, y);
            let rx = x_dist - fx;
            let ry = y_dist - fy;

            if rx.abs() < CONVERGENCE_TOL && ry.abs() < CONVERGENCE_TOL {
                return Ok((x, y));
            }

            let eps = 1e-7;
            let (fx_x, fy_x) = self.distort(x + eps, y);
            let (fx_y, fy_y) = self.distort(x, y + eps);

            let j11 = (fx_x - fx) / eps;
            let j21 = (fy_x - fy) / eps;
            let j12 = (fx_y - fx) / eps;
            let j22 = (fy_y - fy) / eps;

            let det = j11 * j22 - j12 * j21;
            if det.abs() < 1e-18 {
                return Err(ProjectionError::NoConvergence(MAX_ITERATIONS).into());
            }

            x += (j22 * rx - j12 * ry) / det;
            y += (-j21 * rx + j11 * ry) / det;
        }

        Err(ProjectionError::NoConvergence(MAX_ITERATIONS).into())
    }

    /// Tag written to (and read from) camera files
    pub fn file_tag(&self) -> &'static str {
        match self {
            Distortion::None => "NULL",
            Distortion::Tsai { .. } => "TSAI",
            Distortion::Photometrix { .. } => "Photometrix",
        }
    }
}

//! Rational polynomial camera model: evaluation, constrained least-squares
//! fitting, and inversion.
//!
//! Image points are (sample, line) pixel coordinates; ground points are
//! geographic (lon, lat, height). Both sides are affinely normalized into
//! roughly [-1, 1] before any polynomial is touched.

use nalgebra::{DMatrix, DVector, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::camera::GroundCamera;
use crate::error::{ConfigError, FitError, ProjectionError, Result};
use crate::fit::solve_least_squares;
use crate::geodesy::{cartesian_to_geodetic, Cartesian, Ellipsoid, Geodetic};
use crate::poly::{
    basis_row, basis_to_rpc_order, design_matrix, rpc_to_basis_order, PolyOrder, RPC_TERM_COUNT,
};

/// On-disk RPC record: 4 x 20 coefficients in file term order plus the ten
/// normalization scalars, exactly as every supported file format stores them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcCoefficients {
    pub line_num_coeff: [f64; RPC_TERM_COUNT],
    pub line_den_coeff: [f64; RPC_TERM_COUNT],
    pub samp_num_coeff: [f64; RPC_TERM_COUNT],
    pub samp_den_coeff: [f64; RPC_TERM_COUNT],

    pub lat_off: f64,
    pub lat_scale: f64,
    pub lon_off: f64,
    pub lon_scale: f64,
    pub height_off: f64,
    pub height_scale: f64,
    pub line_off: f64,
    pub line_scale: f64,
    pub samp_off: f64,
    pub samp_scale: f64,
}

/// Offset and scale for each of the five coordinate axes.
///
/// All scales must be nonzero before a model built from this can fit or
/// evaluate anything.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RpcNormalization {
    pub samp_off: f64,
    pub samp_scale: f64,
    pub line_off: f64,
    pub line_scale: f64,
    pub lon_off: f64,
    pub lon_scale: f64,
    pub lat_off: f64,
    pub lat_scale: f64,
    pub height_off: f64,
    pub height_scale: f64,
}

impl RpcNormalization {
    fn validate(&self) -> Result<()> {
        let axes = [
            ("sample", self.samp_scale),
            ("line", self.line_scale),
            ("longitude", self.lon_scale),
            ("latitude", self.lat_scale),
            ("height", self.height_scale),
        ];
        for (axis, scale) in axes {
            if scale == 0.0 {
                return Err(ConfigError::MissingNormalization { axis }.into());
            }
        }
        Ok(())
    }

    /// Midrange/half-range normalization from a correspondence sample, the
    /// usual seed before fitting a fresh model
    pub fn from_samples(ground: &[Geodetic], image: &[Vector2<f64>]) -> Result<Self> {
        if ground.len() < 2 || image.len() != ground.len() {
            return Err(FitError::InsufficientData {
                needed: 2,
                got: ground.len().min(image.len()),
            }
            .into());
        }

        fn span(values: impl Iterator<Item = f64> + Clone) -> (f64, f64) {
            let min = values.clone().fold(f64::INFINITY, f64::min);
            let max = values.fold(f64::NEG_INFINITY, f64::max);
            let off = 0.5 * (min + max);
            let half = 0.5 * (max - min);
            (off, if half > 0.0 { half } else { 1.0 })
        }

        let (lon_off, lon_scale) = span(ground.iter().map(|g| g.lon));
        let (lat_off, lat_scale) = span(ground.iter().map(|g| g.lat));
        let (height_off, height_scale) = span(ground.iter().map(|g| g.height));
        let (samp_off, samp_scale) = span(image.iter().map(|p| p.x));
        let (line_off, line_scale) = span(image.iter().map(|p| p.y));

        Ok(Self {
            samp_off,
            samp_scale,
            line_off,
            line_scale,
            lon_off,
            lon_scale,
            lat_off,
            lat_scale,
            height_off,
            height_scale,
        })
    }

    fn normalize_ground(&self, g: &Geodetic) -> Vector3<f64> {
        Vector3::new(
            (g.lon - self.lon_off) / self.lon_scale,
            (g.lat - self.lat_off) / self.lat_scale,
            (g.height - self.height_off) / self.height_scale,
        )
    }

    fn normalize_image(&self, p: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new(
            (p.x - self.samp_off) / self.samp_scale,
            (p.y - self.line_off) / self.line_scale,
        )
    }

    fn denormalize_image(&self, samp_n: f64, line_n: f64) -> Vector2<f64> {
        Vector2::new(
            samp_n * self.samp_scale + self.samp_off,
            line_n * self.line_scale + self.line_off,
        )
    }
}

/// Least-squares variant used for coefficient estimation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcSolver {
    /// Two independent solves, one per image axis
    PerAxis,
    /// One stacked solve across both axes; larger, but better conditioned
    /// on sparse samples
    Joint,
}

/// Four polynomial coefficient vectors for one mapping direction, stored in
/// graded basis order. Terms above the fitted order stay zero; denominators
/// keep a leading 1 by construction of the solver.
#[derive(Debug, Clone)]
struct RationalPolynomials {
    x_num: [f64; RPC_TERM_COUNT],
    x_den: [f64; RPC_TERM_COUNT],
    y_num: [f64; RPC_TERM_COUNT],
    y_den: [f64; RPC_TERM_COUNT],
}

const DENOMINATOR_EPS: f64 = 1e-10;

impl RationalPolynomials {
    fn eval(&self, point: &Vector3<f64>) -> Result<(f64, f64)> {
        let row = basis_row(point, PolyOrder::Cubic);
        let dot = |c: &[f64; RPC_TERM_COUNT]| -> f64 {
            c.iter().zip(row.iter()).map(|(a, b)| a * b).sum()
        };

        let x_den = dot(&self.x_den);
        let y_den = dot(&self.y_den);
        if x_den.abs() < DENOMINATOR_EPS || y_den.abs() < DENOMINATOR_EPS {
            return Err(ProjectionError::ZeroDenominator.into());
        }

        Ok((dot(&self.x_num) / x_den, dot(&self.y_num) / y_den))
    }
}

/// Rational polynomial camera.
///
/// Built empty around a normalization and populated by `fit`, or loaded
/// whole from a file record. The inverse (image + height to ground) mapping
/// is an explicit separate state: absent until computed or loaded.
#[derive(Debug, Clone)]
pub struct RpcModel {
    normalization: RpcNormalization,
    forward: Option<RationalPolynomials>,
    inverse: Option<RationalPolynomials>,
}

/// Inverse-fit sampling grid: 9 steps per axis over the normalized volume
const INVERSE_GRID_STEPS: usize = 9;
const INVERSE_GRID_PLANAR: f64 = 1.1;
const INVERSE_GRID_HEIGHT: f64 = 0.3;

impl RpcModel {
    /// Empty model ready to be fitted
    pub fn with_normalization(normalization: RpcNormalization) -> Self {
        Self {
            normalization,
            forward: None,
            inverse: None,
        }
    }

    /// Model from a file record (forward direction only)
    pub fn from_coefficients(c: &RpcCoefficients) -> Self {
        Self {
            normalization: RpcNormalization {
                samp_off: c.samp_off,
                samp_scale: c.samp_scale,
                line_off: c.line_off,
                line_scale: c.line_scale,
                lon_off: c.lon_off,
                lon_scale: c.lon_scale,
                lat_off: c.lat_off,
                lat_scale: c.lat_scale,
                height_off: c.height_off,
                height_scale: c.height_scale,
            },
            forward: Some(RationalPolynomials {
                x_num: rpc_to_basis_order(&c.samp_num_coeff),
                x_den: rpc_to_basis_order(&c.samp_den_coeff),
                y_num: rpc_to_basis_order(&c.line_num_coeff),
                y_den: rpc_to_basis_order(&c.line_den_coeff),
            }),
            inverse: None,
        }
    }

    /// Export the forward model as a file record
    pub fn to_coefficients(&self) -> Result<RpcCoefficients> {
        let forward = self.forward.as_ref().ok_or(ConfigError::ForwardNotComputed)?;
        let n = &self.normalization;
        Ok(RpcCoefficients {
            line_num_coeff: basis_to_rpc_order(&forward.y_num),
            line_den_coeff: basis_to_rpc_order(&forward.y_den),
            samp_num_coeff: basis_to_rpc_order(&forward.x_num),
            samp_den_coeff: basis_to_rpc_order(&forward.x_den),
            lat_off: n.lat_off,
            lat_scale: n.lat_scale,
            lon_off: n.lon_off,
            lon_scale: n.lon_scale,
            height_off: n.height_off,
            height_scale: n.height_scale,
            line_off: n.line_off,
            line_scale: n.line_scale,
            samp_off: n.samp_off,
            samp_scale: n.samp_scale,
        })
    }

    pub fn normalization(&self) -> &RpcNormalization {
        &self.normalization
    }

    pub fn has_forward(&self) -> bool {
        self.forward.is_some()
    }

    pub fn has_inverse(&self) -> bool {
        self.inverse.is_some()
    }

    /// Minimum correspondence count for a fit at `order`
    pub fn min_points(order: PolyOrder) -> usize {
        2 * order.term_count() - 1
    }

    /// Estimate the forward coefficients from ground/image correspondences.
    ///
    /// Each denominator's constant term is fixed to 1 by eliminating its
    /// column from the system, so the solve is for 2F-1 unknowns per axis.
    pub fn fit(
        &mut self,
        ground: &[Geodetic],
        image: &[Vector2<f64>],
        order: PolyOrder,
        solver: RpcSolver,
    ) -> Result<()> {
        self.normalization.validate()?;
        if image.len() != ground.len() {
            return Err(ConfigError::InvalidParameter(format!(
                "correspondence length mismatch: {} ground vs {} image",
                ground.len(),
                image.len()
            ))
            .into());
        }

        let points_n: Vec<Vector3<f64>> = ground
            .iter()
            .map(|g| self.normalization.normalize_ground(g))
            .collect();
        let image_n: Vec<Vector2<f64>> = image
            .iter()
            .map(|p| self.normalization.normalize_image(p))
            .collect();
        let x_n: Vec<f64> = image_n.iter().map(|p| p.x).collect();
        let y_n: Vec<f64> = image_n.iter().map(|p| p.y).collect();

        self.forward = Some(fit_rational(&points_n, &x_n, &y_n, order, solver)?);
        // A previously computed inverse no longer matches the new forward fit
        self.inverse = None;
        Ok(())
    }

    /// Fit the inverse mapping (image + height to ground) by sampling a
    /// fixed grid in normalized space through the forward model
    pub fn compute_inverse(&mut self, order: PolyOrder, solver: RpcSolver) -> Result<()> {
        let forward = self.forward.as_ref().ok_or(ConfigError::ForwardNotComputed)?;

        let steps = INVERSE_GRID_STEPS;
        let axis = |i: usize, half: f64| -> f64 {
            -half + 2.0 * half * (i as f64) / ((steps - 1) as f64)
        };

        let mut input = Vec::with_capacity(steps * steps * steps);
        let mut lon_n = Vec::with_capacity(steps * steps * steps);
        let mut lat_n = Vec::with_capacity(steps * steps * steps);

        for i in 0..steps {
            for j in 0..steps {
                for k in 0..steps {
                    let g = Vector3::new(
                        axis(i, INVERSE_GRID_PLANAR),
                        axis(j, INVERSE_GRID_PLANAR),
                        axis(k, INVERSE_GRID_HEIGHT),
                    );
                    // A denominator root inside the sampled volume only
                    // shrinks the sample; it does not abort the fit
                    match forward.eval(&g) {
                        Ok((samp_n, line_n)) => {
                            input.push(Vector3::new(samp_n, line_n, g.z));
                            lon_n.push(g.x);
                            lat_n.push(g.y);
                        }
                        Err(_) => continue,
                    }
                }
            }
        }
        debug!(samples = input.len(), "inverse RPC grid");

        self.inverse = Some(fit_rational(&input, &lon_n, &lat_n, order, solver)?);
        Ok(())
    }

    /// Project geographic ground points to (sample, line) pixels
    pub fn project(&self, ground: &[Geodetic]) -> Result<Vec<Vector2<f64>>> {
        let forward = self.forward.as_ref().ok_or(ConfigError::ForwardNotComputed)?;
        self.normalization.validate()?;

        ground
            .iter()
            .map(|g| {
                let p = self.normalization.normalize_ground(g);
                let (samp_n, line_n) = forward.eval(&p)?;
                Ok(self.normalization.denormalize_image(samp_n, line_n))
            })
            .collect()
    }

    /// Map (sample, line) pixels at known heights back to ground
    pub fn unproject(&self, image: &[Vector2<f64>], heights: &[f64]) -> Result<Vec<Geodetic>> {
        let inverse = self.inverse.as_ref().ok_or(ConfigError::InverseNotComputed)?;
        self.normalization.validate()?;
        if heights.len() != image.len() {
            return Err(ConfigError::InvalidParameter(format!(
                "height count mismatch: {} image points vs {} heights",
                image.len(),
                heights.len()
            ))
            .into());
        }

        image
            .iter()
            .zip(heights.iter())
            .map(|(p, &h)| {
                let img_n = self.normalization.normalize_image(p);
                let h_n = (h - self.normalization.height_off) / self.normalization.height_scale;
                let (lon_n, lat_n) = inverse.eval(&Vector3::new(img_n.x, img_n.y, h_n))?;
                Ok(Geodetic {
                    lon: lon_n * self.normalization.lon_scale + self.normalization.lon_off,
                    lat: lat_n * self.normalization.lat_scale + self.normalization.lat_off,
                    height: h,
                })
            })
            .collect()
    }
}

impl GroundCamera for RpcModel {
    fn ground_to_image(&self, ground: &Cartesian) -> Result<Vector2<f64>> {
        let geo = cartesian_to_geodetic(ground, &Ellipsoid::WGS84)?;
        Ok(self.project(&[geo])?[0])
    }
}

/// Constrained least-squares estimation of one rational polynomial pair.
///
/// `points_n` are the normalized polynomial inputs, `x_n`/`y_n` the
/// normalized outputs for the two axes.
fn fit_rational(
    points_n: &[Vector3<f64>],
    x_n: &[f64],
    y_n: &[f64],
    order: PolyOrder,
    solver: RpcSolver,
) -> Result<RationalPolynomials> {
    let n = points_n.len();
    let f = order.term_count();
    let needed = 2 * f - 1;
    if n < needed {
        return Err(FitError::InsufficientData { needed, got: n }.into());
    }

    let m = design_matrix(points_n, order);
    debug!(points = n, terms = f, ?solver, "rational polynomial fit");

    let (x_sol, y_sol) = match solver {
        RpcSolver::PerAxis => (
            solve_axis(&m, x_n, f)?,
            solve_axis(&m, y_n, f)?,
        ),
        RpcSolver::Joint => solve_joint(&m, x_n, y_n, f)?,
    };

    Ok(RationalPolynomials {
        x_num: embed_numerator(&x_sol, f),
        x_den: embed_denominator(&x_sol, f),
        y_num: embed_numerator(&y_sol, f),
        y_den: embed_denominator(&y_sol, f),
    })
}

/// One axis: solve for [numerator; denominator tail] with the denominator
/// constant eliminated. Row i reads num(p_i) - r_i * (den(p_i) - 1) = r_i.
fn solve_axis(m: &DMatrix<f64>, r: &[f64], f: usize) -> Result<DVector<f64>> {
    let n = m.nrows();
    let unknowns = 2 * f - 1;
    let mut a = DMatrix::zeros(n, unknowns);
    let mut b = DVector::zeros(n);

    for i in 0..n {
        for j in 0..f {
            a[(i, j)] = m[(i, j)];
        }
        for j in 1..f {
            a[(i, f + j - 1)] = -r[i] * m[(i, j)];
        }
        b[i] = r[i];
    }

    solve_least_squares(a, b)
}

/// Both axes in one stacked system; the solution splits back per axis
fn solve_joint(
    m: &DMatrix<f64>,
    x_n: &[f64],
    y_n: &[f64],
    f: usize,
) -> Result<(DVector<f64>, DVector<f64>)> {
    let n = m.nrows();
    let per_axis = 2 * f - 1;
    let mut a = DMatrix::zeros(2 * n, 2 * per_axis);
    let mut b = DVector::zeros(2 * n);

    for i in 0..n {
        let r0 = 2 * i;
        let r1 = 2 * i + 1;
        for j in 0..f {
            a[(r0, j)] = m[(i, j)];
            a[(r1, per_axis + j)] = m[(i, j)];
        }
        for j in 1..f {
            a[(r0, f + j - 1)] = -x_n[i] * m[(i, j)];
            a[(r1, per_axis + f + j - 1)] = -y_n[i] * m[(i, j)];
        }
        b[r0] = x_n[i];
        b[r1] = y_n[i];
    }

    let sol = solve_least_squares(a, b)?;
    let x_sol = DVector::from_column_slice(&sol.as_slice()[..per_axis]);
    let y_sol = DVector::from_column_slice(&sol.as_slice()[per_axis..]);
    Ok((x_sol, y_sol))
}

fn embed_numerator(sol: &DVector<f64>, f: usize) -> [f64; RPC_TERM_COUNT] {
    let mut out = [0.0; RPC_TERM_COUNT];
    out[..f].copy_from_slice(&sol.as_slice()[..f]);
    out
}

fn embed_denominator(sol: &DVector<f64>, f: usize) -> [f64; RPC_TERM_COUNT] {
    let mut out = [0.0; RPC_TERM_COUNT];
    out[0] = 1.0;
    out[1..f].copy_from_slice(&sol.as_slice()[f..2 * f - 1]);
    out
}

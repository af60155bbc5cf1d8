use nalgebra::{Matrix3, Matrix3x4, Vector2, Vector3, Vector4};
use tracing::debug;

use super::distortion::Distortion;
use super::GroundCamera;
use crate::error::{ConfigError, ProjectionError, Result};
use crate::geodesy::{geodetic_to_cartesian, Cartesian, Ellipsoid, Geodetic};

/// Plain parameter record for constructing a pinhole camera
#[derive(Debug, Clone)]
pub struct PinholeParams {
    /// Focal length along image u (same physical units as `pitch`)
    pub fu: f64,
    /// Focal length along image v; must equal `fu`
    pub fv: f64,
    /// Principal point u (same physical units as `pitch`)
    pub cu: f64,
    /// Principal point v
    pub cv: f64,
    pub u_direction: Vector3<f64>,
    pub v_direction: Vector3<f64>,
    pub w_direction: Vector3<f64>,
    /// Camera center in geocentric Cartesian coordinates
    pub center: Vector3<f64>,
    /// Camera-to-world rotation
    pub rotation: Matrix3<f64>,
    /// Physical size of a pixel, converting focal-plane units to pixels
    pub pitch: f64,
    pub distortion: Distortion,
}

impl PinholeParams {
    pub const DEFAULT_U_DIRECTION: Vector3<f64> = Vector3::new(1.0, 0.0, 0.0);
    pub const DEFAULT_V_DIRECTION: Vector3<f64> = Vector3::new(0.0, 1.0, 0.0);
    pub const DEFAULT_W_DIRECTION: Vector3<f64> = Vector3::new(0.0, 0.0, 1.0);
}

/// Tsai pinhole camera with square pixels and an optional lens distortion.
///
/// The calibration matrix and full projection matrix are derived state,
/// recomputed by every mutating entry point; the rotation is kept orthonormal
/// with determinant +1.
#[derive(Debug, Clone)]
pub struct PinholeCamera {
    fu: f64,
    fv: f64,
    cu: f64,
    cv: f64,
    u_direction: Vector3<f64>,
    v_direction: Vector3<f64>,
    w_direction: Vector3<f64>,
    center: Vector3<f64>,
    rotation: Matrix3<f64>,
    pitch: f64,
    distortion: Distortion,

    calibration: Matrix3<f64>,
    projection: Matrix3x4<f64>,
}

fn check_intrinsics(fu: f64, fv: f64, pitch: f64) -> Result<()> {
    if (fu - fv).abs() > 1e-9 * fu.abs().max(fv.abs()) {
        return Err(ConfigError::RectangularPixels { fu, fv }.into());
    }
    if !(pitch > 0.0) {
        return Err(ConfigError::InvalidParameter(format!("pitch must be positive, got {pitch}")).into());
    }
    Ok(())
}

impl PinholeCamera {
    pub fn new(params: PinholeParams) -> Result<Self> {
        check_intrinsics(params.fu, params.fv, params.pitch)?;

        let mut camera = Self {
            fu: params.fu,
            fv: params.fv,
            cu: params.cu,
            cv: params.cv,
            u_direction: params.u_direction,
            v_direction: params.v_direction,
            w_direction: params.w_direction,
            center: params.center,
            rotation: params.rotation,
            pitch: params.pitch,
            distortion: params.distortion,
            calibration: Matrix3::identity(),
            projection: Matrix3x4::zeros(),
        };
        camera.update_derived();
        Ok(camera)
    }

    pub fn focal_length(&self) -> f64 {
        self.fu
    }

    pub fn principal_point(&self) -> (f64, f64) {
        (self.cu, self.cv)
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    pub fn center(&self) -> &Vector3<f64> {
        &self.center
    }

    pub fn rotation(&self) -> &Matrix3<f64> {
        &self.rotation
    }

    pub fn directions(&self) -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
        (self.u_direction, self.v_direction, self.w_direction)
    }

    pub fn distortion(&self) -> &Distortion {
        &self.distortion
    }

    /// Calibration matrix mapping camera-frame coordinates to pixels
    pub fn calibration_matrix(&self) -> &Matrix3<f64> {
        &self.calibration
    }

    /// Full 3x4 projection matrix P = K [R^T | -R^T C]
    pub fn projection_matrix(&self) -> &Matrix3x4<f64> {
        &self.projection
    }

    /// Raw intrinsics as stored in camera files: (fu, fv, cu, cv)
    pub fn intrinsics(&self) -> (f64, f64, f64, f64) {
        (self.fu, self.fv, self.cu, self.cv)
    }

    pub fn set_extrinsics(&mut self, rotation: Matrix3<f64>, center: Vector3<f64>) {
        self.rotation = rotation;
        self.center = center;
        self.update_derived();
    }

    pub fn set_intrinsics(&mut self, fu: f64, fv: f64, cu: f64, cv: f64, pitch: f64) -> Result<()> {
        check_intrinsics(fu, fv, pitch)?;
        self.fu = fu;
        self.fv = fv;
        self.cu = cu;
        self.cv = cv;
        self.pitch = pitch;
        self.update_derived();
        Ok(())
    }

    pub fn set_distortion(&mut self, distortion: Distortion) {
        self.distortion = distortion;
        self.update_derived();
    }

    /// Recompute derived state: orthonormalize the rotation (flipping the
    /// sign to determinant +1 when needed), then rebuild K and P.
    fn update_derived(&mut self) {
        // A rotation already within tolerance is left untouched so that
        // file round trips stay bit-exact
        let gram = self.rotation.transpose() * self.rotation;
        if (gram - Matrix3::identity()).norm() > 1e-12
            || (self.rotation.determinant() - 1.0).abs() > 1e-12
        {
            let svd = self.rotation.svd(true, true);
            let mut u = svd.u.expect("3x3 svd");
            let v_t = svd.v_t.expect("3x3 svd");
            if (u * v_t).determinant() < 0.0 {
                u.column_mut(2).neg_mut();
            }
            self.rotation = u * v_t;
        }

        self.calibration = Matrix3::new(
            self.fu / self.pitch, 0.0, self.cu / self.pitch,
            0.0, self.fv / self.pitch, self.cv / self.pitch,
            0.0, 0.0, 1.0,
        );

        let r_t = self.rotation.transpose();
        let t = -(r_t * self.center);
        let mut extrinsic = Matrix3x4::zeros();
        extrinsic.fixed_view_mut::<3, 3>(0, 0).copy_from(&r_t);
        extrinsic.fixed_view_mut::<3, 1>(0, 3).copy_from(&t);
        self.projection = self.calibration * extrinsic;
    }

    /// Project geocentric ground points to distorted pixel coordinates
    pub fn project_cartesian(&self, points: &[Cartesian]) -> Result<Vec<Vector2<f64>>> {
        points.iter().map(|p| self.project_point(p)).collect()
    }

    /// Project geographic ground points, converting through the ellipsoid
    pub fn project_geodetic(
        &self,
        points: &[Geodetic],
        ellipsoid: &Ellipsoid,
    ) -> Result<Vec<Vector2<f64>>> {
        points
            .iter()
            .map(|g| {
                let cart = geodetic_to_cartesian(g, ellipsoid)?;
                self.project_point(&cart)
            })
            .collect()
    }

    fn project_point(&self, ground: &Cartesian) -> Result<Vector2<f64>> {
        let h = self.projection * Vector4::new(ground.x, ground.y, ground.z, 1.0);
        if h.z <= 0.0 {
            return Err(ProjectionError::BehindCamera.into());
        }
        let ideal = Vector2::new(h.x / h.z, h.y / h.z);
        Ok(self.distort_pixel(&ideal))
    }

    /// Map ideal (undistorted) pixels to as-measured pixels
    pub fn add_distortion(&self, points: &[Vector2<f64>]) -> Vec<Vector2<f64>> {
        points.iter().map(|p| self.distort_pixel(p)).collect()
    }

    /// Map as-measured pixels back to ideal pixels
    pub fn remove_distortion(&self, points: &[Vector2<f64>]) -> Result<Vec<Vector2<f64>>> {
        points.iter().map(|p| self.undistort_pixel(p)).collect()
    }

    fn distort_pixel(&self, pixel: &Vector2<f64>) -> Vector2<f64> {
        let (x, y) = self.to_model_frame(pixel);
        let (xd, yd) = self.distortion.distort(x, y);
        self.from_model_frame(xd, yd)
    }

    fn undistort_pixel(&self, pixel: &Vector2<f64>) -> Result<Vector2<f64>> {
        let (x, y) = self.to_model_frame(pixel);
        let (xu, yu) = self.distortion.undistort(x, y)?;
        Ok(self.from_model_frame(xu, yu))
    }

    /// Pixel coordinates to the active distortion model's working frame
    fn to_model_frame(&self, pixel: &Vector2<f64>) -> (f64, f64) {
        match self.distortion {
            Distortion::None | Distortion::Tsai { .. } => (
                (pixel.x * self.pitch - self.cu) / self.fu,
                (pixel.y * self.pitch - self.cv) / self.fv,
            ),
            Distortion::Photometrix { xp, yp, .. } => {
                (pixel.x * self.pitch - xp, pixel.y * self.pitch - yp)
            }
        }
    }

    fn from_model_frame(&self, x: f64, y: f64) -> Vector2<f64> {
        match self.distortion {
            Distortion::None | Distortion::Tsai { .. } => Vector2::new(
                (x * self.fu + self.cu) / self.pitch,
                (y * self.fv + self.cv) / self.pitch,
            ),
            Distortion::Photometrix { xp, yp, .. } => {
                Vector2::new((x + xp) / self.pitch, (y + yp) / self.pitch)
            }
        }
    }
}

impl GroundCamera for PinholeCamera {
    fn ground_to_image(&self, ground: &Cartesian) -> Result<Vector2<f64>> {
        self.project_point(ground)
    }
}

/// Sanity log hook for adjusted cameras: reports how far the stored rotation
/// was from orthonormal before the last recompute would have cleaned it up.
pub fn orthonormality_residual(rotation: &Matrix3<f64>) -> f64 {
    let residual = (rotation.transpose() * rotation - Matrix3::identity()).norm();
    debug!(residual, "rotation orthonormality residual");
    residual
}

//! Camera resection: recover a pinhole camera from ground/image
//! correspondences, and the pinhole approximation of an RPC model.

use nalgebra::{DMatrix, Matrix3, Matrix3x4, Matrix4, Vector2, Vector3, Vector4};
use tracing::{debug, warn};

use super::smallest_singular_vector;
use crate::camera::{Distortion, PinholeCamera, PinholeParams};
use crate::error::{ConfigError, FitError, Result};
use crate::geodesy::{geodetic_to_cartesian, Cartesian, Ellipsoid};
use crate::sensor::RpcModel;

/// Decomposed direct-linear-transform solution
#[derive(Debug, Clone)]
pub struct ResectedCamera {
    /// Calibration matrix in pixels, normalized so K[2,2] = 1
    pub calibration: Matrix3<f64>,
    /// Camera-to-world rotation
    pub rotation: Matrix3<f64>,
    /// Camera center
    pub center: Vector3<f64>,
    /// Root-mean-square reprojection residual, pixels
    pub rms_residual: f64,
}

const MIN_POINTS: usize = 6;

/// Estimate a full projective camera from >= 6 correspondences and
/// decompose it into calibration, rotation and center.
pub fn resect(ground: &[Cartesian], image: &[Vector2<f64>]) -> Result<ResectedCamera> {
    let n = ground.len();
    if n < MIN_POINTS || image.len() != n {
        return Err(FitError::InsufficientData {
            needed: MIN_POINTS,
            got: n.min(image.len()),
        }
        .into());
    }

    // Centroid/mean-distance normalization on both sides keeps the design
    // matrix columns comparable
    let (ground_n, t_ground) = normalize_ground(ground)?;
    let (image_n, t_image) = normalize_image(image)?;

    let mut a = DMatrix::zeros(2 * n, 12);
    for (i, (g, px)) in ground_n.iter().zip(image_n.iter()).enumerate() {
        let (x, y, z) = (g.x, g.y, g.z);
        let (u, v) = (px.x, px.y);

        let r0 = 2 * i;
        let r1 = 2 * i + 1;

        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = z;
        a[(r0, 3)] = 1.0;
        a[(r0, 8)] = -u * x;
        a[(r0, 9)] = -u * y;
        a[(r0, 10)] = -u * z;
        a[(r0, 11)] = -u;

        a[(r1, 4)] = x;
        a[(r1, 5)] = y;
        a[(r1, 6)] = z;
        a[(r1, 7)] = 1.0;
        a[(r1, 8)] = -v * x;
        a[(r1, 9)] = -v * y;
        a[(r1, 10)] = -v * z;
        a[(r1, 11)] = -v;
    }

    let p_vec = smallest_singular_vector(a)?;
    let p_norm = Matrix3x4::from_row_slice(p_vec.as_slice());

    // Undo both normalizations: P = T_image^-1 * P_norm * T_ground
    let t_image_inv = t_image.try_inverse().expect("similarity transform");
    let mut p = t_image_inv * p_norm * t_ground;

    // Chirality: make projective depths positive
    let mut positive = 0i64;
    for g in ground {
        let w = p.row(2).dot(&Vector4::new(g.x, g.y, g.z, 1.0).transpose());
        positive += if w > 0.0 { 1 } else { -1 };
    }
    if positive == 0 {
        return Err(FitError::RankDeficient { rank: 11, unknowns: 12 }.into());
    }
    if positive < 0 {
        p = -p;
    }

    let m = p.fixed_view::<3, 3>(0, 0).into_owned();
    let (mut k, rotation_wc) = rq_decompose(&m)?;

    // P is recovered up to a positive scale; fold it into K
    let lambda = k[(2, 2)];
    if lambda.abs() < 1e-15 {
        return Err(FitError::RankDeficient { rank: 11, unknowns: 12 }.into());
    }
    k /= lambda;

    if rotation_wc.determinant() < 0.0 {
        return Err(ConfigError::InvalidParameter(
            "resected camera is left-handed; correspondences are inconsistent".into(),
        )
        .into());
    }

    let center = -(m.try_inverse().ok_or(FitError::RankDeficient {
        rank: 2,
        unknowns: 3,
    })?) * p.fixed_view::<3, 1>(0, 3).into_owned();

    let mut sq_sum = 0.0;
    for (g, px) in ground.iter().zip(image.iter()) {
        let h = p * Vector4::new(g.x, g.y, g.z, 1.0);
        let du = h.x / h.z - px.x;
        let dv = h.y / h.z - px.y;
        sq_sum += du * du + dv * dv;
    }
    let rms_residual = (sq_sum / n as f64).sqrt();
    debug!(points = n, rms_residual, "camera resection");

    Ok(ResectedCamera {
        calibration: k,
        // rotation_wc maps world to camera; the camera stores the transpose
        rotation: rotation_wc.transpose(),
        center,
        rms_residual,
    })
}

/// Pinhole approximation of an RPC model.
///
/// Samples the RPC's own validity region (offset +/- scale on each image
/// axis) at three height layers, maps the grid to the ground through the
/// RPC inverse (which must already be computed), and resects. The DLT never
/// returns exactly square pixels, so fu and fv are averaged; a large
/// deviation means the RPC is poorly approximated by a pinhole.
pub fn pinhole_from_rpc(
    rpc: &RpcModel,
    pitch: f64,
    ellipsoid: &Ellipsoid,
) -> Result<PinholeCamera> {
    if !rpc.has_inverse() {
        return Err(ConfigError::InverseNotComputed.into());
    }

    const GRID: usize = 6;
    const HEIGHT_LAYERS: [f64; 3] = [-0.25, 0.0, 0.25];

    let norm = rpc.normalization();
    let axis = |i: usize| -1.0 + 2.0 * (i as f64) / ((GRID - 1) as f64);

    let mut pixels = Vec::with_capacity(GRID * GRID * HEIGHT_LAYERS.len());
    let mut heights = Vec::with_capacity(pixels.capacity());
    for &h_n in &HEIGHT_LAYERS {
        for i in 0..GRID {
            for j in 0..GRID {
                pixels.push(Vector2::new(
                    norm.samp_off + norm.samp_scale * axis(i),
                    norm.line_off + norm.line_scale * axis(j),
                ));
                heights.push(norm.height_off + norm.height_scale * h_n);
            }
        }
    }

    let ground_geo = rpc.unproject(&pixels, &heights)?;
    let ground: Vec<Cartesian> = ground_geo
        .iter()
        .map(|g| geodetic_to_cartesian(g, ellipsoid))
        .collect::<Result<_>>()?;

    let resected = resect(&ground, &pixels)?;

    let k = &resected.calibration;
    let (fu_px, fv_px) = (k[(0, 0)], k[(1, 1)]);
    let aspect_deviation = (fu_px - fv_px).abs() / fu_px.abs().max(fv_px.abs());
    if aspect_deviation > 1e-6 {
        warn!(
            fu_px,
            fv_px, aspect_deviation, "pinhole approximation has unequal focal lengths; averaging"
        );
    }
    let f_px = 0.5 * (fu_px + fv_px);

    PinholeCamera::new(PinholeParams {
        fu: f_px * pitch,
        fv: f_px * pitch,
        cu: k[(0, 2)] * pitch,
        cv: k[(1, 2)] * pitch,
        u_direction: PinholeParams::DEFAULT_U_DIRECTION,
        v_direction: PinholeParams::DEFAULT_V_DIRECTION,
        w_direction: PinholeParams::DEFAULT_W_DIRECTION,
        center: resected.center,
        rotation: resected.rotation,
        pitch,
        distortion: Distortion::None,
    })
}

fn normalize_ground(points: &[Cartesian]) -> Result<(Vec<Vector3<f64>>, Matrix4<f64>)> {
    let n = points.len() as f64;
    let centroid = points.iter().sum::<Vector3<f64>>() / n;
    let mean_dist = points.iter().map(|p| (p - centroid).norm()).sum::<f64>() / n;
    if mean_dist <= f64::EPSILON {
        return Err(FitError::RankDeficient { rank: 0, unknowns: 12 }.into());
    }

    let scale = 3f64.sqrt() / mean_dist;
    let normalized = points.iter().map(|p| (p - centroid) * scale).collect();
    let t = Matrix4::new(
        scale, 0.0, 0.0, -scale * centroid.x,
        0.0, scale, 0.0, -scale * centroid.y,
        0.0, 0.0, scale, -scale * centroid.z,
        0.0, 0.0, 0.0, 1.0,
    );
    Ok((normalized, t))
}

fn normalize_image(points: &[Vector2<f64>]) -> Result<(Vec<Vector2<f64>>, Matrix3<f64>)> {
    let n = points.len() as f64;
    let centroid = points.iter().sum::<Vector2<f64>>() / n;
    let mean_dist = points.iter().map(|p| (p - centroid).norm()).sum::<f64>() / n;
    if mean_dist <= f64::EPSILON {
        return Err(FitError::RankDeficient { rank: 0, unknowns: 12 }.into());
    }

    let scale = 2f64.sqrt() / mean_dist;
    let normalized = points.iter().map(|p| (p - centroid) * scale).collect();
    let t = Matrix3::new(
        scale, 0.0, -scale * centroid.x,
        0.0, scale, -scale * centroid.y,
        0.0, 0.0, 1.0,
    );
    Ok((normalized, t))
}

/// RQ decomposition of a 3x3 matrix into upper-triangular K (positive
/// diagonal) and orthogonal R, via QR of the exchanged transpose
fn rq_decompose(m: &Matrix3<f64>) -> Result<(Matrix3<f64>, Matrix3<f64>)> {
    let e = Matrix3::new(
        0.0, 0.0, 1.0,
        0.0, 1.0, 0.0,
        1.0, 0.0, 0.0,
    );

    let qr = (e * m).transpose().qr();
    let q1 = qr.q();
    let r1 = qr.r();

    let mut k = e * r1.transpose() * e;
    let mut r = e * q1.transpose();

    // QR sign ambiguity: force the K diagonal positive
    for i in 0..3 {
        if k[(i, i)] < 0.0 {
            for j in 0..3 {
                k[(j, i)] = -k[(j, i)];
                r[(i, j)] = -r[(i, j)];
            }
        }
    }

    Ok((k, r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeomError;
    use crate::geodesy::Geodetic;
    use crate::poly::PolyOrder;
    use crate::sensor::{RpcNormalization, RpcSolver};

    fn reference_camera() -> PinholeCamera {
        PinholeCamera::new(PinholeParams {
            fu: 0.02,
            fv: 0.02,
            cu: 0.01,
            cv: 0.008,
            u_direction: PinholeParams::DEFAULT_U_DIRECTION,
            v_direction: PinholeParams::DEFAULT_V_DIRECTION,
            w_direction: PinholeParams::DEFAULT_W_DIRECTION,
            center: Vector3::new(0.5, -0.3, 10.0),
            rotation: Matrix3::new(
                1.0, 0.0, 0.0,
                0.0, -1.0, 0.0,
                0.0, 0.0, -1.0,
            ),
            pitch: 1e-5,
            distortion: Distortion::None,
        })
        .unwrap()
    }

    fn correspondence_block(camera: &PinholeCamera) -> (Vec<Cartesian>, Vec<Vector2<f64>>) {
        let mut ground = Vec::new();
        for x in [-4.0, -2.0, 0.0, 2.0, 4.0] {
            for y in [-4.0, -2.0, 0.0, 2.0, 4.0] {
                for z in [0.0, 2.0, 4.0] {
                    ground.push(Vector3::new(x, y, z));
                }
            }
        }
        let image = camera.project_cartesian(&ground).unwrap();
        (ground, image)
    }

    #[test]
    fn test_resect_recovers_camera() {
        let camera = reference_camera();
        let (ground, image) = correspondence_block(&camera);

        let resected = resect(&ground, &image).unwrap();

        assert!(resected.rms_residual < 1e-8);
        assert!((resected.center - camera.center()).norm() < 1e-6);
        assert!((resected.rotation - camera.rotation()).norm() < 1e-7);

        let k = &resected.calibration;
        assert!((k[(0, 0)] - 2000.0).abs() < 1e-4); // fu / pitch
        assert!((k[(1, 1)] - 2000.0).abs() < 1e-4);
        assert!((k[(0, 2)] - 1000.0).abs() < 1e-4); // cu / pitch
        assert!((k[(1, 2)] - 800.0).abs() < 1e-4);
        assert!(k[(0, 1)].abs() < 1e-5); // no skew
    }

    #[test]
    fn test_resect_too_few_points() {
        let camera = reference_camera();
        let (ground, image) = correspondence_block(&camera);
        let result = resect(&ground[..5], &image[..5]);
        assert!(matches!(
            result.unwrap_err(),
            GeomError::Fit(FitError::InsufficientData { needed: 6, got: 5 })
        ));
    }

    #[test]
    fn test_rq_reconstructs_input() {
        let m = Matrix3::new(
            1200.0, 3.0, 512.0,
            0.0, -1180.0, 384.0,
            0.2, 0.1, 1.0,
        );
        let (k, r) = rq_decompose(&m).unwrap();

        assert!((k * r - m).norm() < 1e-9 * m.norm());
        // K upper triangular with positive diagonal
        assert!(k[(1, 0)].abs() < 1e-9);
        assert!(k[(2, 0)].abs() < 1e-9);
        assert!(k[(2, 1)].abs() < 1e-9);
        assert!(k[(0, 0)] > 0.0 && k[(1, 1)] > 0.0 && k[(2, 2)] > 0.0);
        // R orthogonal
        assert!((r.transpose() * r - Matrix3::identity()).norm() < 1e-10);
    }

    #[test]
    fn test_pinhole_from_rpc_reprojects_consistently() {
        // Build an RPC that models a real perspective camera over terrain,
        // then recover the pinhole and compare the two projections.
        let lon0 = -77.0;
        let lat0 = 39.0;
        let surface = geodetic_to_cartesian(
            &Geodetic { lon: lon0, lat: lat0, height: 0.0 },
            &Ellipsoid::WGS84,
        )
        .unwrap();
        let up = surface.normalize();
        let east = Vector3::new(-lon0.to_radians().sin(), lon0.to_radians().cos(), 0.0);
        let north = up.cross(&east);
        // Camera axes: u -> east, v -> south, w -> down
        let rotation = Matrix3::from_columns(&[east, -north, -up]);

        let camera = PinholeCamera::new(PinholeParams {
            fu: 0.55,
            fv: 0.55,
            cu: 0.012,
            cv: 0.012,
            u_direction: PinholeParams::DEFAULT_U_DIRECTION,
            v_direction: PinholeParams::DEFAULT_V_DIRECTION,
            w_direction: PinholeParams::DEFAULT_W_DIRECTION,
            center: surface + up * 500_000.0,
            rotation,
            pitch: 8e-6,
            distortion: Distortion::None,
        })
        .unwrap();

        // Correspondences over a ~20 km scene with 1 km of relief; a cubic
        // fit needs at least four distinct samples along every axis
        let mut ground = Vec::new();
        for i in 0..6 {
            for j in 0..6 {
                for k in 0..4 {
                    ground.push(Geodetic {
                        lon: lon0 - 0.1 + 0.2 * (i as f64) / 5.0,
                        lat: lat0 - 0.1 + 0.2 * (j as f64) / 5.0,
                        height: 1000.0 * (k as f64) / 3.0,
                    });
                }
            }
        }
        let image = camera.project_geodetic(&ground, &Ellipsoid::WGS84).unwrap();

        let norm = RpcNormalization::from_samples(&ground, &image).unwrap();
        let mut rpc = RpcModel::with_normalization(norm);
        rpc.fit(&ground, &image, PolyOrder::Cubic, RpcSolver::PerAxis)
            .unwrap();
        rpc.compute_inverse(PolyOrder::Cubic, RpcSolver::PerAxis)
            .unwrap();

        let pinhole = pinhole_from_rpc(&rpc, 8e-6, &Ellipsoid::WGS84).unwrap();

        // The recovered camera must agree with the RPC where both are valid
        let probes = vec![
            Geodetic { lon: lon0 + 0.03, lat: lat0 - 0.05, height: 420.0 },
            Geodetic { lon: lon0 - 0.07, lat: lat0 + 0.02, height: 180.0 },
            Geodetic { lon: lon0 + 0.06, lat: lat0 + 0.06, height: 640.0 },
        ];
        let via_rpc = rpc.project(&probes).unwrap();
        let via_pinhole = pinhole.project_geodetic(&probes, &Ellipsoid::WGS84).unwrap();
        for (a, b) in via_rpc.iter().zip(via_pinhole.iter()) {
            assert!((a - b).norm() < 0.5, "projection gap {:?}", (a - b).norm());
        }
    }

    #[test]
    fn test_pinhole_from_rpc_requires_inverse() {
        let norm = RpcNormalization {
            samp_off: 5000.0,
            samp_scale: 5000.0,
            line_off: 5000.0,
            line_scale: 5000.0,
            lon_off: -77.0,
            lon_scale: 0.5,
            lat_off: 39.0,
            lat_scale: 0.5,
            height_off: 200.0,
            height_scale: 500.0,
        };
        let rpc = RpcModel::with_normalization(norm);
        let result = pinhole_from_rpc(&rpc, 8e-6, &Ellipsoid::WGS84);
        assert!(matches!(
            result.unwrap_err(),
            GeomError::Config(ConfigError::InverseNotComputed)
        ));
    }
}

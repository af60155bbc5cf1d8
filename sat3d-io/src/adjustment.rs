//! Read-back of the external bundle-adjustment toolkit's outputs:
//! per-camera adjustment files and image-residual point lists.

use std::fs;
use std::path::Path;

use nalgebra::{Matrix3, Quaternion, UnitQuaternion, Vector2, Vector3};
use sat3d_core::{fit_affine, AffineSolver, PinholeCamera};
use tracing::info;

use crate::error::{CodecError, Result};

/// Rigid correction produced by bundle adjustment for one camera
#[derive(Debug, Clone)]
pub struct Adjustment {
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
}

/// Parse an adjustment file: a translation line followed by a quaternion
/// line in (w, x, y, z) order
pub fn parse_adjustment(text: &str) -> Result<Adjustment> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    let t = numbers_line(lines.next(), "translation", 3)?;
    let q = numbers_line(lines.next(), "quaternion", 4)?;

    Ok(Adjustment {
        translation: Vector3::new(t[0], t[1], t[2]),
        rotation: UnitQuaternion::from_quaternion(Quaternion::new(q[0], q[1], q[2], q[3])),
    })
}

pub fn read_adjustment(path: &Path) -> Result<Adjustment> {
    let adjustment = parse_adjustment(&fs::read_to_string(path)?)?;
    info!(path = %path.display(), "loaded camera adjustment");
    Ok(adjustment)
}

/// Fold an adjustment into a camera: rotate, then translate the center.
/// Goes through the camera's mutation path, so the derived matrices and the
/// rotation invariant are restored automatically.
pub fn apply_adjustment(camera: &mut PinholeCamera, adjustment: &Adjustment) {
    let r = adjustment.rotation.to_rotation_matrix().into_inner();
    let rotation = r * camera.rotation();
    let center = r * camera.center() + adjustment.translation;
    camera.set_extrinsics(rotation, center);
}

/// One row of a residual file: where the point was measured in the image
/// versus where the adjusted model reprojects it
#[derive(Debug, Clone, Copy)]
pub struct ImageResidual {
    pub measured: Vector2<f64>,
    pub projected: Vector2<f64>,
}

/// Parse a residual point list: `#`-comment headers, then four numeric
/// columns per row (measured sample/line, projected sample/line), comma or
/// whitespace delimited
pub fn parse_residuals(text: &str) -> Result<Vec<ImageResidual>> {
    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let values: Vec<f64> = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .map(|t| {
                t.parse().map_err(|_| CodecError::Parse {
                    field: "residual row".to_string(),
                    value: t.to_string(),
                })
            })
            .collect::<Result<_>>()?;
        if values.len() != 4 {
            return Err(CodecError::Format(format!(
                "residual row expects 4 columns, found {}",
                values.len()
            )));
        }

        out.push(ImageResidual {
            measured: Vector2::new(values[0], values[1]),
            projected: Vector2::new(values[2], values[3]),
        });
    }
    Ok(out)
}

pub fn read_residuals(path: &Path) -> Result<Vec<ImageResidual>> {
    let residuals = parse_residuals(&fs::read_to_string(path)?)?;
    info!(path = %path.display(), rows = residuals.len(), "loaded residual file");
    Ok(residuals)
}

/// Fit the affine image-space correction mapping reprojected points onto
/// their measurements, taking out the drift bundle adjustment leaves behind
pub fn fit_affine_correction(residuals: &[ImageResidual]) -> Result<Matrix3<f64>> {
    let projected: Vec<Vector2<f64>> = residuals.iter().map(|r| r.projected).collect();
    let measured: Vec<Vector2<f64>> = residuals.iter().map(|r| r.measured).collect();
    Ok(fit_affine(&projected, &measured, AffineSolver::LeastSquares)?)
}

fn numbers_line(line: Option<&str>, what: &str, count: usize) -> Result<Vec<f64>> {
    let line = line.ok_or_else(|| CodecError::MissingField(what.to_string()))?;
    let values: Vec<f64> = line
        .split_whitespace()
        .map(|t| {
            t.parse().map_err(|_| CodecError::Parse {
                field: what.to_string(),
                value: t.to_string(),
            })
        })
        .collect::<Result<_>>()?;
    if values.len() != count {
        return Err(CodecError::Format(format!(
            "{what} line expects {count} values, found {}",
            values.len()
        )));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use sat3d_core::{Distortion, PinholeParams};

    fn camera() -> PinholeCamera {
        PinholeCamera::new(PinholeParams {
            fu: 0.55,
            fv: 0.55,
            cu: 0.0128,
            cv: 0.0096,
            u_direction: PinholeParams::DEFAULT_U_DIRECTION,
            v_direction: PinholeParams::DEFAULT_V_DIRECTION,
            w_direction: PinholeParams::DEFAULT_W_DIRECTION,
            center: Vector3::new(1000.0, 2000.0, 500_000.0),
            rotation: Matrix3::new(
                1.0, 0.0, 0.0,
                0.0, -1.0, 0.0,
                0.0, 0.0, -1.0,
            ),
            pitch: 8e-6,
            distortion: Distortion::None,
        })
        .unwrap()
    }

    #[test]
    fn test_parse_adjustment() {
        let adj = parse_adjustment("12.5 -3.25 0.75\n0.9998 0.01 -0.015 0.002\n").unwrap();
        assert_eq!(adj.translation, Vector3::new(12.5, -3.25, 0.75));
        // Unit quaternion after normalization
        assert!((adj.rotation.norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_identity_adjustment_is_a_no_op() {
        let mut cam = camera();
        let before_center = *cam.center();
        let before_rotation = *cam.rotation();

        let adj = parse_adjustment("0 0 0\n1 0 0 0\n").unwrap();
        apply_adjustment(&mut cam, &adj);

        assert!((cam.center() - before_center).norm() < 1e-12);
        assert!((cam.rotation() - before_rotation).norm() < 1e-12);
    }

    #[test]
    fn test_translation_moves_center_only() {
        let mut cam = camera();
        let before_rotation = *cam.rotation();

        let adj = parse_adjustment("10 -20 30\n1 0 0 0\n").unwrap();
        apply_adjustment(&mut cam, &adj);

        assert_eq!(cam.center().x, 1010.0);
        assert_eq!(cam.center().y, 1980.0);
        assert_eq!(cam.center().z, 500_030.0);
        assert!((cam.rotation() - before_rotation).norm() < 1e-12);
    }

    #[test]
    fn test_rotation_preserves_orthonormality() {
        let mut cam = camera();
        // ~1 degree about z
        let adj = parse_adjustment("0 0 0\n0.99996 0 0 0.00873\n").unwrap();
        apply_adjustment(&mut cam, &adj);

        let r = cam.rotation();
        let gram = r.transpose() * r;
        assert!((gram - Matrix3::identity()).norm() < 1e-10);
        assert!((r.determinant() - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_malformed_adjustment_rejected() {
        assert!(parse_adjustment("1 2\n1 0 0 0\n").is_err());
        assert!(parse_adjustment("1 2 3\n").is_err());
    }

    #[test]
    fn test_parse_residuals_mixed_delimiters() {
        let text = "\
# measured_samp, measured_line, projected_samp, projected_line
100.5, 200.25, 101.0, 199.75
300 400 299.5 400.5
";
        let rows = parse_residuals(text).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].measured, Vector2::new(100.5, 200.25));
        assert_eq!(rows[1].projected, Vector2::new(299.5, 400.5));
    }

    #[test]
    fn test_affine_correction_recovers_shift() {
        // Reprojection drifted by a constant (+2, -1) offset
        let residuals: Vec<ImageResidual> = [
            (100.0, 200.0),
            (1500.0, 180.0),
            (800.0, 1400.0),
            (250.0, 900.0),
        ]
        .iter()
        .map(|&(x, y)| ImageResidual {
            measured: Vector2::new(x, y),
            projected: Vector2::new(x - 2.0, y + 1.0),
        })
        .collect();

        let correction = fit_affine_correction(&residuals).unwrap();
        assert!((correction[(0, 2)] - 2.0).abs() < 1e-9);
        assert!((correction[(1, 2)] + 1.0).abs() < 1e-9);
        assert!((correction[(0, 0)] - 1.0).abs() < 1e-9);
        assert!((correction[(1, 1)] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_wrong_column_count_rejected() {
        let result = parse_residuals("1 2 3\n");
        assert!(matches!(result.unwrap_err(), CodecError::Format(_)));
    }
}

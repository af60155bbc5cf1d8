//! Tsai pinhole camera text files.
//!
//! Fixed layout: a two-line header, the four intrinsic scalars, the axis
//! direction vectors, camera center and rotation, the pixel pitch, then the
//! distortion tag with its parameter lines. Read and write must agree field
//! for field with the external toolkit.

use std::fs;
use std::path::Path;

use nalgebra::{Matrix3, Vector3};
use sat3d_core::{Distortion, PinholeCamera, PinholeParams};
use tracing::info;

use crate::error::{CodecError, Result};

const VERSION_TAG: &str = "VERSION_4";
const MODEL_TAG: &str = "PINHOLE";

pub fn parse_pinhole(text: &str) -> Result<PinholeCamera> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    expect_tag(lines.next(), VERSION_TAG)?;
    expect_tag(lines.next(), MODEL_TAG)?;

    let fu = scalar_line(lines.next(), "fu")?;
    let fv = scalar_line(lines.next(), "fv")?;
    let cu = scalar_line(lines.next(), "cu")?;
    let cv = scalar_line(lines.next(), "cv")?;

    let u_direction = vector3_line(lines.next(), "u_direction")?;
    let v_direction = vector3_line(lines.next(), "v_direction")?;
    let w_direction = vector3_line(lines.next(), "w_direction")?;
    let center = vector3_line(lines.next(), "C")?;

    let r = values_line(lines.next(), "R", 9)?;
    let rotation = Matrix3::from_row_slice(&r);

    let pitch = scalar_line(lines.next(), "pitch")?;

    let tag = lines
        .next()
        .ok_or_else(|| CodecError::MissingField("distortion tag".to_string()))?;
    let distortion = match tag {
        "NULL" => Distortion::None,
        "TSAI" => Distortion::Tsai {
            k1: scalar_line(lines.next(), "k1")?,
            k2: scalar_line(lines.next(), "k2")?,
            p1: scalar_line(lines.next(), "p1")?,
            p2: scalar_line(lines.next(), "p2")?,
        },
        "Photometrix" => Distortion::Photometrix {
            xp: scalar_line(lines.next(), "xp")?,
            yp: scalar_line(lines.next(), "yp")?,
            k1: scalar_line(lines.next(), "k1")?,
            k2: scalar_line(lines.next(), "k2")?,
            k3: scalar_line(lines.next(), "k3")?,
            p1: scalar_line(lines.next(), "p1")?,
            p2: scalar_line(lines.next(), "p2")?,
            b1: scalar_line(lines.next(), "b1")?,
            b2: scalar_line(lines.next(), "b2")?,
        },
        other => {
            return Err(CodecError::Format(format!(
                "unknown distortion tag {other:?}"
            )));
        }
    };

    let camera = PinholeCamera::new(PinholeParams {
        fu,
        fv,
        cu,
        cv,
        u_direction,
        v_direction,
        w_direction,
        center,
        rotation,
        pitch,
        distortion,
    })?;
    Ok(camera)
}

pub fn render_pinhole(camera: &PinholeCamera) -> String {
    let (fu, fv, cu, cv) = camera.intrinsics();
    let (u_dir, v_dir, w_dir) = camera.directions();
    let c = camera.center();
    let r = camera.rotation();

    let mut out = String::new();
    out.push_str(VERSION_TAG);
    out.push('\n');
    out.push_str(MODEL_TAG);
    out.push('\n');
    out.push_str(&format!("fu = {}\n", fu));
    out.push_str(&format!("fv = {}\n", fv));
    out.push_str(&format!("cu = {}\n", cu));
    out.push_str(&format!("cv = {}\n", cv));
    out.push_str(&format!("u_direction = {} {} {}\n", u_dir.x, u_dir.y, u_dir.z));
    out.push_str(&format!("v_direction = {} {} {}\n", v_dir.x, v_dir.y, v_dir.z));
    out.push_str(&format!("w_direction = {} {} {}\n", w_dir.x, w_dir.y, w_dir.z));
    out.push_str(&format!("C = {} {} {}\n", c.x, c.y, c.z));
    out.push_str("R =");
    for row in 0..3 {
        for col in 0..3 {
            out.push_str(&format!(" {}", r[(row, col)]));
        }
    }
    out.push('\n');
    out.push_str(&format!("pitch = {}\n", camera.pitch()));

    out.push_str(camera.distortion().file_tag());
    out.push('\n');
    match *camera.distortion() {
        Distortion::None => {}
        Distortion::Tsai { k1, k2, p1, p2 } => {
            out.push_str(&format!("k1 = {}\n", k1));
            out.push_str(&format!("k2 = {}\n", k2));
            out.push_str(&format!("p1 = {}\n", p1));
            out.push_str(&format!("p2 = {}\n", p2));
        }
        Distortion::Photometrix {
            xp,
            yp,
            k1,
            k2,
            k3,
            p1,
            p2,
            b1,
            b2,
        } => {
            out.push_str(&format!("xp = {}\n", xp));
            out.push_str(&format!("yp = {}\n", yp));
            out.push_str(&format!("k1 = {}\n", k1));
            out.push_str(&format!("k2 = {}\n", k2));
            out.push_str(&format!("k3 = {}\n", k3));
            out.push_str(&format!("p1 = {}\n", p1));
            out.push_str(&format!("p2 = {}\n", p2));
            out.push_str(&format!("b1 = {}\n", b1));
            out.push_str(&format!("b2 = {}\n", b2));
        }
    }

    out
}

pub fn read_pinhole(path: &Path) -> Result<PinholeCamera> {
    let camera = parse_pinhole(&fs::read_to_string(path)?)?;
    info!(path = %path.display(), "loaded pinhole camera file");
    Ok(camera)
}

pub fn write_pinhole(path: &Path, camera: &PinholeCamera) -> Result<()> {
    fs::write(path, render_pinhole(camera))?;
    Ok(())
}

fn expect_tag(line: Option<&str>, tag: &str) -> Result<()> {
    match line {
        Some(l) if l == tag => Ok(()),
        Some(l) => Err(CodecError::Format(format!(
            "expected {tag:?} header line, found {l:?}"
        ))),
        None => Err(CodecError::MissingField(tag.to_string())),
    }
}

fn values_line(line: Option<&str>, key: &str, count: usize) -> Result<Vec<f64>> {
    let line = line.ok_or_else(|| CodecError::MissingField(key.to_string()))?;
    let (found_key, rest) = line
        .split_once('=')
        .ok_or_else(|| CodecError::Format(format!("expected `{key} = ...`, found {line:?}")))?;
    if found_key.trim() != key {
        return Err(CodecError::Format(format!(
            "expected field {key:?}, found {:?}",
            found_key.trim()
        )));
    }

    let values: Vec<f64> = rest
        .split_whitespace()
        .map(|t| {
            t.parse().map_err(|_| CodecError::Parse {
                field: key.to_string(),
                value: t.to_string(),
            })
        })
        .collect::<Result<_>>()?;
    if values.len() != count {
        return Err(CodecError::Format(format!(
            "field {key:?} expects {count} values, found {}",
            values.len()
        )));
    }
    Ok(values)
}

fn scalar_line(line: Option<&str>, key: &str) -> Result<f64> {
    Ok(values_line(line, key, 1)?[0])
}

fn vector3_line(line: Option<&str>, key: &str) -> Result<Vector3<f64>> {
    let v = values_line(line, key, 3)?;
    Ok(Vector3::new(v[0], v[1], v[2]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sat3d_core::{ConfigError, GeomError};

    const SAMPLE: &str = "\
VERSION_4
PINHOLE
fu = 0.55
fv = 0.55
cu = 0.0128
cv = 0.0096
u_direction = 1 0 0
v_direction = 0 1 0
w_direction = 0 0 1
C = 1115000.5 -4844000.25 3982000.125
R = 1 0 0 0 -1 0 0 0 -1
pitch = 0.000008
TSAI
k1 = -0.012
k2 = 0.0025
p1 = 0.00004
p2 = -0.00006
";

    #[test]
    fn test_parse_sample() {
        let camera = parse_pinhole(SAMPLE).unwrap();
        let (fu, fv, cu, cv) = camera.intrinsics();
        assert_eq!(fu, 0.55);
        assert_eq!(fv, 0.55);
        assert_eq!(cu, 0.0128);
        assert_eq!(cv, 0.0096);
        assert_eq!(camera.pitch(), 0.000008);
        assert_eq!(camera.center().x, 1115000.5);
        assert!(matches!(
            camera.distortion(),
            Distortion::Tsai { k1, .. } if *k1 == -0.012
        ));
    }

    #[test]
    fn test_round_trip_is_byte_stable() {
        let first = render_pinhole(&parse_pinhole(SAMPLE).unwrap());
        let second = render_pinhole(&parse_pinhole(&first).unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn test_null_distortion_round_trip() {
        let text = SAMPLE.replace(
            "TSAI\nk1 = -0.012\nk2 = 0.0025\np1 = 0.00004\np2 = -0.00006\n",
            "NULL\n",
        );
        let camera = parse_pinhole(&text).unwrap();
        assert!(matches!(camera.distortion(), Distortion::None));

        let rendered = render_pinhole(&camera);
        assert!(rendered.ends_with("NULL\n"));
    }

    #[test]
    fn test_photometrix_round_trip() {
        let text = SAMPLE.replace(
            "TSAI\nk1 = -0.012\nk2 = 0.0025\np1 = 0.00004\np2 = -0.00006\n",
            "Photometrix\nxp = 0.004\nyp = -0.002\nk1 = 0.00015\nk2 = -0.000002\nk3 = 0.00000001\np1 = 0.000003\np2 = -0.000001\nb1 = 0\nb2 = 0\n",
        );
        let camera = parse_pinhole(&text).unwrap();
        assert!(matches!(camera.distortion(), Distortion::Photometrix { .. }));

        let round_tripped = parse_pinhole(&render_pinhole(&camera)).unwrap();
        assert_eq!(camera.distortion(), round_tripped.distortion());
    }

    #[test]
    fn test_missing_header_rejected() {
        let result = parse_pinhole("PINHOLE\nfu = 1\n");
        assert!(matches!(result.unwrap_err(), CodecError::Format(_)));
    }

    #[test]
    fn test_missing_distortion_parameters_rejected() {
        let text = SAMPLE.replace("p2 = -0.00006\n", "");
        let result = parse_pinhole(&text);
        assert!(matches!(result.unwrap_err(), CodecError::MissingField(f) if f == "p2"));
    }

    #[test]
    fn test_unknown_distortion_tag_rejected() {
        let text = SAMPLE.replace("TSAI", "BROWN");
        let result = parse_pinhole(&text);
        assert!(matches!(result.unwrap_err(), CodecError::Format(_)));
    }

    #[test]
    fn test_rectangular_pixels_surface_as_config_error() {
        let text = SAMPLE.replace("fv = 0.55", "fv = 0.56");
        let result = parse_pinhole(&text);
        assert!(matches!(
            result.unwrap_err(),
            CodecError::Geometry(GeomError::Config(ConfigError::RectangularPixels { .. }))
        ));
    }

    #[test]
    fn test_rotation_read_row_major() {
        let camera = parse_pinhole(SAMPLE).unwrap();
        let r = camera.rotation();
        assert_eq!(r[(0, 0)], 1.0);
        assert_eq!(r[(1, 1)], -1.0);
        assert_eq!(r[(2, 2)], -1.0);
    }
}

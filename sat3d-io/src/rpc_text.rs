//! Plain-text RPC files (the `_RPC.TXT` convention).
//!
//! This is the one RPC format written as well as read. The field order of
//! the writer is a compatibility contract with the external stereo toolkit
//! and must not change: offsets, scales, then the four coefficient blocks,
//! each numbered 1..=20.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use sat3d_core::RpcCoefficients;
use tracing::info;

use crate::error::{CodecError, Result};

const SCALAR_TAGS: [&str; 10] = [
    "LINE_OFF",
    "SAMP_OFF",
    "LAT_OFF",
    "LONG_OFF",
    "HEIGHT_OFF",
    "LINE_SCALE",
    "SAMP_SCALE",
    "LAT_SCALE",
    "LONG_SCALE",
    "HEIGHT_SCALE",
];

/// Parse `TAG: value` lines. Trailing unit words (`pixels`, `degrees`,
/// `meters`) after the value are tolerated and ignored.
pub fn parse_rpc_text(text: &str) -> Result<RpcCoefficients> {
    let mut fields = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let Some(token) = value.split_whitespace().next() else {
            continue;
        };
        let parsed: f64 = token.parse().map_err(|_| CodecError::Parse {
            field: key.trim().to_string(),
            value: token.to_string(),
        })?;
        fields.insert(key.trim().to_string(), parsed);
    }

    coefficients_from_fields(&fields)
}

/// Assemble a record from tag/value pairs shared by the text, RPB, XML and
/// GeoTIFF readers
pub(crate) fn coefficients_from_fields(fields: &HashMap<String, f64>) -> Result<RpcCoefficients> {
    let scalar = |tag: &str| -> Result<f64> {
        fields
            .get(tag)
            .copied()
            .ok_or_else(|| CodecError::MissingField(tag.to_string()))
    };

    let coeffs = |prefix: &str| -> Result<[f64; 20]> {
        let mut out = [0.0; 20];
        for (i, slot) in out.iter_mut().enumerate() {
            let tag = format!("{}_{}", prefix, i + 1);
            *slot = fields
                .get(&tag)
                .copied()
                .ok_or(CodecError::MissingField(tag))?;
        }
        Ok(out)
    };

    Ok(RpcCoefficients {
        line_num_coeff: coeffs("LINE_NUM_COEFF")?,
        line_den_coeff: coeffs("LINE_DEN_COEFF")?,
        samp_num_coeff: coeffs("SAMP_NUM_COEFF")?,
        samp_den_coeff: coeffs("SAMP_DEN_COEFF")?,
        lat_off: scalar("LAT_OFF")?,
        lat_scale: scalar("LAT_SCALE")?,
        lon_off: scalar("LONG_OFF")?,
        lon_scale: scalar("LONG_SCALE")?,
        height_off: scalar("HEIGHT_OFF")?,
        height_scale: scalar("HEIGHT_SCALE")?,
        line_off: scalar("LINE_OFF")?,
        line_scale: scalar("LINE_SCALE")?,
        samp_off: scalar("SAMP_OFF")?,
        samp_scale: scalar("SAMP_SCALE")?,
    })
}

/// Render in the exact field order the external toolkit expects
pub fn render_rpc_text(c: &RpcCoefficients) -> String {
    let mut out = String::new();

    let scalars = [
        c.line_off,
        c.samp_off,
        c.lat_off,
        c.lon_off,
        c.height_off,
        c.line_scale,
        c.samp_scale,
        c.lat_scale,
        c.lon_scale,
        c.height_scale,
    ];
    for (tag, value) in SCALAR_TAGS.iter().zip(scalars) {
        out.push_str(&format!("{}: {}\n", tag, value));
    }

    let blocks = [
        ("LINE_NUM_COEFF", &c.line_num_coeff),
        ("LINE_DEN_COEFF", &c.line_den_coeff),
        ("SAMP_NUM_COEFF", &c.samp_num_coeff),
        ("SAMP_DEN_COEFF", &c.samp_den_coeff),
    ];
    for (prefix, values) in blocks {
        for (i, value) in values.iter().enumerate() {
            out.push_str(&format!("{}_{}: {}\n", prefix, i + 1, value));
        }
    }

    out
}

pub fn read_rpc_text(path: &Path) -> Result<RpcCoefficients> {
    let coeffs = parse_rpc_text(&fs::read_to_string(path)?)?;
    info!(path = %path.display(), "loaded RPC text file");
    Ok(coeffs)
}

pub fn write_rpc_text(path: &Path, c: &RpcCoefficients) -> Result<()> {
    fs::write(path, render_rpc_text(c))?;
    Ok(())
}

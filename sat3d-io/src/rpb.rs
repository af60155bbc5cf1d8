//! RPB sidecar files (read only).
//!
//! `key = value;` statements with `BEGIN_GROUP`/`END_GROUP` markers and
//! parenthesized 20-element coefficient lists. Values feed the same record
//! as every other RPC format.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use sat3d_core::RpcCoefficients;
use tracing::info;

use crate::error::{CodecError, Result};
use crate::rpc_text::coefficients_from_fields;

/// RPB key names and the canonical tags they populate
const SCALAR_KEYS: [(&str, &str); 10] = [
    ("lineoffset", "LINE_OFF"),
    ("sampoffset", "SAMP_OFF"),
    ("latoffset", "LAT_OFF"),
    ("longoffset", "LONG_OFF"),
    ("heightoffset", "HEIGHT_OFF"),
    ("linescale", "LINE_SCALE"),
    ("sampscale", "SAMP_SCALE"),
    ("latscale", "LAT_SCALE"),
    ("longscale", "LONG_SCALE"),
    ("heightscale", "HEIGHT_SCALE"),
];

const LIST_KEYS: [(&str, &str); 4] = [
    ("linenumcoef", "LINE_NUM_COEFF"),
    ("linedencoef", "LINE_DEN_COEFF"),
    ("sampnumcoef", "SAMP_NUM_COEFF"),
    ("sampdencoef", "SAMP_DEN_COEFF"),
];

pub fn parse_rpb(text: &str) -> Result<RpcCoefficients> {
    let mut fields = HashMap::new();
    // Canonical prefix and values of the coefficient list being collected
    let mut pending: Option<(&'static str, Vec<f64>)> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some((prefix, mut values)) = pending.take() {
            let done = line.contains(')');
            collect_numbers(line, prefix, &mut values)?;
            if done {
                finish_list(prefix, values, &mut fields)?;
            } else {
                pending = Some((prefix, values));
            }
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();

        if let Some((_, prefix)) = LIST_KEYS.iter().find(|(k, _)| *k == key) {
            let mut values = Vec::new();
            let done = value.contains(')');
            collect_numbers(value, prefix, &mut values)?;
            if done {
                finish_list(prefix, values, &mut fields)?;
            } else {
                pending = Some((prefix, values));
            }
            continue;
        }

        if let Some((_, tag)) = SCALAR_KEYS.iter().find(|(k, _)| *k == key) {
            let token = value.trim_end_matches(';').trim();
            let parsed: f64 = token.parse().map_err(|_| CodecError::Parse {
                field: tag.to_string(),
                value: token.to_string(),
            })?;
            fields.insert(tag.to_string(), parsed);
        }
        // Unknown keys (satId, errBias, group markers, ...) are ignored
    }

    coefficients_from_fields(&fields)
}

fn collect_numbers(fragment: &str, field: &str, values: &mut Vec<f64>) -> Result<()> {
    for token in fragment
        .split(|c: char| c == ',' || c == '(' || c == ')' || c == ';' || c.is_whitespace())
    {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let parsed: f64 = token.parse().map_err(|_| CodecError::Parse {
            field: field.to_string(),
            value: token.to_string(),
        })?;
        values.push(parsed);
    }
    Ok(())
}

fn finish_list(
    prefix: &str,
    values: Vec<f64>,
    fields: &mut HashMap<String, f64>,
) -> Result<()> {
    if values.len() != 20 {
        return Err(CodecError::Format(format!(
            "{prefix} list expects 20 coefficients, found {}",
            values.len()
        )));
    }
    for (i, v) in values.into_iter().enumerate() {
        fields.insert(format!("{}_{}", prefix, i + 1), v);
    }
    Ok(())
}

pub fn read_rpb(path: &Path) -> Result<RpcCoefficients> {
    let coeffs = parse_rpb(&fs::read_to_string(path)?)?;
    info!(path = %path.display(), "loaded RPB file");
    Ok(coeffs)
}

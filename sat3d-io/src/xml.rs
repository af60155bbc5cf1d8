//! XML image support data (read only).
//!
//! A flat element scan: scalar tags like `<LINEOFFSET>` and the four
//! whitespace-separated 20-value coefficient tags like `<LINENUMCOEF>`.
//! Nesting around the tags is irrelevant and ignored, which keeps this
//! reader independent of any particular vendor's document structure.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use sat3d_core::RpcCoefficients;
use tracing::info;

use crate::error::{CodecError, Result};
use crate::rpc_text::coefficients_from_fields;

const SCALAR_TAGS: [(&str, &str); 10] = [
    ("LINEOFFSET", "LINE_OFF"),
    ("SAMPOFFSET", "SAMP_OFF"),
    ("LATOFFSET", "LAT_OFF"),
    ("LONGOFFSET", "LONG_OFF"),
    ("HEIGHTOFFSET", "HEIGHT_OFF"),
    ("LINESCALE", "LINE_SCALE"),
    ("SAMPSCALE", "SAMP_SCALE"),
    ("LATSCALE", "LAT_SCALE"),
    ("LONGSCALE", "LONG_SCALE"),
    ("HEIGHTSCALE", "HEIGHT_SCALE"),
];

const LIST_TAGS: [(&str, &str); 4] = [
    ("LINENUMCOEF", "LINE_NUM_COEFF"),
    ("LINEDENCOEF", "LINE_DEN_COEFF"),
    ("SAMPNUMCOEF", "SAMP_NUM_COEFF"),
    ("SAMPDENCOEF", "SAMP_DEN_COEFF"),
];

pub fn parse_rpc_xml(text: &str) -> Result<RpcCoefficients> {
    let mut fields = HashMap::new();

    for (tag, canonical) in SCALAR_TAGS {
        let body = element_text(text, tag)
            .ok_or_else(|| CodecError::MissingField(canonical.to_string()))?;
        let parsed: f64 = body.trim().parse().map_err(|_| CodecError::Parse {
            field: canonical.to_string(),
            value: body.trim().to_string(),
        })?;
        fields.insert(canonical.to_string(), parsed);
    }

    for (tag, prefix) in LIST_TAGS {
        let body = element_text(text, tag)
            .ok_or_else(|| CodecError::MissingField(prefix.to_string()))?;
        let values: Vec<f64> = body
            .split_whitespace()
            .map(|t| {
                t.parse().map_err(|_| CodecError::Parse {
                    field: prefix.to_string(),
                    value: t.to_string(),
                })
            })
            .collect::<Result<_>>()?;
        if values.len() != 20 {
            return Err(CodecError::Format(format!(
                "<{tag}> expects 20 coefficients, found {}",
                values.len()
            )));
        }
        for (i, v) in values.into_iter().enumerate() {
            fields.insert(format!("{}_{}", prefix, i + 1), v);
        }
    }

    coefficients_from_fields(&fields)
}

/// Text between `<TAG>` and `</TAG>`, if present
fn element_text<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = text.find(&open)? + open.len();
    let end = start + text[start..].find(&close)?;
    Some(&text[start..end])
}

pub fn read_rpc_xml(path: &Path) -> Result<RpcCoefficients> {
    let coeffs = parse_rpc_xml(&fs::read_to_string(path)?)?;
    info!(path = %path.display(), "loaded RPC XML file");
    Ok(coeffs)
}

//! RPC extraction from GeoTIFF tag metadata via GDAL.
//!
//! The RPC metadata domain comes in two layouts: numbered per-coefficient
//! keys (`LINE_NUM_COEFF_1` .. `_20`) or a single space-separated
//! `LINE_NUM_COEFF` entry. Both are accepted.

use std::collections::HashMap;
use std::path::Path;

use gdal::{Dataset, Metadata};
use sat3d_core::RpcCoefficients;
use tracing::info;

use crate::error::{CodecError, Result};
use crate::rpc_text::coefficients_from_fields;

/// Container for the scene-level metadata the pipeline consumes
#[derive(Debug, Clone, Default)]
pub struct SceneMetadata {
    pub rpc: Option<RpcCoefficients>,
    pub camera_id: Option<String>,
}

impl SceneMetadata {
    /// Extract all available metadata from an opened GDAL dataset
    pub fn from_dataset(dataset: &Dataset) -> Self {
        Self {
            rpc: rpc_from_dataset(dataset).ok(),
            camera_id: dataset.metadata_item("CAMERA_ID", ""),
        }
    }

    pub fn has_rpc(&self) -> bool {
        self.rpc.is_some()
    }
}

pub fn read_rpc_geotiff(path: &Path) -> Result<RpcCoefficients> {
    let dataset =
        Dataset::open(path).map_err(|e| CodecError::Format(format!("gdal open failed: {e}")))?;
    let coeffs = rpc_from_dataset(&dataset)?;
    info!(path = %path.display(), "loaded RPC from GeoTIFF tags");
    Ok(coeffs)
}

fn rpc_from_dataset(dataset: &Dataset) -> Result<RpcCoefficients> {
    let entries = dataset
        .metadata_domain("RPC")
        .ok_or_else(|| CodecError::MissingField("RPC metadata domain".to_string()))?;

    let raw: HashMap<String, String> = entries
        .iter()
        .filter_map(|entry| entry.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    rpc_from_tags(&raw)
}

/// Assemble the record from raw RPC tag strings
fn rpc_from_tags(raw: &HashMap<String, String>) -> Result<RpcCoefficients> {
    let mut fields = HashMap::new();

    for tag in [
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
    ] {
        if let Some(value) = raw.get(tag) {
            fields.insert(tag.to_string(), parse_value(tag, value)?);
        }
    }

    for prefix in [
        "LINE_NUM_COEFF",
        "LINE_DEN_COEFF",
        "SAMP_NUM_COEFF",
        "SAMP_DEN_COEFF",
    ] {
        if let Some(packed) = raw.get(prefix) {
            // Single space-separated entry
            let values: Vec<f64> = packed
                .split_whitespace()
                .map(|t| parse_value(prefix, t))
                .collect::<Result<_>>()?;
            if values.len() != 20 {
                return Err(CodecError::Format(format!(
                    "{prefix} expects 20 coefficients, found {}",
                    values.len()
                )));
            }
            for (i, v) in values.into_iter().enumerate() {
                fields.insert(format!("{}_{}", prefix, i + 1), v);
            }
        } else {
            // Numbered per-coefficient keys
            for i in 1..=20 {
                let tag = format!("{}_{}", prefix, i);
                if let Some(value) = raw.get(&tag) {
                    fields.insert(tag.clone(), parse_value(&tag, value)?);
                }
            }
        }
    }

    coefficients_from_fields(&fields)
}

fn parse_value(field: &str, value: &str) -> Result<f64> {
    value.trim().parse().map_err(|_| CodecError::Parse {
        field: field.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar_tags(raw: &mut HashMap<String, String>) {
        for (tag, value) in [
            ("LINE_OFF", "2500"),
            ("SAMP_OFF", "3000"),
            ("LAT_OFF", "39.0"),
            ("LONG_OFF", "-77.0"),
            ("HEIGHT_OFF", "200"),
            ("LINE_SCALE", "2600"),
            ("SAMP_SCALE", "3100"),
            ("LAT_SCALE", "0.5"),
            ("LONG_SCALE", "0.5"),
            ("HEIGHT_SCALE", "500"),
        ] {
            raw.insert(tag.to_string(), value.to_string());
        }
    }

    #[test]
    fn test_packed_coefficient_layout() {
        let mut raw = HashMap::new();
        scalar_tags(&mut raw);
        for prefix in ["LINE_NUM_COEFF", "LINE_DEN_COEFF", "SAMP_NUM_COEFF", "SAMP_DEN_COEFF"] {
            let packed: Vec<String> = (1..=20).map(|i| format!("{}e-5", i)).collect();
            raw.insert(prefix.to_string(), packed.join(" "));
        }

        let c = rpc_from_tags(&raw).unwrap();
        assert_eq!(c.line_off, 2500.0);
        assert!((c.line_num_coeff[0] - 1e-5).abs() < 1e-18);
        assert!((c.samp_den_coeff[19] - 20e-5).abs() < 1e-18);
    }

    #[test]
    fn test_numbered_coefficient_layout() {
        let mut raw = HashMap::new();
        scalar_tags(&mut raw);
        for prefix in ["LINE_NUM_COEFF", "LINE_DEN_COEFF", "SAMP_NUM_COEFF", "SAMP_DEN_COEFF"] {
            for i in 1..=20 {
                raw.insert(format!("{}_{}", prefix, i), format!("{}e-6", i));
            }
        }

        let c = rpc_from_tags(&raw).unwrap();
        assert!((c.line_num_coeff[4] - 5e-6).abs() < 1e-18);
        assert!((c.line_den_coeff[19] - 20e-6).abs() < 1e-18);
    }

    #[test]
    fn test_missing_domain_key_rejected() {
        let mut raw = HashMap::new();
        scalar_tags(&mut raw);
        // No coefficient entries at all
        let result = rpc_from_tags(&raw);
        assert!(matches!(result.unwrap_err(), CodecError::MissingField(_)));
    }

    #[test]
    fn test_wrong_packed_count_rejected() {
        let mut raw = HashMap::new();
        scalar_tags(&mut raw);
        raw.insert("LINE_NUM_COEFF".to_string(), "1 2 3".to_string());
        let result = rpc_from_tags(&raw);
        assert!(matches!(result.unwrap_err(), CodecError::Format(_)));
    }
}

//! Per-sensor distortion registry.
//!
//! Hardware calibration sheets arrive as a JSON document keyed by camera
//! hardware id; each entry is a tagged distortion record consumed when a
//! pinhole camera is built for that sensor.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use sat3d_core::Distortion;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistortionRegistry {
    cameras: HashMap<String, Distortion>,
}

impl DistortionRegistry {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let registry = Self::from_json(&fs::read_to_string(path)?)?;
        info!(path = %path.display(), cameras = registry.cameras.len(), "loaded distortion registry");
        Ok(registry)
    }

    /// Distortion coefficients for a hardware id, if the sheet has them
    pub fn get(&self, camera_id: &str) -> Option<&Distortion> {
        self.cameras.get(camera_id)
    }

    pub fn insert(&mut self, camera_id: impl Into<String>, distortion: Distortion) {
        self.cameras.insert(camera_id.into(), distortion);
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }
}

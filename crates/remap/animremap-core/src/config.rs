//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::RemapError;

/// Configuration shared by indexing, rewriting and the session flows.
/// Missing fields take their defaults; unknown fields are rejected.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct Config {
    /// Index and rewrite object-reference curves alongside scalar curves.
    pub include_object_reference_curves: bool,
    /// Folder hint handed to the clip asset store for derived (transformed) clips.
    pub derived_clip_folder: String,
    /// Re-index after each batch and report source identifiers that are still referenced.
    pub verify_after_rewrite: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            include_object_reference_curves: true,
            derived_clip_folder: "Generated/Animations".to_string(),
            verify_after_rewrite: true,
        }
    }
}

impl Config {
    pub fn from_json_str(s: &str) -> Result<Self, RemapError> {
        serde_json::from_str(s).map_err(|e| RemapError::Config(e.to_string()))
    }
}

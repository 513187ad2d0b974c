//! Template-driven clip replacement.
//!
//! A template lists, per system and per animation type, which controller clip each
//! template slot stands for:
//!
//! ```json
//! { "Systems": { "Locomotion": { "humanoid": { "Walk": "Template_Walk" } } } }
//! ```
//!
//! The animation type doubles as the transform applied to the replacement clip. A system
//! only covers the controller layers whose name contains the system name.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::clip::ClipLibrary;
use crate::error::RemapError;
use crate::graph::Controller;
use crate::ids::ClipId;
use crate::index::MotionIndex;
use crate::rewrite::{ClipKey, ClipTarget, RemapBatch};
use crate::transform::TransformRegistry;

/// Template slot name -> controller clip name.
pub type SlotMap = IndexMap<String, String>;
/// Animation type -> slots.
pub type SystemTemplate = IndexMap<String, SlotMap>;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "Systems")]
    pub systems: IndexMap<String, SystemTemplate>,
}

impl Template {
    pub fn from_json_str(s: &str) -> Result<Self, RemapError> {
        serde_json::from_str(s).map_err(|e| RemapError::Template(e.to_string()))
    }

    pub fn system(&self, name: &str) -> Option<&SystemTemplate> {
        self.systems.get(name)
    }

    /// Distinct template slot names of `system` across all animation types, sorted.
    pub fn slots(&self, system: &str) -> Vec<&str> {
        let mut slots: Vec<&str> = self
            .systems
            .get(system)
            .into_iter()
            .flat_map(|types| types.values())
            .flat_map(|slots| slots.keys().map(|k| k.as_str()))
            .collect();
        slots.sort_unstable();
        slots.dedup();
        slots
    }

    /// Controller clip names listed anywhere in `system`.
    pub fn controller_clip_names(&self, system: &str) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .systems
            .get(system)
            .into_iter()
            .flat_map(|types| types.values())
            .flat_map(|slots| slots.values().map(|v| v.as_str()))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Fail on the first animation type that does not name a registered transform.
    pub fn validate(&self, registry: &TransformRegistry) -> Result<(), RemapError> {
        for types in self.systems.values() {
            for anim_type in types.keys() {
                registry.resolve(anim_type)?;
            }
        }
        Ok(())
    }

    /// Turn assignments into one name-keyed clip batch per system.
    ///
    /// Each assignment covers every animation type of its system that lists the slot. When
    /// two animation types map a slot onto the same controller clip name they share one
    /// batch entry and the later type wins.
    pub fn batches(
        &self,
        assignments: &[TemplateAssignment],
    ) -> Result<IndexMap<String, RemapBatch<ClipKey, ClipTarget>>, RemapError> {
        let mut out: IndexMap<String, RemapBatch<ClipKey, ClipTarget>> = IndexMap::new();
        for a in assignments {
            let types = self
                .systems
                .get(&a.system)
                .ok_or_else(|| RemapError::Template(format!("unknown system '{}'", a.system)))?;
            let mut listed = false;
            let batch = out.entry(a.system.clone()).or_default();
            for (anim_type, slots) in types {
                if let Some(clip_name) = slots.get(&a.template_name) {
                    listed = true;
                    batch.assign(
                        ClipKey::Name(clip_name.clone()),
                        ClipTarget::new(a.replacement).with_transform(anim_type.as_str()),
                    );
                }
            }
            if !listed {
                return Err(RemapError::Template(format!(
                    "system '{}' has no slot '{}'",
                    a.system, a.template_name
                )));
            }
        }
        Ok(out)
    }
}

/// Replacement chosen by the user for one template slot of one system.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplateAssignment {
    pub system: String,
    pub template_name: String,
    pub replacement: ClipId,
}

impl TemplateAssignment {
    pub fn new(
        system: impl Into<String>,
        template_name: impl Into<String>,
        replacement: ClipId,
    ) -> Self {
        Self {
            system: system.into(),
            template_name: template_name.into(),
            replacement,
        }
    }
}

/// Per-system motion index over the layers each system covers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TemplateIndex {
    systems: IndexMap<String, MotionIndex>,
}

impl TemplateIndex {
    pub fn build(controller: &Controller, template: &Template) -> Self {
        let systems = template
            .systems
            .keys()
            .map(|system| {
                let index =
                    MotionIndex::scan_layers(controller, |layer| layer.contains(system.as_str()));
                (system.clone(), index)
            })
            .collect();
        Self { systems }
    }

    pub fn system(&self, name: &str) -> Option<&MotionIndex> {
        self.systems.get(name)
    }

    pub fn systems(&self) -> impl Iterator<Item = (&str, &MotionIndex)> {
        self.systems.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Template slots of `system` whose controller clip is used by at least one state.
    pub fn used_slots<'t>(
        &self,
        template: &'t Template,
        system: &str,
        clips: &ClipLibrary,
    ) -> Vec<&'t str> {
        let (Some(index), Some(types)) = (self.systems.get(system), template.system(system))
        else {
            return Vec::new();
        };
        let mut slots: Vec<&str> = types
            .values()
            .flat_map(|slots| slots.iter())
            .filter(|(_, clip_name)| index.contains_name(clip_name, clips))
            .map(|(slot, _)| slot.as_str())
            .collect();
        slots.sort_unstable();
        slots.dedup();
        slots
    }
}

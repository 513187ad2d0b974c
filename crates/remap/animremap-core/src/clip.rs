//! Clip assets: curve bindings, curve payloads and the clip library.
//!
//! A clip owns two curve tables, one for scalar curves and one for object-reference
//! curves. Both are keyed by the full [`CurveBinding`]; only the `path` component is
//! ever rewritten, everything else (owner type, property, payload) is carried over as-is.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ids::{ClipId, IdAllocator};

/// Owner type of curves that drive the skinned root (humanoid muscle curves).
pub const ANIMATOR_TYPE: &str = "Animator";

/// Key identifying which property of which skeleton node a curve drives.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurveBinding {
    /// Relative skeleton path ("" addresses the root itself).
    pub path: String,
    /// Owning component type, e.g. "Transform", "SkinnedMeshRenderer", "Animator".
    #[serde(rename = "type")]
    pub owner_type: String,
    pub property: String,
    #[serde(default, rename = "isObjectReference")]
    pub is_object_reference: bool,
}

impl CurveBinding {
    pub fn scalar(
        path: impl Into<String>,
        owner_type: impl Into<String>,
        property: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            owner_type: owner_type.into(),
            property: property.into(),
            is_object_reference: false,
        }
    }

    pub fn object_reference(
        path: impl Into<String>,
        owner_type: impl Into<String>,
        property: impl Into<String>,
    ) -> Self {
        Self {
            is_object_reference: true,
            ..Self::scalar(path, owner_type, property)
        }
    }

    /// Same binding addressed at another path.
    pub fn with_path(&self, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..self.clone()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyframe {
    pub time: f32,
    pub value: f32,
    #[serde(default)]
    pub in_tangent: f32,
    #[serde(default)]
    pub out_tangent: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WrapMode {
    #[default]
    Clamp,
    Loop,
    PingPong,
}

/// Scalar curve payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Curve {
    pub keys: Vec<Keyframe>,
    #[serde(default)]
    pub pre_wrap: WrapMode,
    #[serde(default)]
    pub post_wrap: WrapMode,
}

impl Curve {
    pub fn new(keys: Vec<Keyframe>) -> Self {
        Self {
            keys,
            ..Self::default()
        }
    }
}

/// One key of an object-reference curve; `value` names the referenced asset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectReferenceKeyframe {
    pub time: f32,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Clip {
    id: ClipId,
    pub name: String,
    pub frame_rate: f32,
    curves: IndexMap<CurveBinding, Curve>,
    object_curves: IndexMap<CurveBinding, Vec<ObjectReferenceKeyframe>>,
}

impl Clip {
    fn new(id: ClipId, name: String) -> Self {
        Self {
            id,
            name,
            frame_rate: 60.0,
            curves: IndexMap::new(),
            object_curves: IndexMap::new(),
        }
    }

    pub fn id(&self) -> ClipId {
        self.id
    }

    /// Bindings of all scalar curves, in insertion order.
    pub fn curve_bindings(&self) -> Vec<CurveBinding> {
        self.curves.keys().cloned().collect()
    }

    /// Bindings of all object-reference curves, in insertion order.
    pub fn object_reference_curve_bindings(&self) -> Vec<CurveBinding> {
        self.object_curves.keys().cloned().collect()
    }

    /// Scalar bindings followed by object-reference bindings.
    pub fn all_bindings(&self) -> Vec<CurveBinding> {
        let mut out = self.curve_bindings();
        out.extend(self.object_reference_curve_bindings());
        out
    }

    pub fn curve(&self, binding: &CurveBinding) -> Option<&Curve> {
        self.curves.get(binding)
    }

    /// Attach (`Some`) or detach (`None`) a scalar curve. Returns the previous payload.
    pub fn set_curve(&mut self, binding: &CurveBinding, curve: Option<Curve>) -> Option<Curve> {
        match curve {
            Some(c) => {
                let mut key = binding.clone();
                key.is_object_reference = false;
                self.curves.insert(key, c)
            }
            None => self.curves.shift_remove(binding),
        }
    }

    pub fn object_reference_curve(
        &self,
        binding: &CurveBinding,
    ) -> Option<&[ObjectReferenceKeyframe]> {
        self.object_curves.get(binding).map(|k| k.as_slice())
    }

    /// Attach (`Some`) or detach (`None`) an object-reference curve. Returns the previous payload.
    pub fn set_object_reference_curve(
        &mut self,
        binding: &CurveBinding,
        keys: Option<Vec<ObjectReferenceKeyframe>>,
    ) -> Option<Vec<ObjectReferenceKeyframe>> {
        match keys {
            Some(k) => {
                let mut key = binding.clone();
                key.is_object_reference = true;
                self.object_curves.insert(key, k)
            }
            None => self.object_curves.shift_remove(binding),
        }
    }
}

/// The clip asset database. Clips are shared by identity between states and controllers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClipLibrary {
    clips: IndexMap<ClipId, Clip>,
    ids: IdAllocator,
}

impl ClipLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty clip and return its identity.
    pub fn create(&mut self, name: impl Into<String>) -> ClipId {
        let id = self.ids.alloc_clip();
        self.clips.insert(id, Clip::new(id, name.into()));
        id
    }

    /// Store a copy of `clip` under a fresh identity (used for derived clips).
    pub fn insert_copy(&mut self, clip: Clip) -> ClipId {
        let id = self.ids.alloc_clip();
        self.clips.insert(id, Clip { id, ..clip });
        id
    }

    pub fn get(&self, id: ClipId) -> Option<&Clip> {
        self.clips.get(&id)
    }

    pub fn get_mut(&mut self, id: ClipId) -> Option<&mut Clip> {
        self.clips.get_mut(&id)
    }

    pub fn remove(&mut self, id: ClipId) -> Option<Clip> {
        self.clips.shift_remove(&id)
    }

    pub fn contains(&self, id: ClipId) -> bool {
        self.clips.contains_key(&id)
    }

    pub fn name(&self, id: ClipId) -> Option<&str> {
        self.clips.get(&id).map(|c| c.name.as_str())
    }

    /// All clips whose display name equals `name`, in creation order.
    pub fn find_by_name(&self, name: &str) -> Vec<ClipId> {
        self.clips
            .values()
            .filter(|c| c.name == name)
            .map(|c| c.id)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Clip> {
        self.clips.values()
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

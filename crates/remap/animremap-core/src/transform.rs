//! Clip transforms applied to a replacement clip before it is substituted in.
//!
//! The registry maps a transform name to a [`ClipTransform`]. Names are resolved up front;
//! an unknown name is an error, never a silent no-op.

use hashbrown::HashMap;

use crate::clip::{Clip, ANIMATOR_TYPE};
use crate::error::RemapError;

pub const IDENTITY_TRANSFORM: &str = "noEdit";
pub const HUMANOID_TRANSFORM: &str = "humanoid";

pub trait ClipTransform: Send + Sync {
    fn name(&self) -> &str;

    /// Identity transforms substitute the replacement clip itself; no derived asset is made.
    fn is_identity(&self) -> bool {
        false
    }

    /// Produce a new clip from `clip`. The input is never modified.
    fn apply(&self, clip: &Clip) -> Clip;
}

#[derive(Debug, Default)]
pub struct Identity;

impl ClipTransform for Identity {
    fn name(&self) -> &str {
        IDENTITY_TRANSFORM
    }

    fn is_identity(&self) -> bool {
        true
    }

    fn apply(&self, clip: &Clip) -> Clip {
        clip.clone()
    }
}

/// Keeps only curves whose binding owner type matches; everything else is detached.
#[derive(Debug)]
pub struct RetainOwnerType {
    name: String,
    owner_type: String,
}

impl RetainOwnerType {
    pub fn new(name: impl Into<String>, owner_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner_type: owner_type.into(),
        }
    }

    /// Strip everything that is not driven through the animator root (humanoid muscles).
    pub fn humanoid() -> Self {
        Self::new(HUMANOID_TRANSFORM, ANIMATOR_TYPE)
    }
}

impl ClipTransform for RetainOwnerType {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, clip: &Clip) -> Clip {
        let mut out = clip.clone();
        for b in out.curve_bindings() {
            if b.owner_type != self.owner_type {
                out.set_curve(&b, None);
            }
        }
        for b in out.object_reference_curve_bindings() {
            if b.owner_type != self.owner_type {
                out.set_object_reference_curve(&b, None);
            }
        }
        out
    }
}

/// Registry for clip transforms, keyed by name.
pub struct TransformRegistry {
    transforms: HashMap<String, Box<dyn ClipTransform>>,
}

impl TransformRegistry {
    /// Registry with the built-in transforms.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(Identity));
        registry.register(Box::new(RetainOwnerType::humanoid()));
        registry
    }

    pub fn empty() -> Self {
        Self {
            transforms: HashMap::new(),
        }
    }

    /// Register a transform, replacing any previous one with the same name.
    pub fn register(&mut self, transform: Box<dyn ClipTransform>) {
        self.transforms
            .insert(transform.name().to_string(), transform);
    }

    pub fn resolve(&self, name: &str) -> Result<&dyn ClipTransform, RemapError> {
        self.transforms
            .get(name)
            .map(|t| t.as_ref())
            .ok_or_else(|| RemapError::UnknownTransform(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.transforms.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("transforms", &self.names())
            .finish()
    }
}

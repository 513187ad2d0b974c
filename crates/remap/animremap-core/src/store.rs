//! Asset-storage collaborators.
//!
//! The engine only stages in-memory edits. Creating derived clip assets and flushing edits
//! to durable storage go through these traits; hosts implement them over their asset
//! database. The in-memory implementations here serve hosts without one, and tests.

use indexmap::IndexMap;
use log::debug;
use uuid::Uuid;

use crate::clip::{Clip, ClipLibrary};
use crate::config::Config;
use crate::error::StoreError;
use crate::ids::ClipId;

/// Creates and persists new clip assets. Collision-free naming is the store's job; callers
/// only pass a desired base name.
pub trait ClipAssetStore {
    fn create_derived(
        &mut self,
        library: &mut ClipLibrary,
        clip: Clip,
        desired_name: &str,
    ) -> Result<ClipId, StoreError>;
}

/// Bracketing primitive around a batch of structural edits plus a final flush.
pub trait PersistenceGate {
    fn begin_batch(&mut self);
    fn end_batch(&mut self);
    fn save(&mut self) -> Result<(), StoreError>;
}

/// Open batch on a [`PersistenceGate`]. The batch is closed when the guard drops, so every
/// exit path (including `?` and panics) releases it.
pub struct EditBatch<'a> {
    gate: &'a mut dyn PersistenceGate,
}

impl<'a> EditBatch<'a> {
    pub fn open(gate: &'a mut dyn PersistenceGate) -> Self {
        gate.begin_batch();
        Self { gate }
    }
}

impl Drop for EditBatch<'_> {
    fn drop(&mut self) {
        self.gate.end_batch();
    }
}

/// Record of a derived clip created by [`MemoryClipStore`].
#[derive(Clone, Debug, PartialEq)]
pub struct DerivedAsset {
    pub guid: Uuid,
    pub asset_path: String,
}

/// Store that keeps derived clips in the given [`ClipLibrary`]. Each derived clip is named
/// `<stem><n>` with the first free `n`, where the stem is the desired name with separators
/// and spaces removed, and is recorded at `<folder>/<stem><n>.anim`.
#[derive(Clone, Debug, Default)]
pub struct MemoryClipStore {
    folder: String,
    assets: IndexMap<ClipId, DerivedAsset>,
}

impl MemoryClipStore {
    pub fn new(folder: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            assets: IndexMap::new(),
        }
    }

    /// Store writing under the configured derived-clip folder.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.derived_clip_folder.clone())
    }

    pub fn asset(&self, clip: ClipId) -> Option<&DerivedAsset> {
        self.assets.get(&clip)
    }

    pub fn assets(&self) -> impl Iterator<Item = (ClipId, &DerivedAsset)> {
        self.assets.iter().map(|(id, a)| (*id, a))
    }

    fn free_name(&self, library: &ClipLibrary, stem: &str) -> String {
        let mut index = 0usize;
        loop {
            let candidate = format!("{stem}{index}");
            let path = self.asset_path(&candidate);
            let taken = self.assets.values().any(|a| a.asset_path == path)
                || !library.find_by_name(&candidate).is_empty();
            if !taken {
                return candidate;
            }
            index += 1;
        }
    }

    fn asset_path(&self, name: &str) -> String {
        format!("{}/{}.anim", self.folder, name)
    }
}

impl ClipAssetStore for MemoryClipStore {
    fn create_derived(
        &mut self,
        library: &mut ClipLibrary,
        mut clip: Clip,
        desired_name: &str,
    ) -> Result<ClipId, StoreError> {
        let stem: String = desired_name
            .chars()
            .filter(|c| !matches!(c, '|' | '\\' | '/' | ' '))
            .collect();
        if stem.is_empty() {
            return Err(StoreError::Create {
                name: desired_name.to_string(),
                reason: "empty asset name".to_string(),
            });
        }
        let name = self.free_name(library, &stem);
        let asset_path = self.asset_path(&name);
        clip.name = name;
        let id = library.insert_copy(clip);
        debug!("created derived clip {id:?} at {asset_path}");
        self.assets.insert(
            id,
            DerivedAsset {
                guid: Uuid::new_v4(),
                asset_path,
            },
        );
        Ok(id)
    }
}

/// Gate that only counts calls; `open` reports whether a batch is currently open.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordingGate {
    pub begun: usize,
    pub ended: usize,
    pub saves: usize,
    pub open: bool,
}

impl PersistenceGate for RecordingGate {
    fn begin_batch(&mut self) {
        self.begun += 1;
        self.open = true;
    }

    fn end_batch(&mut self) {
        self.ended += 1;
        self.open = false;
    }

    fn save(&mut self) -> Result<(), StoreError> {
        self.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_closes_on_early_return() {
        fn failing(gate: &mut RecordingGate) -> Result<(), StoreError> {
            let _batch = EditBatch::open(gate);
            Err(StoreError::Save("disk full".into()))
        }
        let mut gate = RecordingGate::default();
        assert!(failing(&mut gate).is_err());
        assert_eq!((gate.begun, gate.ended), (1, 1));
        assert!(!gate.open);
    }

    #[test]
    fn derived_names_do_not_collide() {
        let mut lib = ClipLibrary::new();
        let src = lib.create("Run");
        let mut store = MemoryClipStore::new("Generated");
        let clip = lib.get(src).unwrap().clone();
        let a = store
            .create_derived(&mut lib, clip.clone(), "Runhumanoid")
            .unwrap();
        let b = store
            .create_derived(&mut lib, clip.clone(), "Run humanoid")
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(lib.name(a), Some("Runhumanoid0"));
        assert_eq!(lib.name(b), Some("Runhumanoid1"));
        assert_eq!(
            store.asset(b).unwrap().asset_path,
            "Generated/Runhumanoid1.anim"
        );
        assert!(store.create_derived(&mut lib, clip, " / ").is_err());
        assert_ne!(store.asset(a).unwrap().guid, store.asset(b).unwrap().guid);
    }
}

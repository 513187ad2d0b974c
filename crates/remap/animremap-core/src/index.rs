//! Identifier index: groups usage streams by the identifier they reference.
//!
//! Indexes are snapshots. They are rebuilt from scratch on every scan and never patched;
//! the rewriter re-reads live graph state for every site it touches.

use indexmap::{IndexMap, IndexSet};
use log::debug;

use crate::clip::ClipLibrary;
use crate::config::Config;
use crate::external::Avatar;
use crate::graph::Controller;
use crate::ids::{ClipId, NodeId, StateId};
use crate::skeleton::SkeletonMap;
use crate::traverse::{
    enumerate_curve_usages, enumerate_motion_usages, enumerate_motion_usages_from,
    enumerate_parameter_usages, CurveUsage, MotionUsage, ParameterSite, ParameterUsage,
};

/// Key of the path index: a node the path resolved to, or the raw path when it did not.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathKey {
    Resolved(NodeId),
    Missing(String),
}

/// Paths that resolved to one node and the clips binding any of them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathUsage {
    pub paths: IndexSet<String>,
    pub clips: IndexSet<ClipId>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathIndex {
    resolved: IndexMap<NodeId, PathUsage>,
    missing: IndexMap<String, PathUsage>,
}

impl PathIndex {
    pub fn build(usages: &[CurveUsage], skeleton: &dyn SkeletonMap) -> Self {
        let mut index = Self::default();
        for u in usages {
            let entry = match skeleton.find(&u.binding.path) {
                Some(node) => index.resolved.entry(node).or_default(),
                None => index.missing.entry(u.binding.path.clone()).or_default(),
            };
            entry.paths.insert(u.binding.path.clone());
            entry.clips.insert(u.clip);
        }
        debug!(
            "path index: {} resolved nodes, {} missing paths",
            index.resolved.len(),
            index.missing.len()
        );
        index
    }

    /// Enumerate and index in one step.
    pub fn scan(
        controller: &Controller,
        clips: &ClipLibrary,
        skeleton: &dyn SkeletonMap,
        config: &Config,
    ) -> Self {
        let usages =
            enumerate_curve_usages(controller, clips, config.include_object_reference_curves);
        Self::build(&usages, skeleton)
    }

    pub fn usage(&self, key: &PathKey) -> Option<&PathUsage> {
        match key {
            PathKey::Resolved(node) => self.resolved.get(node),
            PathKey::Missing(path) => self.missing.get(path),
        }
    }

    pub fn clips_for_node(&self, node: NodeId) -> Option<&IndexSet<ClipId>> {
        self.resolved.get(&node).map(|u| &u.clips)
    }

    pub fn clips_for_missing(&self, path: &str) -> Option<&IndexSet<ClipId>> {
        self.missing.get(path).map(|u| &u.clips)
    }

    pub fn contains(&self, key: &PathKey) -> bool {
        self.usage(key).is_some()
    }

    /// Resolved nodes ordered by display name, then by path.
    pub fn nodes_sorted(&self, skeleton: &dyn SkeletonMap) -> Vec<NodeId> {
        let mut nodes: Vec<(String, String, NodeId)> = self
            .resolved
            .keys()
            .map(|n| {
                (
                    skeleton.name(*n).unwrap_or_default().to_string(),
                    skeleton.path_of(*n).unwrap_or_default(),
                    *n,
                )
            })
            .collect();
        nodes.sort();
        nodes.into_iter().map(|(_, _, n)| n).collect()
    }

    /// Unresolved paths in lexicographic order.
    pub fn missing_sorted(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.missing.keys().map(|p| p.as_str()).collect();
        paths.sort_unstable();
        paths
    }

    pub fn resolved_len(&self) -> usize {
        self.resolved.len()
    }

    pub fn missing_len(&self) -> usize {
        self.missing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty() && self.missing.is_empty()
    }
}

/// Clip → states that use it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MotionIndex {
    states_by_clip: IndexMap<ClipId, IndexSet<StateId>>,
}

impl MotionIndex {
    pub fn build(usages: &[MotionUsage]) -> Self {
        let mut states_by_clip: IndexMap<ClipId, IndexSet<StateId>> = IndexMap::new();
        for u in usages {
            states_by_clip.entry(u.clip).or_default().insert(u.state);
        }
        Self { states_by_clip }
    }

    pub fn scan(controller: &Controller) -> Self {
        Self::build(&enumerate_motion_usages(controller))
    }

    /// Index only the layers whose name satisfies `keep`.
    pub fn scan_layers(controller: &Controller, keep: impl Fn(&str) -> bool) -> Self {
        let roots = controller
            .layers()
            .iter()
            .filter(|l| keep(&l.name))
            .map(|l| l.state_machine);
        Self::build(&enumerate_motion_usages_from(controller, roots))
    }

    pub fn states_for(&self, clip: ClipId) -> Option<&IndexSet<StateId>> {
        self.states_by_clip.get(&clip)
    }

    /// Union of the state sets of every indexed clip whose display name is `name`.
    pub fn states_for_name(&self, name: &str, clips: &ClipLibrary) -> IndexSet<StateId> {
        self.states_by_clip
            .iter()
            .filter(|(c, _)| clips.name(**c) == Some(name))
            .flat_map(|(_, states)| states.iter().copied())
            .collect()
    }

    pub fn contains(&self, clip: ClipId) -> bool {
        self.states_by_clip.contains_key(&clip)
    }

    pub fn contains_name(&self, name: &str, clips: &ClipLibrary) -> bool {
        self.states_by_clip
            .keys()
            .any(|c| clips.name(*c) == Some(name))
    }

    /// Indexed clips ordered by display name, then identity.
    pub fn clips_sorted(&self, clips: &ClipLibrary) -> Vec<ClipId> {
        let mut ids: Vec<ClipId> = self.states_by_clip.keys().copied().collect();
        ids.sort_by(|a, b| {
            clips
                .name(*a)
                .unwrap_or_default()
                .cmp(clips.name(*b).unwrap_or_default())
                .then(a.cmp(b))
        });
        ids
    }

    pub fn len(&self) -> usize {
        self.states_by_clip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states_by_clip.is_empty()
    }
}

/// Parameter name → every site referencing it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterIndex {
    by_name: IndexMap<String, IndexSet<ParameterSite>>,
}

impl ParameterIndex {
    pub fn build(usages: &[ParameterUsage]) -> Self {
        let mut by_name: IndexMap<String, IndexSet<ParameterSite>> = IndexMap::new();
        for u in usages {
            by_name.entry(u.name.clone()).or_default().insert(u.site);
        }
        Self { by_name }
    }

    pub fn scan(avatar: &Avatar) -> Self {
        Self::build(&enumerate_parameter_usages(
            &avatar.controllers,
            &avatar.external,
        ))
    }

    pub fn sites_for(&self, name: &str) -> Option<&IndexSet<ParameterSite>> {
        self.by_name.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn names_sorted(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(|n| n.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

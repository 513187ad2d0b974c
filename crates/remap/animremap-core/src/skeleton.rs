//! Skeleton map: relative path ↔ node identity.
//!
//! Hosts implement [`SkeletonMap`] over their scene hierarchy; [`Skeleton`] is a plain
//! in-memory hierarchy used when the rig is described by a list of relative paths.

use hashbrown::HashMap;
use serde::Deserialize;

use crate::error::LoadError;
use crate::ids::NodeId;

/// Trait for resolving relative skeleton paths to node identities and back.
pub trait SkeletonMap {
    /// Node at `path` relative to the root, or `None` if the path does not resolve.
    fn find(&self, path: &str) -> Option<NodeId>;
    /// Canonical relative path of `node` ("" for the root).
    fn path_of(&self, node: NodeId) -> Option<String>;
    /// Display name of `node`, used for deterministic ordering.
    fn name(&self, node: NodeId) -> Option<&str>;
}

#[derive(Clone, Debug, PartialEq)]
struct SkeletonNode {
    name: String,
    parent: Option<NodeId>,
}

#[derive(Clone, Debug)]
pub struct Skeleton {
    nodes: Vec<SkeletonNode>,
    by_path: HashMap<String, NodeId>,
}

impl Skeleton {
    pub fn new(root_name: impl Into<String>) -> Self {
        let mut by_path = HashMap::new();
        by_path.insert(String::new(), NodeId(0));
        Self {
            nodes: vec![SkeletonNode {
                name: root_name.into(),
                parent: None,
            }],
            by_path,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Add `name` under `parent`. A sibling with the same name is returned instead of
    /// creating a second node, so every path stays unique.
    pub fn add_child(&mut self, parent: NodeId, name: impl Into<String>) -> Option<NodeId> {
        let name = name.into();
        let parent_path = self.path_of(parent)?;
        let path = if parent_path.is_empty() {
            name.clone()
        } else {
            format!("{parent_path}/{name}")
        };
        if let Some(existing) = self.by_path.get(&path) {
            return Some(*existing);
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(SkeletonNode {
            name,
            parent: Some(parent),
        });
        self.by_path.insert(path, id);
        Some(id)
    }

    /// Build a hierarchy from relative paths, creating intermediate nodes as needed.
    pub fn from_paths<'a>(root_name: &str, paths: impl IntoIterator<Item = &'a str>) -> Self {
        let mut skeleton = Self::new(root_name);
        for path in paths {
            let mut node = skeleton.root();
            for segment in path.split('/').filter(|s| !s.is_empty()) {
                match skeleton.add_child(node, segment) {
                    Some(child) => node = child,
                    None => break,
                }
            }
        }
        skeleton
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl SkeletonMap for Skeleton {
    fn find(&self, path: &str) -> Option<NodeId> {
        self.by_path.get(path).copied()
    }

    fn path_of(&self, node: NodeId) -> Option<String> {
        let mut segments = Vec::new();
        let mut current = self.nodes.get(node.0 as usize)?;
        while let Some(parent) = current.parent {
            segments.push(current.name.as_str());
            current = self.nodes.get(parent.0 as usize)?;
        }
        segments.reverse();
        Some(segments.join("/"))
    }

    fn name(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node.0 as usize).map(|n| n.name.as_str())
    }
}

#[derive(Deserialize)]
struct StoredSkeleton {
    root: String,
    paths: Vec<String>,
}

/// Parse `{ "root": "Avatar", "paths": ["Hips", "Hips/Chest", ...] }`.
pub fn parse_skeleton_json(s: &str) -> Result<Skeleton, LoadError> {
    let stored: StoredSkeleton =
        serde_json::from_str(s).map_err(|e| LoadError::Parse(e.to_string()))?;
    Ok(Skeleton::from_paths(
        &stored.root,
        stored.paths.iter().map(|p| p.as_str()),
    ))
}

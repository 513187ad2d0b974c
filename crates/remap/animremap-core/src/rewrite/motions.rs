use std::collections::VecDeque;

use hashbrown::{HashMap, HashSet};
use indexmap::{IndexMap, IndexSet};
use log::{debug, info, warn};

use crate::clip::ClipLibrary;
use crate::error::{RemapError, SiteIssue};
use crate::graph::{Controller, Motion};
use crate::ids::{ClipId, StateId, TreeId};
use crate::index::MotionIndex;
use crate::store::ClipAssetStore;
use crate::transform::TransformRegistry;
use crate::traverse::flatten_clips;

use super::{RemapBatch, RemapReport};

/// Source side of a clip remap. Identity is preferred; names are for sources that have no
/// stable identity (template configs, hand-written batches).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClipKey {
    Id(ClipId),
    Name(String),
}

/// Replacement clip, optionally run through a named transform first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClipTarget {
    pub clip: ClipId,
    pub transform: Option<String>,
}

impl ClipTarget {
    pub fn new(clip: ClipId) -> Self {
        Self {
            clip,
            transform: None,
        }
    }

    pub fn with_transform(mut self, name: impl Into<String>) -> Self {
        self.transform = Some(name.into());
        self
    }
}

fn describe(key: &ClipKey, clips: &ClipLibrary) -> String {
    match key {
        ClipKey::Id(id) => clips
            .name(*id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{id:?}")),
        ClipKey::Name(name) => name.clone(),
    }
}

/// Indexed clips matched by `key`.
fn sources(key: &ClipKey, index: &MotionIndex, clips: &ClipLibrary) -> Vec<ClipId> {
    match key {
        ClipKey::Id(id) if index.contains(*id) => vec![*id],
        ClipKey::Id(_) => Vec::new(),
        ClipKey::Name(name) => clips
            .find_by_name(name)
            .into_iter()
            .filter(|c| index.contains(*c))
            .collect(),
    }
}

/// Substitute clips in every state (and nested blend tree) that uses a remapped clip.
///
/// Transforms are resolved per entry: an unknown name skips only that entry. Derived clips
/// are created through `store` once per (replacement, transform) pair; a store failure
/// aborts the whole batch.
pub fn rewrite_motions(
    controller: &mut Controller,
    clips: &mut ClipLibrary,
    index: &MotionIndex,
    batch: RemapBatch<ClipKey, ClipTarget>,
    registry: &TransformRegistry,
    store: &mut dyn ClipAssetStore,
) -> Result<RemapReport, RemapError> {
    let mut report = RemapReport::default();
    let mut substitutions: IndexMap<ClipId, ClipId> = IndexMap::new();
    // State -> indexed source clips it is expected to still hold.
    let mut expected: IndexMap<StateId, IndexSet<ClipId>> = IndexMap::new();
    let mut derived: HashMap<(ClipId, String), ClipId> = HashMap::new();

    for (key, target) in batch.chosen() {
        let matched = sources(key, index, clips);
        if matched.is_empty() {
            debug!("no indexed usages for {key:?}");
            continue;
        }

        let replacement = match &target.transform {
            None => target.clip,
            Some(name) => {
                let transform = match registry.resolve(name) {
                    Ok(t) => t,
                    Err(_) => {
                        warn!("unknown transform '{name}'; skipping {key:?}");
                        report.issues.push(SiteIssue::UnknownTransform {
                            source_name: describe(key, clips),
                            transform: name.clone(),
                        });
                        continue;
                    }
                };
                if transform.is_identity() {
                    target.clip
                } else if let Some(id) = derived.get(&(target.clip, name.clone())) {
                    *id
                } else {
                    let Some(source) = clips.get(target.clip) else {
                        warn!("replacement clip {:?} is missing", target.clip);
                        report.issues.push(SiteIssue::StaleClip(target.clip));
                        continue;
                    };
                    let desired = format!("{}{}", source.name, transform.name());
                    let clip = transform.apply(source);
                    let id = store.create_derived(clips, clip, &desired)?;
                    derived.insert((target.clip, name.clone()), id);
                    id
                }
            }
        };

        for old in matched {
            if old == replacement {
                continue;
            }
            substitutions.insert(old, replacement);
            for state in index.states_for(old).into_iter().flatten() {
                expected.entry(*state).or_default().insert(old);
            }
        }
    }

    // Read before any write: a shared tree rewritten through one state is still live for
    // the next state that plays it.
    let mut live: Vec<(StateId, Option<Motion>)> = Vec::with_capacity(expected.len());
    for (state_id, sources) in &expected {
        let Some(motion) = controller.state(*state_id).map(|s| s.motion) else {
            warn!("state {state_id:?} disappeared before rewrite");
            report.issues.push(SiteIssue::StaleState(*state_id));
            continue;
        };
        let held = flatten_clips(controller, motion);
        for clip in sources.iter().filter(|c| !held.contains(c)) {
            warn!("state {state_id:?} no longer uses {clip:?}; skipped");
            report.issues.push(SiteIssue::StaleMotionSite {
                clip: *clip,
                state: *state_id,
            });
        }
        live.push((*state_id, motion));
    }

    let mut visited: HashSet<TreeId> = HashSet::new();
    for &(state_id, motion) in &live {
        match motion {
            Some(Motion::Clip(c)) => {
                if let Some(new) = substitutions.get(&c) {
                    controller.set_motion(state_id, Some(Motion::Clip(*new)));
                    report.rewritten += 1;
                }
            }
            Some(Motion::Tree(root)) => {
                report.rewritten += rewrite_tree(controller, root, &substitutions, &mut visited);
            }
            None => {}
        }
    }

    info!(
        "motion rewrite: {} slots across {} states, {} issues",
        report.rewritten,
        expected.len(),
        report.issues.len()
    );
    Ok(report)
}

/// Replace clip children of `root` and every tree below it. Each tree's children are copied,
/// edited and written back as a whole. Trees already in `visited` are skipped.
fn rewrite_tree(
    controller: &mut Controller,
    root: TreeId,
    substitutions: &IndexMap<ClipId, ClipId>,
    visited: &mut HashSet<TreeId>,
) -> usize {
    let mut replaced = 0;
    let mut queue = VecDeque::from([root]);
    while let Some(tree_id) = queue.pop_front() {
        if !visited.insert(tree_id) {
            continue;
        }
        let Some(tree) = controller.tree_mut(tree_id) else {
            continue;
        };
        let mut children = tree.children().to_vec();
        let mut changed = false;
        for child in children.iter_mut() {
            match child.motion {
                Some(Motion::Clip(c)) => {
                    if let Some(new) = substitutions.get(&c) {
                        child.motion = Some(Motion::Clip(*new));
                        changed = true;
                        replaced += 1;
                    }
                }
                Some(Motion::Tree(t)) => queue.push_back(t),
                None => {}
            }
        }
        if changed {
            tree.set_children(children);
        }
    }
    replaced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{BlendTree, ChildMotion, State};
    use crate::store::MemoryClipStore;

    #[test]
    fn chained_entries_apply_once() {
        let mut clips = ClipLibrary::new();
        let (a, b, c) = (clips.create("A"), clips.create("B"), clips.create("C"));
        let mut ctrl = Controller::new("FX");
        let root = ctrl.add_layer("Base");
        let s1 = ctrl
            .add_state(root, State::new("S1").with_motion(Motion::Clip(a)))
            .unwrap();
        let s2 = ctrl
            .add_state(root, State::new("S2").with_motion(Motion::Clip(b)))
            .unwrap();

        let index = MotionIndex::scan(&ctrl);
        let batch = [
            (ClipKey::Id(a), ClipTarget::new(b)),
            (ClipKey::Id(b), ClipTarget::new(c)),
        ]
        .into_iter()
        .collect();
        let mut store = MemoryClipStore::new("Generated");
        let report = rewrite_motions(
            &mut ctrl,
            &mut clips,
            &index,
            batch,
            &TransformRegistry::new(),
            &mut store,
        )
        .unwrap();

        assert_eq!(report.rewritten, 2);
        assert_eq!(ctrl.state(s1).unwrap().motion, Some(Motion::Clip(b)));
        assert_eq!(ctrl.state(s2).unwrap().motion, Some(Motion::Clip(c)));
    }

    #[test]
    fn shared_tree_is_written_once() {
        let mut clips = ClipLibrary::new();
        let (a, b) = (clips.create("A"), clips.create("B"));
        let mut ctrl = Controller::new("FX");
        let root = ctrl.add_layer("Base");
        let tree = ctrl.add_tree(BlendTree::new("Move", "Speed").with_children(vec![
            ChildMotion::new(Motion::Clip(a)).with_threshold(0.0),
            ChildMotion::new(Motion::Clip(a)).with_threshold(1.0),
        ]));
        ctrl.add_state(root, State::new("S1").with_motion(Motion::Tree(tree)));
        ctrl.add_state(root, State::new("S2").with_motion(Motion::Tree(tree)));

        let index = MotionIndex::scan(&ctrl);
        let mut batch = RemapBatch::new();
        batch.assign(ClipKey::Name("A".into()), ClipTarget::new(b));
        let report = rewrite_motions(
            &mut ctrl,
            &mut clips,
            &index,
            batch,
            &TransformRegistry::new(),
            &mut MemoryClipStore::new("Generated"),
        )
        .unwrap();

        assert_eq!(report.rewritten, 2);
        let children = ctrl.tree(tree).unwrap().children();
        assert!(children.iter().all(|c| c.motion == Some(Motion::Clip(b))));
        assert_eq!(children[1].threshold, 1.0);
    }

    #[test]
    fn state_swapped_off_a_tree_is_stale_for_that_clip_only() {
        let mut clips = ClipLibrary::new();
        let (a, b, c) = (clips.create("A"), clips.create("B"), clips.create("C"));
        let mut ctrl = Controller::new("FX");
        let root = ctrl.add_layer("Base");
        let tree = ctrl.add_tree(BlendTree::new("Move", "Speed").with_children(vec![
            ChildMotion::new(Motion::Clip(a)),
            ChildMotion::new(Motion::Clip(b)),
        ]));
        let s1 = ctrl
            .add_state(root, State::new("S1").with_motion(Motion::Tree(tree)))
            .unwrap();

        let index = MotionIndex::scan(&ctrl);
        ctrl.tree_mut(tree)
            .unwrap()
            .set_children(vec![ChildMotion::new(Motion::Clip(b))]);
        let batch = [
            (ClipKey::Id(a), ClipTarget::new(c)),
            (ClipKey::Id(b), ClipTarget::new(c)),
        ]
        .into_iter()
        .collect();
        let report = rewrite_motions(
            &mut ctrl,
            &mut clips,
            &index,
            batch,
            &TransformRegistry::new(),
            &mut MemoryClipStore::new("Generated"),
        )
        .unwrap();

        assert_eq!(
            report.issues,
            vec![SiteIssue::StaleMotionSite { clip: a, state: s1 }]
        );
        assert_eq!(report.rewritten, 1);
        assert_eq!(
            ctrl.tree(tree).unwrap().children()[0].motion,
            Some(Motion::Clip(c))
        );
    }
}

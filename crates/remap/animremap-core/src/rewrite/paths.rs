use hashbrown::HashSet;
use indexmap::IndexMap;
use log::{info, warn};

use crate::clip::ClipLibrary;
use crate::config::Config;
use crate::error::SiteIssue;
use crate::ids::{ClipId, NodeId};
use crate::index::{PathIndex, PathKey};
use crate::skeleton::SkeletonMap;

use super::{RemapBatch, RemapReport};

/// Move curve bindings from old paths onto the canonical path of the chosen node.
///
/// For every clip in the union of the affected usage sets the live bindings are re-read,
/// every binding to move is detached first and then all of them are re-attached under their
/// new path. Payloads are moved untouched; swapping two paths is safe.
pub fn rewrite_paths(
    clips: &mut ClipLibrary,
    index: &PathIndex,
    skeleton: &dyn SkeletonMap,
    batch: RemapBatch<PathKey, NodeId>,
    config: &Config,
) -> RemapReport {
    let mut report = RemapReport::default();
    let mut moves: IndexMap<ClipId, IndexMap<String, String>> = IndexMap::new();
    // Per clip, the old paths of each entry; an entry none of whose paths is still bound
    // is stale for that clip.
    let mut expected: IndexMap<ClipId, Vec<Vec<String>>> = IndexMap::new();

    for (key, target) in batch.chosen() {
        let Some(usage) = index.usage(key) else {
            continue;
        };
        let Some(new_path) = skeleton.path_of(*target) else {
            warn!("remap target {target:?} has no path; skipping {key:?}");
            report.issues.push(SiteIssue::UnresolvedTarget(*target));
            continue;
        };
        let old_paths: Vec<String> = usage
            .paths
            .iter()
            .filter(|old| **old != new_path)
            .cloned()
            .collect();
        if old_paths.is_empty() {
            continue;
        }
        for clip in &usage.clips {
            let per_clip = moves.entry(*clip).or_default();
            for old in &old_paths {
                per_clip.insert(old.clone(), new_path.clone());
            }
            expected.entry(*clip).or_default().push(old_paths.clone());
        }
    }

    for (clip_id, paths) in &moves {
        let Some(clip) = clips.get_mut(*clip_id) else {
            warn!("clip {clip_id:?} disappeared before rewrite");
            report.issues.push(SiteIssue::StaleClip(*clip_id));
            continue;
        };

        let mut bound: HashSet<String> = HashSet::new();
        let mut scalar = Vec::new();
        for binding in clip.curve_bindings() {
            if let Some(new_path) = paths.get(&binding.path) {
                if let Some(curve) = clip.set_curve(&binding, None) {
                    bound.insert(binding.path.clone());
                    scalar.push((binding.with_path(new_path.as_str()), curve));
                }
            }
        }
        let mut object = Vec::new();
        if config.include_object_reference_curves {
            for binding in clip.object_reference_curve_bindings() {
                if let Some(new_path) = paths.get(&binding.path) {
                    if let Some(keys) = clip.set_object_reference_curve(&binding, None) {
                        bound.insert(binding.path.clone());
                        object.push((binding.with_path(new_path.as_str()), keys));
                    }
                }
            }
        }

        for old_paths in expected.get(clip_id).into_iter().flatten() {
            if !old_paths.iter().any(|p| bound.contains(p)) {
                warn!("clip {clip_id:?} no longer binds {old_paths:?}; skipped");
                report.issues.push(SiteIssue::StaleBinding {
                    clip: *clip_id,
                    path: old_paths.join(", "),
                });
            }
        }

        for (binding, curve) in scalar {
            if clip.set_curve(&binding, Some(curve)).is_some() {
                warn!("clip {clip_id:?}: {binding:?} already had a curve; replaced");
                report.issues.push(SiteIssue::BindingOverwritten {
                    clip: *clip_id,
                    binding,
                });
            }
            report.rewritten += 1;
        }
        for (binding, keys) in object {
            if clip.set_object_reference_curve(&binding, Some(keys)).is_some() {
                warn!("clip {clip_id:?}: {binding:?} already had a curve; replaced");
                report.issues.push(SiteIssue::BindingOverwritten {
                    clip: *clip_id,
                    binding,
                });
            }
            report.rewritten += 1;
        }
    }

    info!(
        "path rewrite: {} bindings across {} clips, {} issues",
        report.rewritten,
        moves.len(),
        report.issues.len()
    );
    report
}

//! End-to-end remap flows.
//!
//! Every flow indexes the live graph, opens an [`EditBatch`] on the persistence gate,
//! rewrites, closes the batch, saves once and (when configured) re-indexes to confirm that
//! no remapped source is still referenced. A fatal error leaves the batch closed and skips
//! the save.

use hashbrown::HashSet;
use log::{info, warn};

use crate::clip::ClipLibrary;
use crate::config::Config;
use crate::error::RemapError;
use crate::external::Avatar;
use crate::graph::Controller;
use crate::ids::{ClipId, NodeId};
use crate::index::{MotionIndex, ParameterIndex, PathIndex, PathKey};
use crate::rewrite::{
    rewrite_motions, rewrite_parameters, rewrite_paths, ClipKey, ClipTarget, RemapBatch,
    RemapReport,
};
use crate::skeleton::SkeletonMap;
use crate::store::{ClipAssetStore, EditBatch, PersistenceGate};
use crate::template::{Template, TemplateAssignment, TemplateIndex};
use crate::transform::TransformRegistry;

/// Sources that are still referenced after a rewrite, by display name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Verification {
    pub residual: Vec<String>,
}

impl Verification {
    pub fn is_clean(&self) -> bool {
        self.residual.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionOutcome {
    pub report: RemapReport,
    /// `None` when `verify_after_rewrite` is off.
    pub verification: Option<Verification>,
}

fn finish(report: RemapReport, residual: Option<Vec<String>>) -> SessionOutcome {
    let verification = residual.map(|mut residual| {
        residual.sort();
        residual.dedup();
        if !residual.is_empty() {
            warn!("still referenced after rewrite: {residual:?}");
        }
        Verification { residual }
    });
    SessionOutcome {
        report,
        verification,
    }
}

/// Move curve bindings onto new skeleton paths.
pub fn repath(
    controller: &Controller,
    clips: &mut ClipLibrary,
    skeleton: &dyn SkeletonMap,
    remap: RemapBatch<PathKey, NodeId>,
    gate: &mut dyn PersistenceGate,
    config: &Config,
) -> Result<SessionOutcome, RemapError> {
    let index = PathIndex::scan(controller, clips, skeleton, config);
    let targets: HashSet<PathKey> = remap
        .chosen()
        .map(|(_, node)| PathKey::Resolved(*node))
        .collect();
    let sources: Vec<PathKey> = remap
        .chosen()
        .map(|(k, _)| k.clone())
        .filter(|k| !targets.contains(k))
        .collect();

    let report = {
        let _batch = EditBatch::open(gate);
        rewrite_paths(clips, &index, skeleton, remap, config)
    };
    gate.save()?;
    info!("repath '{}': {} bindings rewritten", controller.name, report.rewritten);

    let residual = config.verify_after_rewrite.then(|| {
        let after = PathIndex::scan(controller, clips, skeleton, config);
        sources
            .iter()
            .filter(|k| after.contains(k))
            .map(|k| match k {
                PathKey::Missing(path) => path.clone(),
                PathKey::Resolved(node) => skeleton
                    .path_of(*node)
                    .unwrap_or_else(|| format!("{node:?}")),
            })
            .collect()
    });
    Ok(finish(report, residual))
}

/// Clip sources of `keys` still present in `index`, ignoring clips that are themselves targets.
fn residual_clips<'k>(
    keys: impl Iterator<Item = &'k ClipKey>,
    index: &MotionIndex,
    clips: &ClipLibrary,
    targets: &HashSet<ClipId>,
) -> Vec<String> {
    let mut out = Vec::new();
    for key in keys {
        let still_used = match key {
            ClipKey::Id(id) => !targets.contains(id) && index.contains(*id),
            ClipKey::Name(name) => clips
                .find_by_name(name)
                .into_iter()
                .any(|c| !targets.contains(&c) && index.contains(c)),
        };
        if still_used {
            out.push(match key {
                ClipKey::Id(id) => clips
                    .name(*id)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{id:?}")),
                ClipKey::Name(name) => name.clone(),
            });
        }
    }
    out
}

/// Substitute clips in every state and blend tree of `controller`.
pub fn replace_clips(
    controller: &mut Controller,
    clips: &mut ClipLibrary,
    remap: RemapBatch<ClipKey, ClipTarget>,
    registry: &TransformRegistry,
    store: &mut dyn ClipAssetStore,
    gate: &mut dyn PersistenceGate,
    config: &Config,
) -> Result<SessionOutcome, RemapError> {
    let index = MotionIndex::scan(controller);
    let targets: HashSet<ClipId> = remap.chosen().map(|(_, t)| t.clip).collect();
    let sources: Vec<ClipKey> = remap.chosen().map(|(k, _)| k.clone()).collect();

    let report = {
        let _batch = EditBatch::open(gate);
        rewrite_motions(controller, clips, &index, remap, registry, store)?
    };
    gate.save()?;
    info!("replace clips '{}': {} slots rewritten", controller.name, report.rewritten);

    let residual = config.verify_after_rewrite.then(|| {
        let after = MotionIndex::scan(controller);
        residual_clips(sources.iter(), &after, clips, &targets)
    });
    Ok(finish(report, residual))
}

/// Rename parameters across every controller and external site of `avatar`.
pub fn rename_parameters(
    avatar: &mut Avatar,
    remap: RemapBatch<String, String>,
    gate: &mut dyn PersistenceGate,
    config: &Config,
) -> Result<SessionOutcome, RemapError> {
    let index = ParameterIndex::scan(avatar);
    let targets: HashSet<String> = remap.chosen().map(|(_, new)| new.clone()).collect();
    let sources: Vec<String> = remap
        .chosen()
        .map(|(old, _)| old.clone())
        .filter(|old| !targets.contains(old))
        .collect();

    let report = {
        let _batch = EditBatch::open(gate);
        rewrite_parameters(avatar, &index, remap)
    };
    gate.save()?;
    info!("rename parameters '{}': {} fields rewritten", avatar.name, report.rewritten);

    let residual = config.verify_after_rewrite.then(|| {
        let after = ParameterIndex::scan(avatar);
        sources.into_iter().filter(|old| after.contains(old)).collect()
    });
    Ok(finish(report, residual))
}

/// Replace template clips with the assigned clips, one system at a time.
///
/// Assignments are checked against the template before anything is touched; a template
/// error aborts with the graph unchanged.
#[allow(clippy::too_many_arguments)]
pub fn apply_template(
    controller: &mut Controller,
    clips: &mut ClipLibrary,
    template: &Template,
    assignments: &[TemplateAssignment],
    registry: &TransformRegistry,
    store: &mut dyn ClipAssetStore,
    gate: &mut dyn PersistenceGate,
    config: &Config,
) -> Result<SessionOutcome, RemapError> {
    let batches = template.batches(assignments)?;
    let index = TemplateIndex::build(controller, template);
    let targets: HashSet<ClipId> = assignments.iter().map(|a| a.replacement).collect();
    let sources: Vec<(String, Vec<ClipKey>)> = batches
        .iter()
        .map(|(system, batch)| (system.clone(), batch.keys().cloned().collect()))
        .collect();

    let mut report = RemapReport::default();
    {
        let _batch = EditBatch::open(gate);
        for (system, batch) in batches {
            let Some(system_index) = index.system(&system) else {
                continue;
            };
            report.merge(rewrite_motions(
                controller,
                clips,
                system_index,
                batch,
                registry,
                store,
            )?);
        }
    }
    gate.save()?;
    info!(
        "template on '{}': {} slots rewritten over {} systems",
        controller.name,
        report.rewritten,
        sources.len()
    );

    let residual = config.verify_after_rewrite.then(|| {
        let after = TemplateIndex::build(controller, template);
        let mut residual = Vec::new();
        for (system, keys) in &sources {
            if let Some(system_index) = after.system(system) {
                residual.extend(
                    residual_clips(keys.iter(), system_index, clips, &targets)
                        .into_iter()
                        .map(|name| format!("{system}/{name}")),
                );
            }
        }
        residual
    });
    Ok(finish(report, residual))
}

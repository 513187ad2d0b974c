//! Error and issue types.
//!
//! `RemapError`, `StoreError` and `LoadError` abort the operation that produced them.
//! `SiteIssue` describes a single usage site or remap entry that was skipped; issues are
//! collected into a [`crate::rewrite::RemapReport`] and never abort a batch.

use thiserror::Error;

use crate::clip::CurveBinding;
use crate::ids::{ClipId, NodeId, StateId};
use crate::traverse::ParameterSite;

/// Batch-level failures.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RemapError {
    #[error("unknown clip transform '{0}'")]
    UnknownTransform(String),
    #[error("template config error: {0}")]
    Template(String),
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures reported by the asset-storage collaborators.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("failed to create clip asset '{name}': {reason}")]
    Create { name: String, reason: String },
    #[error("failed to save assets: {0}")]
    Save(String),
}

/// Failures while reading stored controller, avatar or skeleton documents.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoadError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("unknown clip '{0}'")]
    UnknownClip(String),
    #[error("duplicate clip name '{0}'")]
    DuplicateClip(String),
    #[error("transition in '{owner}' targets unknown '{target}'")]
    UnknownDestination { owner: String, target: String },
    #[error("unknown {kind} '{name}'")]
    UnknownReference { kind: &'static str, name: String },
}

/// A skipped usage site or remap entry.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SiteIssue {
    #[error("clip {0:?} no longer exists")]
    StaleClip(ClipId),
    #[error("state {0:?} no longer exists")]
    StaleState(StateId),
    #[error("state {state:?} no longer uses clip {clip:?}")]
    StaleMotionSite { clip: ClipId, state: StateId },
    #[error("clip {clip:?} no longer binds '{path}'")]
    StaleBinding { clip: ClipId, path: String },
    #[error("parameter site {0:?} no longer references a remapped name")]
    StaleParameterSite(ParameterSite),
    #[error("replacement node {0:?} has no path in the skeleton")]
    UnresolvedTarget(NodeId),
    #[error("unknown transform '{transform}' requested for '{source_name}'")]
    UnknownTransform {
        source_name: String,
        transform: String,
    },
    #[error("curve at {binding:?} in clip {clip:?} was replaced by a rewritten binding")]
    BindingOverwritten { clip: ClipId, binding: CurveBinding },
}

//! Batch rewriter.
//!
//! A [`RemapBatch`] maps old identifiers of one kind to their replacements. Rewriting is a
//! single pass over the union of the indexed usage sites: every live value is looked up in
//! the batch once, so `A -> B, B -> C` never turns `A` into `C`. Sites that no longer exist
//! or no longer hold a remapped value are reported in the [`RemapReport`] and skipped.

use std::hash::Hash;

use indexmap::IndexMap;

use crate::error::SiteIssue;

mod motions;
mod parameters;
mod paths;

pub use motions::{rewrite_motions, ClipKey, ClipTarget};
pub use parameters::rewrite_parameters;
pub use paths::rewrite_paths;

/// Old identifier -> chosen replacement. Entries without a replacement are kept (so callers
/// can list every source) but ignored by the rewriter.
#[derive(Clone, Debug, PartialEq)]
pub struct RemapBatch<K: Hash + Eq, V> {
    entries: IndexMap<K, Option<V>>,
}

impl<K: Hash + Eq, V> Default for RemapBatch<K, V> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<K: Hash + Eq, V> RemapBatch<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose `value` as the replacement for `key`, replacing any earlier choice.
    pub fn assign(&mut self, key: K, value: V) -> &mut Self {
        self.entries.insert(key, Some(value));
        self
    }

    /// List `key` without a replacement.
    pub fn clear(&mut self, key: K) -> &mut Self {
        self.entries.insert(key, None);
        self
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).and_then(|v| v.as_ref())
    }

    /// Entries with a chosen replacement, in insertion order.
    pub fn chosen(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| (k, v)))
    }

    /// Every listed source, chosen or not.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Hash + Eq, V> FromIterator<(K, V)> for RemapBatch<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k, Some(v))).collect(),
        }
    }
}

/// Outcome of one rewrite pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RemapReport {
    /// Number of fields (bindings, motion slots, parameter fields) that were rewritten.
    pub rewritten: usize,
    pub issues: Vec<SiteIssue>,
}

impl RemapReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn merge(&mut self, other: RemapReport) {
        self.rewritten += other.rewritten;
        self.issues.extend(other.issues);
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The sorted tree and the merge engine.
//!
//! Flat keys like `env/room/temperature` are decomposed on the
//! server-announced separator and reconciled into a trie of
//! [`TreeNode`]s. Siblings at every level live in a `BTreeMap`, so
//! iteration order is ascending lexicographic regardless of insertion
//! order — consumers get stable, reproducible traversal.
//!
//! Cloning a [`Tree`] is the snapshot operation: the structure is copied
//! but leaf payloads are `Arc<str>` and stay shared, so readers holding a
//! prior snapshot are unaffected by later merges.
//!
//! # Example
//!
//! ```
//! use tree_sync::Tree;
//!
//! let mut tree = Tree::new();
//! let stats = tree.merge_batch(
//!     vec![("a/b", "1").into(), ("a/c", "2").into()],
//!     '/',
//! );
//! assert_eq!(stats.applied, 2);
//!
//! let a = tree.get("a", '/').unwrap();
//! assert!(a.value.is_none());
//! assert_eq!(a.children.as_ref().unwrap().len(), 2);
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::protocol::KeyValuePair;

/// One level of a key path.
pub type Segment = String;

/// Ordered segment → node mapping. `BTreeMap` supplies the sorted
/// associative container contract: get/insert plus deterministic ascending
/// iteration.
pub type Children = BTreeMap<Segment, TreeNode>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("empty keys cannot be merged")]
    EmptyKey,
}

/// A node in the key tree.
///
/// A node can be a leaf (`value` set), an interior node (`children` set),
/// or both at once: a key may be both a leaf and a prefix of other keys.
/// A node with neither is never retained after a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    /// Leaf payload, present if this exact key path was ever set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Arc<str>>,
    /// Ordered child index, present once at least one descendant exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Children>,
}

/// Counts for one merged batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Pairs applied to the tree.
    pub applied: usize,
    /// Pairs rejected as invalid and skipped.
    pub rejected: usize,
}

/// The entire currently known key space under the active subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Tree {
    roots: Children,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Discard all known data.
    pub fn clear(&mut self) {
        self.roots.clear();
    }

    /// The first-level segment index, in ascending segment order.
    pub fn roots(&self) -> &Children {
        &self.roots
    }

    /// Look up the node at a full key path.
    pub fn get(&self, key: &str, separator: char) -> Option<&TreeNode> {
        let mut segments = key.split(separator);
        let mut node = self.roots.get(segments.next()?)?;
        for segment in segments {
            node = node.children.as_ref()?.get(segment)?;
        }
        Some(node)
    }

    /// Number of leaves (nodes carrying a value) in the tree.
    pub fn leaf_count(&self) -> usize {
        fn count(children: &Children) -> usize {
            children
                .values()
                .map(|node| {
                    usize::from(node.value.is_some())
                        + node.children.as_ref().map_or(0, count)
                })
                .sum()
        }
        count(&self.roots)
    }

    /// Insert or overwrite a single key.
    ///
    /// The key is split on `separator` into segments; empty segments are
    /// legal and preserved (`a//b` is three levels). Intermediate nodes are
    /// created as needed. An empty key has no path and is rejected.
    pub fn insert(&mut self, key: &str, value: &str, separator: char) -> Result<(), MergeError> {
        if key.is_empty() {
            return Err(MergeError::EmptyKey);
        }
        let mut current = &mut self.roots;
        let mut segments = key.split(separator).peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                let node = current.entry(segment.to_owned()).or_default();
                node.value = Some(Arc::from(value));
                break;
            }
            current = current
                .entry(segment.to_owned())
                .or_default()
                .children
                .get_or_insert_with(Children::new);
        }
        Ok(())
    }

    /// Merge a batch of flat key/value pairs into the tree, in arrival
    /// order (last write wins within the batch).
    ///
    /// Invalid pairs are skipped and reported; the rest of the batch is
    /// still applied.
    pub fn merge_batch(
        &mut self,
        pairs: impl IntoIterator<Item = KeyValuePair>,
        separator: char,
    ) -> MergeStats {
        let mut stats = MergeStats::default();
        for pair in pairs {
            match self.insert(&pair.key, &pair.value, separator) {
                Ok(()) => stats.applied += 1,
                Err(error) => {
                    warn!(key = %pair.key, %error, "skipping pair rejected by merge engine");
                    stats.rejected += 1;
                }
            }
        }
        stats
    }
}

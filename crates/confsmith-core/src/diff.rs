use std::collections::HashSet;
use std::fmt;

use crate::path::{NodePath, PathSegment};
use crate::schema::{SchemaNodeId, SchemaNodeKind, SchemaSpec};
use crate::tree::{ConfigTree, NodeId};

/// A single difference between two configuration trees.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DiffEntry {
    /// A subtree present only in the new tree; the path names its root.
    Added { path: NodePath },
    /// A subtree present only in the old tree.
    Removed { path: NodePath },
    /// A leaf whose value changed.
    Changed {
        path: NodePath,
        old: String,
        new: String,
    },
}

impl DiffEntry {
    pub fn path(&self) -> &NodePath {
        match self {
            Self::Added { path } | Self::Removed { path } | Self::Changed { path, .. } => path,
        }
    }
}

impl fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added { path } => write!(f, "+ {path}"),
            Self::Removed { path } => write!(f, "- {path}"),
            Self::Changed { path, old, new } => write!(f, "~ {path}: '{old}' -> '{new}'"),
        }
    }
}

/// The body of a transaction: every addition, removal and value change
/// between a source and a target tree, keyed by node path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TreeDiff {
    entries: Vec<DiffEntry>,
}

impl TreeDiff {
    pub fn entries(&self) -> &[DiffEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn added(&self) -> impl Iterator<Item = &DiffEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e, DiffEntry::Added { .. }))
    }

    pub fn removed(&self) -> impl Iterator<Item = &DiffEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e, DiffEntry::Removed { .. }))
    }

    pub fn changed(&self) -> impl Iterator<Item = &DiffEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e, DiffEntry::Changed { .. }))
    }
}

impl fmt::Display for TreeDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "diff ({} entries)", self.entries.len())?;
        for e in &self.entries {
            writeln!(f, "  {e}")?;
        }
        Ok(())
    }
}

/// Pure function module for computing tree diffs.
pub struct DiffEngine;

impl DiffEngine {
    /// Compare two configuration trees and produce the diff that turns
    /// `old` into `new`.
    ///
    /// Keyed-list entries are matched by key values, leaf-list entries by
    /// value, everything else by element name. This is a pure function:
    /// no I/O, no side effects.
    pub fn diff(old: &ConfigTree, new: &ConfigTree, spec: &SchemaSpec) -> TreeDiff {
        let mut diff = TreeDiff::default();
        Self::diff_level(
            old,
            old.root(),
            new,
            new.root(),
            None,
            spec,
            &NodePath::root(),
            &mut diff,
        );
        tracing::trace!(entries = diff.len(), "computed tree diff");
        diff
    }

    #[allow(clippy::too_many_arguments)]
    fn diff_level(
        old: &ConfigTree,
        old_node: NodeId,
        new: &ConfigTree,
        new_node: NodeId,
        schema: Option<SchemaNodeId>,
        spec: &SchemaSpec,
        path: &NodePath,
        diff: &mut TreeDiff,
    ) {
        let mut matched_new: HashSet<NodeId> = HashSet::new();
        let mut matched_old: HashSet<NodeId> = HashSet::new();
        let mut pairs: Vec<(NodeId, NodeId, Option<SchemaNodeId>)> = Vec::new();

        // Pair up new children with old counterparts.
        for new_child in new.children(new_node).iter().copied() {
            let name = new.name(new_child);
            let child_schema = spec.data_child(schema, name);
            let counterpart = Self::counterpart(new, new_child, old, old_node, child_schema, spec)
                .filter(|c| !matched_old.contains(c));
            if let Some(old_child) = counterpart {
                matched_old.insert(old_child);
                matched_new.insert(new_child);
                pairs.push((old_child, new_child, child_schema));
            }
        }

        // Removed: old children with no counterpart.
        for old_child in old.children(old_node).iter().copied() {
            if !matched_old.contains(&old_child) {
                let seg = Self::segment(old, old_child, spec.data_child(schema, old.name(old_child)), spec);
                diff.entries.push(DiffEntry::Removed {
                    path: path.join(seg),
                });
            }
        }

        // Added: new children with no counterpart.
        for new_child in new.children(new_node).iter().copied() {
            if !matched_new.contains(&new_child) {
                let seg = Self::segment(new, new_child, spec.data_child(schema, new.name(new_child)), spec);
                diff.entries.push(DiffEntry::Added {
                    path: path.join(seg),
                });
            }
        }

        // Changed leaves and recursion into paired interior nodes.
        for (old_child, new_child, child_schema) in pairs {
            let seg = Self::segment(new, new_child, child_schema, spec);
            let child_path = path.join(seg);
            let old_is_leaf = old.children(old_child).is_empty();
            let new_is_leaf = new.children(new_child).is_empty();
            if old_is_leaf && new_is_leaf {
                let old_val = old.value(old_child).unwrap_or_default();
                let new_val = new.value(new_child).unwrap_or_default();
                if old_val != new_val {
                    diff.entries.push(DiffEntry::Changed {
                        path: child_path,
                        old: old_val.to_string(),
                        new: new_val.to_string(),
                    });
                }
            } else {
                Self::diff_level(
                    old,
                    old_child,
                    new,
                    new_child,
                    child_schema,
                    spec,
                    &child_path,
                    diff,
                );
            }
        }
    }

    /// Finds the old-side counterpart of a new-side child.
    fn counterpart(
        new: &ConfigTree,
        new_child: NodeId,
        old: &ConfigTree,
        old_node: NodeId,
        child_schema: Option<SchemaNodeId>,
        spec: &SchemaSpec,
    ) -> Option<NodeId> {
        let name = new.name(new_child);
        match child_schema.map(|s| &spec.node(s).kind) {
            Some(SchemaNodeKind::List { keys }) => {
                let key_values: Vec<(String, String)> = keys
                    .iter()
                    .filter_map(|k| {
                        new.first_child(new_child, k)
                            .and_then(|leaf| new.value(leaf))
                            .map(|v| (k.clone(), v.to_string()))
                    })
                    .collect();
                old.find_list_entry(old_node, name, &key_values)
            }
            Some(SchemaNodeKind::LeafList { .. }) => old
                .children_named(old_node, name)
                .find(|c| old.value(*c) == new.value(new_child)),
            _ => old.first_child(old_node, name),
        }
    }

    /// Builds the path segment for a child, with key predicates for
    /// keyed-list entries.
    fn segment(
        tree: &ConfigTree,
        id: NodeId,
        schema: Option<SchemaNodeId>,
        spec: &SchemaSpec,
    ) -> PathSegment {
        let keys = match schema.map(|s| &spec.node(s).kind) {
            Some(SchemaNodeKind::List { keys }) => keys
                .iter()
                .filter_map(|k| {
                    tree.first_child(id, k)
                        .and_then(|leaf| tree.value(leaf))
                        .map(|v| (k.clone(), v.to_string()))
                })
                .collect(),
            _ => Vec::new(),
        };
        PathSegment {
            name: tree.name(id).to_string(),
            keys,
        }
    }
}

use std::fmt;

use crate::path::{NodePath, PathSegment};
use crate::schema::SchemaNodeId;

/// Index of a node within its owning [`ConfigTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    value: Option<String>,
    attrs: Vec<(String, String)>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    schema: Option<SchemaNodeId>,
}

/// An in-memory configuration tree rooted at `<config>`.
///
/// Nodes live in an arena and are addressed by [`NodeId`]; the tree is
/// navigable both down (children) and up (parent). Detached nodes remain
/// allocated until the tree is cloned through [`ConfigTree::subtree`] or
/// dropped; configuration documents are small enough that this never
/// matters in practice.
#[derive(Debug, Clone)]
pub struct ConfigTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for ConfigTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigTree {
    /// Creates an empty tree: a `<config>` root with no children.
    pub fn new() -> Self {
        Self::with_root("config")
    }

    /// Creates an empty tree with a custom root element; used for
    /// protocol documents (`<rpc>`, `<rpc-reply>`, notifications).
    pub fn with_root(name: impl Into<String>) -> Self {
        let root = Node {
            name: name.into(),
            value: None,
            attrs: Vec::new(),
            parent: None,
            children: Vec::new(),
            schema: None,
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.nodes[id.index()].name
    }

    pub fn value(&self, id: NodeId) -> Option<&str> {
        self.nodes[id.index()].value.as_deref()
    }

    pub fn set_value(&mut self, id: NodeId, value: impl Into<String>) {
        self.nodes[id.index()].value = Some(value.into());
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    pub fn attrs(&self, id: NodeId) -> &[(String, String)] {
        &self.nodes[id.index()].attrs
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes[id.index()]
            .attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, id: NodeId, name: impl Into<String>, value: impl Into<String>) {
        self.nodes[id.index()].attrs.push((name.into(), value.into()));
    }

    pub fn schema_of(&self, id: NodeId) -> Option<SchemaNodeId> {
        self.nodes[id.index()].schema
    }

    pub fn set_schema(&mut self, id: NodeId, schema: SchemaNodeId) {
        self.nodes[id.index()].schema = Some(schema);
    }

    /// True when the root has no children.
    pub fn is_empty(&self) -> bool {
        self.nodes[self.root.index()].children.is_empty()
    }

    /// Number of reachable nodes, the root included.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.walk(self.root, &mut |_, _| count += 1);
        count
    }

    pub fn append_child(&mut self, parent: NodeId, name: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            name: name.into(),
            value: None,
            attrs: Vec::new(),
            parent: Some(parent),
            children: Vec::new(),
            schema: None,
        });
        self.nodes[parent.index()].children.push(id);
        id
    }

    pub fn append_leaf(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> NodeId {
        let id = self.append_child(parent, name);
        self.set_value(id, value);
        id
    }

    /// Detaches `id` from its parent. The root cannot be detached.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.index()].parent {
            self.nodes[parent.index()].children.retain(|c| *c != id);
            self.nodes[id.index()].parent = None;
        }
    }

    pub fn first_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|c| self.name(*c) == name)
    }

    pub fn children_named<'a>(
        &'a self,
        parent: NodeId,
        name: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.children(parent)
            .iter()
            .copied()
            .filter(move |c| self.name(*c) == name)
    }

    /// Finds a keyed list entry under `parent`: a child named `name` whose
    /// key leaves all carry the given values.
    pub fn find_list_entry(
        &self,
        parent: NodeId,
        name: &str,
        keys: &[(String, String)],
    ) -> Option<NodeId> {
        self.children_named(parent, name).find(|entry| {
            keys.iter().all(|(k, v)| {
                self.first_child(*entry, k)
                    .and_then(|leaf| self.value(leaf))
                    .is_some_and(|val| val == v)
            })
        })
    }

    /// Deep-copies the subtree rooted at `src_node` of `src` under `parent`,
    /// attributes included.
    pub fn graft(&mut self, parent: NodeId, src: &ConfigTree, src_node: NodeId) -> NodeId {
        let id = self.append_child(parent, src.name(src_node));
        if let Some(v) = src.value(src_node) {
            self.set_value(id, v);
        }
        for (k, v) in src.attrs(src_node) {
            self.set_attr(id, k.clone(), v.clone());
        }
        for child in src.children(src_node).iter().copied() {
            self.graft(id, src, child);
        }
        id
    }

    /// Removes every attribute from `id` and its descendants. Edit input
    /// carries `operation` attributes that must not reach stored content.
    pub fn clear_attrs_recursive(&mut self, id: NodeId) {
        self.nodes[id.index()].attrs.clear();
        for child in self.children(id).to_vec() {
            self.clear_attrs_recursive(child);
        }
    }

    /// Returns a fresh tree whose `<config>` root holds a copy of the
    /// children of `id` (or of the subtree `id` itself when it is not the
    /// root of `self`).
    pub fn subtree(&self, id: NodeId) -> ConfigTree {
        let mut out = ConfigTree::new();
        if id == self.root {
            for child in self.children(id).iter().copied() {
                out.graft(out.root(), self, child);
            }
        } else {
            out.graft(out.root(), self, id);
        }
        out
    }

    /// Depth-first pre-order walk from `id`, invoking `f(node, depth)`.
    pub fn walk<F: FnMut(NodeId, usize)>(&self, id: NodeId, f: &mut F) {
        self.walk_at(id, 0, f);
    }

    fn walk_at<F: FnMut(NodeId, usize)>(&self, id: NodeId, depth: usize, f: &mut F) {
        f(id, depth);
        for child in self.children(id).to_vec() {
            self.walk_at(child, depth + 1, f);
        }
    }

    /// Invokes `f` on every node whose path matches `filter`.
    /// Used by the schema-population pass and the read filter.
    pub fn apply<F: FnMut(&ConfigTree, NodeId)>(&self, filter: &NodePath, mut f: F) {
        for id in self.find(filter) {
            f(self, id);
        }
    }

    /// All nodes matching a path filter, in document order.
    pub fn find(&self, filter: &NodePath) -> Vec<NodeId> {
        let mut matches = vec![self.root];
        for seg in filter.segments() {
            let mut next = Vec::new();
            for m in matches {
                for child in self.children_named(m, &seg.name) {
                    if self.segment_matches(child, seg) {
                        next.push(child);
                    }
                }
            }
            matches = next;
            if matches.is_empty() {
                break;
            }
        }
        matches
    }

    /// First node matching a path filter.
    pub fn find_first(&self, filter: &NodePath) -> Option<NodeId> {
        self.find(filter).into_iter().next()
    }

    fn segment_matches(&self, id: NodeId, seg: &PathSegment) -> bool {
        seg.keys.iter().all(|(k, v)| {
            self.first_child(id, k)
                .and_then(|leaf| self.value(leaf))
                .is_some_and(|val| val == v)
        })
    }

    /// The path of `id` from the root, with `[key=value]` predicates for
    /// entries whose schema declares list keys.
    pub fn path_of(&self, id: NodeId, list_keys: impl Fn(NodeId) -> Vec<String>) -> NodePath {
        let mut segments = Vec::new();
        let mut cur = id;
        while cur != self.root {
            let keys = list_keys(cur)
                .into_iter()
                .filter_map(|k| {
                    self.first_child(cur, &k)
                        .and_then(|leaf| self.value(leaf))
                        .map(|v| (k, v.to_string()))
                })
                .collect();
            segments.push(PathSegment {
                name: self.name(cur).to_string(),
                keys,
            });
            match self.parent(cur) {
                Some(p) => cur = p,
                None => break,
            }
        }
        segments.reverse();
        NodePath::from_segments(segments)
    }

    /// Projects the subtrees matching `filter` into a fresh tree, keeping
    /// the ancestor chain of every match (the shape `get-config` replies
    /// need).
    pub fn project(&self, filter: &NodePath) -> ConfigTree {
        let mut out = ConfigTree::new();
        for m in self.find(filter) {
            // Rebuild the ancestor chain below the root.
            let mut chain = Vec::new();
            let mut cur = m;
            while cur != self.root {
                chain.push(cur);
                match self.parent(cur) {
                    Some(p) => cur = p,
                    None => break,
                }
            }
            chain.reverse();
            let mut dst = out.root();
            for (i, node) in chain.iter().enumerate() {
                if i + 1 == chain.len() {
                    out.graft(dst, self, *node);
                } else {
                    // Reuse an already-projected ancestor when present.
                    dst = match out.first_child(dst, self.name(*node)) {
                        Some(existing) => existing,
                        None => out.append_child(dst, self.name(*node)),
                    };
                }
            }
        }
        out
    }

    /// Semantic equality: element order among siblings is insignificant,
    /// names, values and multiplicity are not.
    pub fn semantic_eq(&self, other: &ConfigTree) -> bool {
        self.canonical(self.root) == other.canonical(other.root)
    }

    fn canonical(&self, id: NodeId) -> CanonNode {
        let mut children: Vec<CanonNode> = self
            .children(id)
            .iter()
            .map(|c| self.canonical(*c))
            .collect();
        children.sort();
        CanonNode {
            name: self.name(id).to_string(),
            value: self.value(id).map(str::to_string),
            children,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CanonNode {
    name: String,
    value: Option<String>,
    children: Vec<CanonNode>,
}

impl fmt::Display for ConfigTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn rec(tree: &ConfigTree, id: NodeId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "<{}", tree.name(id))?;
            if tree.children(id).is_empty() && tree.value(id).is_none() {
                return write!(f, "/>");
            }
            write!(f, ">")?;
            if let Some(v) = tree.value(id) {
                write!(f, "{v}")?;
            }
            for c in tree.children(id) {
                rec(tree, *c, f)?;
            }
            write!(f, "</{}>", tree.name(id))
        }
        rec(self, self.root, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConfigTree {
        let mut t = ConfigTree::new();
        let a = t.append_child(t.root(), "a");
        t.append_leaf(a, "x", "1");
        let servers = t.append_child(t.root(), "servers");
        let s1 = t.append_child(servers, "server");
        t.append_leaf(s1, "name", "web");
        t.append_leaf(s1, "port", "80");
        let s2 = t.append_child(servers, "server");
        t.append_leaf(s2, "name", "db");
        t.append_leaf(s2, "port", "5432");
        t
    }

    #[test]
    fn empty_tree() {
        let t = ConfigTree::new();
        assert!(t.is_empty());
        assert_eq!(t.name(t.root()), "config");
        assert_eq!(t.node_count(), 1);
    }

    #[test]
    fn append_and_navigate() {
        let t = sample();
        let a = t.first_child(t.root(), "a").unwrap();
        let x = t.first_child(a, "x").unwrap();
        assert_eq!(t.value(x), Some("1"));
        assert_eq!(t.parent(x), Some(a));
        assert_eq!(t.parent(a), Some(t.root()));
        assert!(t.parent(t.root()).is_none());
    }

    #[test]
    fn find_with_key_predicate() {
        let t = sample();
        let filter = NodePath::parse("/servers/server[name=db]/port").unwrap();
        let port = t.find_first(&filter).unwrap();
        assert_eq!(t.value(port), Some("5432"));
    }

    #[test]
    fn find_all_matches() {
        let t = sample();
        let filter = NodePath::parse("/servers/server").unwrap();
        assert_eq!(t.find(&filter).len(), 2);
    }

    #[test]
    fn find_list_entry_by_keys() {
        let t = sample();
        let servers = t.first_child(t.root(), "servers").unwrap();
        let hit = t.find_list_entry(
            servers,
            "server",
            &[("name".to_string(), "web".to_string())],
        );
        assert!(hit.is_some());
        let miss = t.find_list_entry(
            servers,
            "server",
            &[("name".to_string(), "cache".to_string())],
        );
        assert!(miss.is_none());
    }

    #[test]
    fn detach_removes_from_parent() {
        let mut t = sample();
        let a = t.first_child(t.root(), "a").unwrap();
        t.detach(a);
        assert!(t.first_child(t.root(), "a").is_none());
        assert_eq!(t.children(t.root()).len(), 1);
    }

    #[test]
    fn graft_deep_copies() {
        let src = sample();
        let mut dst = ConfigTree::new();
        let servers = src.first_child(src.root(), "servers").unwrap();
        dst.graft(dst.root(), &src, servers);
        let filter = NodePath::parse("/servers/server[name=web]/port").unwrap();
        let port = dst.find_first(&filter).unwrap();
        assert_eq!(dst.value(port), Some("80"));
    }

    #[test]
    fn subtree_of_root_copies_children() {
        let t = sample();
        let copy = t.subtree(t.root());
        assert!(t.semantic_eq(&copy));
    }

    #[test]
    fn semantic_eq_ignores_sibling_order() {
        let mut t1 = ConfigTree::new();
        t1.append_leaf(t1.root(), "a", "1");
        t1.append_leaf(t1.root(), "b", "2");
        let mut t2 = ConfigTree::new();
        t2.append_leaf(t2.root(), "b", "2");
        t2.append_leaf(t2.root(), "a", "1");
        assert!(t1.semantic_eq(&t2));
    }

    #[test]
    fn semantic_eq_detects_value_change() {
        let mut t1 = ConfigTree::new();
        t1.append_leaf(t1.root(), "a", "1");
        let mut t2 = ConfigTree::new();
        t2.append_leaf(t2.root(), "a", "2");
        assert!(!t1.semantic_eq(&t2));
    }

    #[test]
    fn semantic_eq_respects_multiplicity() {
        let mut t1 = ConfigTree::new();
        t1.append_leaf(t1.root(), "tag", "x");
        t1.append_leaf(t1.root(), "tag", "x");
        let mut t2 = ConfigTree::new();
        t2.append_leaf(t2.root(), "tag", "x");
        assert!(!t1.semantic_eq(&t2));
    }

    #[test]
    fn path_of_with_list_keys() {
        let t = sample();
        let filter = NodePath::parse("/servers/server[name=db]/port").unwrap();
        let port = t.find_first(&filter).unwrap();
        let path = t.path_of(port, |id| {
            if t.name(id) == "server" {
                vec!["name".to_string()]
            } else {
                Vec::new()
            }
        });
        assert_eq!(path.to_string(), "/servers/server[name=db]/port");
    }

    #[test]
    fn project_keeps_ancestor_chain() {
        let t = sample();
        let filter = NodePath::parse("/servers/server[name=web]").unwrap();
        let projected = t.project(&filter);
        let port = projected
            .find_first(&NodePath::parse("/servers/server/port").unwrap())
            .unwrap();
        assert_eq!(projected.value(port), Some("80"));
        // The db server is filtered out.
        assert_eq!(
            projected
                .find(&NodePath::parse("/servers/server").unwrap())
                .len(),
            1
        );
    }

    #[test]
    fn apply_visits_matches() {
        let t = sample();
        let filter = NodePath::parse("/servers/server/port").unwrap();
        let mut ports = Vec::new();
        t.apply(&filter, |tree, id| {
            ports.push(tree.value(id).unwrap_or_default().to_string());
        });
        assert_eq!(ports, vec!["80", "5432"]);
    }

    #[test]
    fn walk_visits_all_nodes() {
        let t = sample();
        let mut names = Vec::new();
        t.walk(t.root(), &mut |id, _| names.push(t.name(id).to_string()));
        assert_eq!(names[0], "config");
        assert!(names.contains(&"port".to_string()));
        assert_eq!(names.len(), t.node_count());
    }

    #[test]
    fn display_renders_compact_xmlish() {
        let mut t = ConfigTree::new();
        t.append_leaf(t.root(), "a", "1");
        assert_eq!(t.to_string(), "<config><a>1</a></config>");
        assert_eq!(ConfigTree::new().to_string(), "<config/>");
    }

    #[test]
    fn attrs_on_edit_input() {
        let mut t = ConfigTree::new();
        let a = t.append_child(t.root(), "a");
        t.set_attr(a, "operation", "delete");
        assert_eq!(t.attr(a, "operation"), Some("delete"));
        assert_eq!(t.attr(a, "missing"), None);
    }
}

use sha2::{Digest, Sha256};

use crate::error::ModelError;

use super::module::{Module, UnknownStatement};
use super::node::{SchemaNode, SchemaNodeId, SchemaNodeKind};

/// The loaded schema: every module and every schema node, immutable once
/// built. Construction goes through [`SchemaSpecBuilder`]; after `finish`
/// the spec is shared freely (typically behind an `Arc`).
#[derive(Debug, Clone)]
pub struct SchemaSpec {
    modules: Vec<Module>,
    nodes: Vec<SchemaNode>,
}

impl SchemaSpec {
    pub fn builder() -> SchemaSpecBuilder {
        SchemaSpecBuilder::default()
    }

    /// An empty spec: valid, matches only the empty configuration.
    pub fn empty() -> Self {
        Self {
            modules: Vec::new(),
            nodes: Vec::new(),
        }
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.name == name)
    }

    pub fn node(&self, id: SchemaNodeId) -> &SchemaNode {
        &self.nodes[id.index()]
    }

    /// Looks up a top-level data node by name across all modules.
    pub fn top_node(&self, name: &str) -> Option<SchemaNodeId> {
        self.modules
            .iter()
            .flat_map(|m| m.top.iter().copied())
            .find(|id| self.node(*id).name == name)
    }

    /// Resolves the schema node for a data child named `name` under
    /// `parent` (`None` means the `<config>` root). Choice and case nodes
    /// are transparent: data elements never spell them out.
    pub fn data_child(&self, parent: Option<SchemaNodeId>, name: &str) -> Option<SchemaNodeId> {
        let candidates: Vec<SchemaNodeId> = match parent {
            None => self
                .modules
                .iter()
                .flat_map(|m| m.top.iter().copied())
                .collect(),
            Some(p) => self.node(p).children.clone(),
        };
        for id in candidates {
            let node = self.node(id);
            match node.kind {
                SchemaNodeKind::Choice | SchemaNodeKind::Case => {
                    if let Some(hit) = self.data_child(Some(id), name) {
                        return Some(hit);
                    }
                }
                _ => {
                    if node.name == name {
                        return Some(id);
                    }
                }
            }
        }
        None
    }

    /// The key leaf names of a list node; empty for anything else.
    pub fn list_keys(&self, id: SchemaNodeId) -> &[String] {
        match &self.node(id).kind {
            SchemaNodeKind::List { keys } => keys,
            _ => &[],
        }
    }

    /// Walks up from `id` to the nearest enclosing choice, if `id` sits
    /// inside one, returning `(choice, case)`.
    pub fn enclosing_case(&self, id: SchemaNodeId) -> Option<(SchemaNodeId, SchemaNodeId)> {
        let mut cur = id;
        while let Some(parent) = self.node(cur).parent {
            if matches!(self.node(parent).kind, SchemaNodeKind::Choice) {
                return Some((parent, cur));
            }
            cur = parent;
        }
        None
    }

    /// `(module name, revision)` pairs, sorted by name.
    pub fn module_revisions(&self) -> Vec<(String, Option<String>)> {
        let mut out: Vec<_> = self
            .modules
            .iter()
            .map(|m| (m.name.clone(), m.revision.clone()))
            .collect();
        out.sort();
        out
    }

    /// The module-state fingerprint: SHA-256 over the sorted
    /// `name@revision` list, hex-encoded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (name, revision) in self.module_revisions() {
            hasher.update(name.as_bytes());
            hasher.update(b"@");
            hasher.update(revision.as_deref().unwrap_or("none").as_bytes());
            hasher.update(b";");
        }
        hex::encode(hasher.finalize())
    }

    /// Drains unbound extension statements for a binding pass; the engine
    /// pushes back whatever stays unresolved.
    pub fn take_unknowns(&mut self, module: usize) -> Vec<UnknownStatement> {
        std::mem::take(&mut self.modules[module].unknown)
    }

    pub fn module_mut(&mut self, module: usize) -> &mut Module {
        &mut self.modules[module]
    }
}

fn valid_module_name(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Builds a [`SchemaSpec`] incrementally; the only mutation point.
#[derive(Debug, Default)]
pub struct SchemaSpecBuilder {
    modules: Vec<Module>,
    nodes: Vec<SchemaNode>,
}

impl SchemaSpecBuilder {
    /// Declares a module and returns its index.
    pub fn module(
        &mut self,
        name: &str,
        namespace: &str,
        prefix: &str,
    ) -> Result<usize, ModelError> {
        if !valid_module_name(name) {
            return Err(ModelError::InvalidModuleName(name.to_string()));
        }
        if self.modules.iter().any(|m| m.name == name) {
            return Err(ModelError::DuplicateModule(name.to_string()));
        }
        self.modules.push(Module {
            name: name.to_string(),
            namespace: namespace.to_string(),
            prefix: prefix.to_string(),
            revision: None,
            features: Vec::new(),
            unknown: Vec::new(),
            top: Vec::new(),
        });
        Ok(self.modules.len() - 1)
    }

    pub fn set_namespace(&mut self, module: usize, namespace: &str) {
        self.modules[module].namespace = namespace.to_string();
    }

    pub fn set_prefix(&mut self, module: usize, prefix: &str) {
        self.modules[module].prefix = prefix.to_string();
    }

    pub fn set_revision(&mut self, module: usize, revision: &str) {
        self.modules[module].revision = Some(revision.to_string());
    }

    pub fn namespace(&self, module: usize) -> &str {
        &self.modules[module].namespace
    }

    pub fn prefix(&self, module: usize) -> &str {
        &self.modules[module].prefix
    }

    pub fn add_feature(&mut self, module: usize, feature: &str) {
        self.modules[module].features.push(feature.to_string());
    }

    pub fn add_unknown(&mut self, module: usize, stmt: UnknownStatement) {
        self.modules[module].unknown.push(stmt);
    }

    /// Adds a schema node under `parent` (`None` = module top level).
    pub fn add_node(
        &mut self,
        module: usize,
        parent: Option<SchemaNodeId>,
        name: &str,
        kind: SchemaNodeKind,
    ) -> SchemaNodeId {
        let id = SchemaNodeId(self.nodes.len() as u32);
        self.nodes.push(SchemaNode {
            name: name.to_string(),
            kind,
            parent,
            children: Vec::new(),
            module,
        });
        match parent {
            Some(p) => self.nodes[p.index()].children.push(id),
            None => self.modules[module].top.push(id),
        }
        id
    }

    /// Marks a container node as a presence container.
    /// No effect on other node kinds.
    pub fn set_presence(&mut self, id: SchemaNodeId) {
        if let SchemaNodeKind::Container { presence } = &mut self.nodes[id.index()].kind {
            *presence = true;
        }
    }

    /// Sets the key leaves of a list node. No effect on other node kinds.
    pub fn set_list_keys(&mut self, id: SchemaNodeId, new_keys: Vec<String>) {
        if let SchemaNodeKind::List { keys } = &mut self.nodes[id.index()].kind {
            *keys = new_keys;
        }
    }

    /// Finalizes the spec, checking that every list key names a defined
    /// child leaf.
    pub fn finish(self) -> Result<SchemaSpec, ModelError> {
        for node in &self.nodes {
            if let SchemaNodeKind::List { keys } = &node.kind {
                for key in keys {
                    let defined = node.children.iter().any(|c| {
                        let child = &self.nodes[c.index()];
                        child.name == *key
                            && matches!(child.kind, SchemaNodeKind::Leaf { .. })
                    });
                    if !defined {
                        return Err(ModelError::UndefinedListKey {
                            list: node.name.clone(),
                            key: key.clone(),
                        });
                    }
                }
            }
        }
        Ok(SchemaSpec {
            modules: self.modules,
            nodes: self.nodes,
        })
    }
}

use std::fmt;

use super::node::SchemaNodeId;

/// A statement the parser did not recognize: `prefix:keyword "argument";`.
///
/// These are carried verbatim so the plugin registry's extension-binding
/// pass can resolve them during schema load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatement {
    pub prefix: String,
    pub keyword: String,
    pub argument: Option<String>,
}

impl fmt::Display for UnknownStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.argument {
            Some(arg) => write!(f, "{}:{} \"{arg}\"", self.prefix, self.keyword),
            None => write!(f, "{}:{}", self.prefix, self.keyword),
        }
    }
}

/// One loaded yang-lite module.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub namespace: String,
    pub prefix: String,
    pub revision: Option<String>,
    pub features: Vec<String>,
    /// Extension statements awaiting (or left over after) binding.
    pub unknown: Vec<UnknownStatement>,
    /// Top-level data nodes declared by this module.
    pub top: Vec<SchemaNodeId>,
}

impl Module {
    pub fn has_feature(&self, name: &str) -> bool {
        self.features.iter().any(|f| f == name)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.revision {
            Some(rev) => write!(f, "{}@{rev}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

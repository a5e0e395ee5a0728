use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

fn valid_element_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// One step of a node path: an element name plus optional list-key
/// predicates, e.g. `interface[name=eth0]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathSegment {
    pub name: String,
    /// `[key=value]` predicates, in source order.
    pub keys: Vec<(String, String)>,
}

impl PathSegment {
    /// Creates a predicate-free segment, validating the element name.
    pub fn new(name: &str) -> Result<Self, ModelError> {
        if !valid_element_name(name) {
            return Err(ModelError::InvalidElementName(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            keys: Vec::new(),
        })
    }

    /// Creates a segment with `[key=value]` predicates.
    pub fn with_keys(name: &str, keys: Vec<(String, String)>) -> Result<Self, ModelError> {
        let mut seg = Self::new(name)?;
        seg.keys = keys;
        Ok(seg)
    }

    fn parse(text: &str) -> Result<Self, ModelError> {
        let invalid = || ModelError::InvalidPathSegment(text.to_string());
        match text.find('[') {
            None => Self::new(text).map_err(|_| invalid()),
            Some(open) => {
                let name = &text[..open];
                let mut keys = Vec::new();
                let mut rest = &text[open..];
                while !rest.is_empty() {
                    if !rest.starts_with('[') {
                        return Err(invalid());
                    }
                    let close = rest.find(']').ok_or_else(invalid)?;
                    let inner = &rest[1..close];
                    let eq = inner.find('=').ok_or_else(invalid)?;
                    let key = inner[..eq].trim();
                    let value = inner[eq + 1..].trim().trim_matches('\'').trim_matches('"');
                    if !valid_element_name(key) {
                        return Err(invalid());
                    }
                    keys.push((key.to_string(), value.to_string()));
                    rest = &rest[close + 1..];
                }
                Self::with_keys(name, keys).map_err(|_| invalid())
            }
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for (k, v) in &self.keys {
            write!(f, "[{k}={v}]")?;
        }
        Ok(())
    }
}

/// A slash-separated node path below the `<config>` root, used both as a
/// diff key and as the read-filter syntax, e.g.
/// `/interfaces/interface[name=eth0]/mtu`.
///
/// This is deliberately the filter subset the datastore needs, not a full
/// XPath implementation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodePath(Vec<PathSegment>);

impl NodePath {
    /// An empty path addressing the `<config>` root itself.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    /// Parses `/a/b[k=v]/c` syntax. A lone `/` addresses the root.
    pub fn parse(s: &str) -> Result<Self, ModelError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ModelError::EmptyPath);
        }
        let body = trimmed.strip_prefix('/').unwrap_or(trimmed);
        if body.is_empty() {
            return Ok(Self::root());
        }
        let mut segments = Vec::new();
        for part in split_segments(body) {
            segments.push(PathSegment::parse(&part)?);
        }
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns this path extended by one segment.
    pub fn join(&self, segment: PathSegment) -> Self {
        let mut segs = self.0.clone();
        segs.push(segment);
        Self(segs)
    }

    /// Returns the path without its final segment, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }
}

/// Split on `/` but not inside `[...]` predicates.
fn split_segments(body: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for c in body.chars() {
        match c {
            '[' => {
                depth += 1;
                current.push(c);
            }
            ']' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            '/' if depth == 0 => {
                out.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    out.push(current);
    out
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for seg in &self.0 {
            write!(f, "/{seg}")?;
        }
        Ok(())
    }
}

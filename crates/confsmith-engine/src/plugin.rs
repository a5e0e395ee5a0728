use std::fmt;
use std::sync::Arc;

use confsmith_core::rpc_error::RpcError;
use confsmith_core::schema::{Module, SchemaSpec, UnknownStatement};
use confsmith_core::tree::ConfigTree;
use confsmith_store::Datastore;

use crate::error::{EngineError, PluginError};
use crate::txn::TransactionView;

/// The lifecycle callbacks a plugin can opt into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Capability {
    Reset = 1 << 0,
    PreValidate = 1 << 1,
    Validate = 1 << 2,
    Commit = 1 << 3,
    CommitDone = 1 << 4,
    Rollback = 1 << 5,
    Auth = 1 << 6,
    Extension = 1 << 7,
}

impl Capability {
    pub const ALL: [Capability; 8] = [
        Self::Reset,
        Self::PreValidate,
        Self::Validate,
        Self::Commit,
        Self::CommitDone,
        Self::Rollback,
        Self::Auth,
        Self::Extension,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::PreValidate => "pre-validate",
            Self::Validate => "validate",
            Self::Commit => "commit",
            Self::CommitDone => "commit-done",
            Self::Rollback => "rollback",
            Self::Auth => "auth",
            Self::Extension => "extension",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The subset of callbacks a plugin declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilitySet(u16);

impl CapabilitySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn with(self, cap: Capability) -> Self {
        Self(self.0 | cap as u16)
    }

    pub fn contains(&self, cap: Capability) -> bool {
        self.0 & cap as u16 != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Capability::ALL
            .iter()
            .filter(|c| self.contains(**c))
            .map(|c| c.as_str())
            .collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// A validation-phase decision from a plugin.
#[derive(Debug, Clone, PartialEq)]
pub enum PluginVerdict {
    Accept,
    Reject(RpcError),
}

/// What an auth-capable plugin decided about a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Accept { username: String },
    Reject,
}

/// Credentials presented by a connecting client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub secret: Option<String>,
}

/// A configuration extension. Every method has a no-op default; a plugin
/// implements the subset matching its declared capability set, and the
/// engine only invokes callbacks the capability set names.
pub trait ConfigPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> CapabilitySet;

    /// Seed `db` with application state during the extra-XML phase of boot.
    fn reset(&self, _db: &str, _store: &Datastore) -> Result<(), PluginError> {
        Ok(())
    }

    /// Early veto on the candidate tree, before expensive validation.
    fn pre_validate(&self, _candidate: &ConfigTree) -> Result<PluginVerdict, PluginError> {
        Ok(PluginVerdict::Accept)
    }

    /// Inspect the transaction diff; may reject with an error document.
    fn validate(&self, _txn: &TransactionView<'_>) -> Result<PluginVerdict, PluginError> {
        Ok(PluginVerdict::Accept)
    }

    /// Side-effect phase. Not retried; a failure triggers rollback of
    /// every previously-succeeded plugin.
    fn commit(&self, _txn: &TransactionView<'_>) -> Result<(), PluginError> {
        Ok(())
    }

    /// Post-success notification; failures are logged, never undone.
    fn commit_done(&self, _txn: &TransactionView<'_>) -> Result<(), PluginError> {
        Ok(())
    }

    /// Compensate for an earlier `commit` after a later plugin failed.
    fn rollback(&self, _txn: &TransactionView<'_>) -> Result<(), PluginError> {
        Ok(())
    }

    /// Gate an RPC. Only consulted when the capability set names `Auth`;
    /// the default refuses, so an auth plugin must opt in explicitly.
    fn authenticate(&self, _credentials: &Credentials) -> Result<AuthDecision, PluginError> {
        Ok(AuthDecision::Reject)
    }

    /// Bind one unknown schema statement. Returns `true` when the
    /// statement was resolved; the module may be mutated to record the
    /// resolved definition.
    fn extension(
        &self,
        _stmt: &UnknownStatement,
        _module: &mut Module,
    ) -> Result<bool, PluginError> {
        Ok(false)
    }
}

/// A registered extension.
pub struct PluginEntry {
    name: String,
    capabilities: CapabilitySet,
    plugin: Arc<dyn ConfigPlugin>,
}

impl PluginEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    pub fn plugin(&self) -> &Arc<dyn ConfigPlugin> {
        &self.plugin
    }
}

impl fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginEntry")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// Ordered set of registered extensions. Registration order is stable and
/// is the order commit phases fire in; unregistration compacts the list
/// but preserves relative order.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    entries: Vec<PluginEntry>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry seeded with the engine's internal pseudo-plugin, which
    /// hosts built-in extension bindings.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register(Arc::new(BuiltinExtensions))
            .expect("empty registry accepts builtins");
        registry
    }

    /// Appends a plugin. Names must be unique.
    pub fn register(&mut self, plugin: Arc<dyn ConfigPlugin>) -> Result<(), PluginError> {
        let name = plugin.name().to_string();
        if self.entries.iter().any(|e| e.name == name) {
            return Err(PluginError::new(format!(
                "plugin '{name}' is already registered"
            )));
        }
        let capabilities = plugin.capabilities();
        tracing::info!(plugin = %name, capabilities = %capabilities, "plugin registered");
        self.entries.push(PluginEntry {
            name,
            capabilities,
            plugin,
        });
        Ok(())
    }

    /// Removes a plugin by name. Returns whether it was present.
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.name != name);
        before != self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginEntry> {
        self.entries.iter()
    }

    /// Plugins declaring `cap`, in registration order.
    pub fn with_capability(&self, cap: Capability) -> impl Iterator<Item = &PluginEntry> {
        self.entries.iter().filter(move |e| e.capabilities.contains(cap))
    }

    pub fn has_capability(&self, cap: Capability) -> bool {
        self.entries.iter().any(|e| e.capabilities.contains(cap))
    }
}

/// Fires the `extension` callback once per unknown statement collected
/// during schema load. Statements no plugin binds are kept on the module
/// and logged.
pub fn bind_extensions(
    spec: &mut SchemaSpec,
    registry: &PluginRegistry,
) -> Result<(), EngineError> {
    for module_idx in 0..spec.modules().len() {
        let stmts = spec.take_unknowns(module_idx);
        for stmt in stmts {
            let mut bound = false;
            for entry in registry.with_capability(Capability::Extension) {
                bound = entry
                    .plugin()
                    .extension(&stmt, spec.module_mut(module_idx))
                    .map_err(|e| EngineError::Plugin {
                        plugin: entry.name().to_string(),
                        phase: "extension".to_string(),
                        message: e.message,
                    })?;
                if bound {
                    tracing::debug!(
                        plugin = entry.name(),
                        statement = %stmt,
                        "extension statement bound"
                    );
                    break;
                }
            }
            if !bound {
                tracing::warn!(statement = %stmt, "unknown statement left unbound");
                spec.module_mut(module_idx).unknown.push(stmt);
            }
        }
    }
    Ok(())
}

/// The internal pseudo-plugin: resolves `*:feature "name"` extension
/// statements by inserting the named feature into the owning module.
struct BuiltinExtensions;

impl ConfigPlugin for BuiltinExtensions {
    fn name(&self) -> &str {
        "builtin-extensions"
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::empty().with(Capability::Extension)
    }

    fn extension(
        &self,
        stmt: &UnknownStatement,
        module: &mut Module,
    ) -> Result<bool, PluginError> {
        if stmt.keyword != "feature" {
            return Ok(false);
        }
        match &stmt.argument {
            Some(feature) => {
                if !module.has_feature(feature) {
                    module.features.push(feature.clone());
                }
                Ok(true)
            }
            None => Err(PluginError::new(format!(
                "{}:{} requires a feature name argument",
                stmt.prefix, stmt.keyword
            ))),
        }
    }
}

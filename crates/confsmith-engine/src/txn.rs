use std::fmt;
use std::str::FromStr;

use confsmith_core::diff::{DiffEngine, TreeDiff};
use confsmith_core::rpc_error::{ErrorTag, RpcError};
use confsmith_core::tree::ConfigTree;
use confsmith_core::validate::Validator;
use confsmith_store::{StoreError, RUNNING};
use mti::prelude::{MagicTypeId, MagicTypeIdExt, V7};

use crate::backend::Backend;
use crate::error::EngineError;
use crate::plugin::{Capability, PluginEntry, PluginVerdict};

const TXN_PREFIX: &str = "txn";

/// A TypeID-based transaction identifier with prefix "txn".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxnId(MagicTypeId);

impl TxnId {
    /// Generates a new random `TxnId` using UUIDv7.
    pub fn new() -> Self {
        Self(TXN_PREFIX.create_type_id::<V7>())
    }

    /// Parses a `TxnId` from its string representation, validating the
    /// "txn" prefix.
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        let id = MagicTypeId::from_str(s)
            .map_err(|e| EngineError::Internal(format!("bad transaction id: {e}")))?;
        if id.prefix().as_str() != TXN_PREFIX {
            return Err(EngineError::Internal(format!(
                "expected prefix '{TXN_PREFIX}', got '{}'",
                id.prefix().as_str()
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Default for TxnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stages of the commit state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStage {
    Init,
    Diffed,
    PreValidated,
    Validated,
    Committing,
    /// Terminal success.
    Done,
    /// Terminal failure, rollback completed.
    Failed,
}

impl fmt::Display for TxnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::Diffed => "diffed",
            Self::PreValidated => "pre-validated",
            Self::Validated => "validated",
            Self::Committing => "committing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A pending commit attempt. Owns its diff and the undo snapshot of the
/// target; destroyed at a terminal stage.
#[derive(Debug)]
pub struct Transaction {
    pub id: TxnId,
    pub source: String,
    pub target: String,
    pub actor: String,
    pub stage: TxnStage,
    pub diff: TreeDiff,
    source_tree: ConfigTree,
    /// Pre-transaction target content; the undo handle.
    target_tree: ConfigTree,
}

impl Transaction {
    /// The read-only view plugins receive.
    pub fn view(&self) -> TransactionView<'_> {
        TransactionView {
            id: &self.id,
            source: &self.source,
            target: &self.target,
            actor: &self.actor,
            diff: &self.diff,
            source_tree: &self.source_tree,
            target_tree: &self.target_tree,
        }
    }
}

/// What a plugin sees of a transaction: the databases involved, the diff,
/// and both trees. Plugins never mutate the transaction.
#[derive(Debug, Clone, Copy)]
pub struct TransactionView<'a> {
    pub id: &'a TxnId,
    pub source: &'a str,
    pub target: &'a str,
    pub actor: &'a str,
    pub diff: &'a TreeDiff,
    pub source_tree: &'a ConfigTree,
    pub target_tree: &'a ConfigTree,
}

/// Why a commit was rejected without an engine-level error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The source database was not parseable; nothing was mutated.
    BrokenSource,
    /// The static validator or a plugin vetoed the content; nothing was
    /// mutated.
    ValidationFailed,
    /// A plugin's commit phase failed; rollback ran and the target was
    /// restored.
    PluginCommitFailed { plugin: String },
}

/// Three-way commit result: published, nothing to do, or rejected with
/// the error document to return to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// The target now holds the source content.
    Committed,
    /// Empty diff; the target was not rewritten.
    NoChange,
    Rejected {
        reason: RejectReason,
        error: RpcError,
    },
}

impl CommitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Committed | Self::NoChange)
    }
}

/// Runs the commit state machine: `source` content is validated, plugin
/// phases fire in registration order, and on success the target database
/// atomically advances to the source content. On any failure after
/// mutation began, the target is restored from the undo snapshot.
pub fn commit(
    backend: &Backend,
    source: &str,
    target: &str,
    actor: &str,
) -> Result<CommitOutcome, EngineError> {
    if source == target {
        return Err(EngineError::NotSupported(format!(
            "cannot commit database '{source}' onto itself"
        )));
    }
    let store = &backend.store;
    if !store.exists(target) {
        store.create(target)?;
    }

    // INIT: snapshot the target as the undo handle.
    let undo = store.read(target, None)?;

    // DIFF: a broken source rejects without mutation.
    let source_tree = match store.read(source, None) {
        Ok(tree) => tree,
        Err(StoreError::Corrupt { db, source }) => {
            return Ok(CommitOutcome::Rejected {
                reason: RejectReason::BrokenSource,
                error: RpcError::application(
                    ErrorTag::OperationFailed,
                    format!("database '{db}' is not parseable: {source}"),
                )
                .with_app_tag("broken-source"),
            });
        }
        Err(e) => return Err(e.into()),
    };
    let diff = DiffEngine::diff(&undo, &source_tree, &backend.schema);
    let mut txn = Transaction {
        id: TxnId::new(),
        source: source.to_string(),
        target: target.to_string(),
        actor: actor.to_string(),
        stage: TxnStage::Diffed,
        diff,
        source_tree,
        target_tree: undo,
    };
    tracing::debug!(txn = %txn.id, source, target, entries = txn.diff.len(), "transaction diffed");

    // Empty diff (which also covers source == target content): skip every
    // phase and do not rewrite the target.
    if txn.diff.is_empty() {
        tracing::debug!(txn = %txn.id, "empty diff, nothing to commit");
        return Ok(CommitOutcome::NoChange);
    }

    // PRE-VALIDATE
    for entry in backend.plugins.with_capability(Capability::PreValidate) {
        match entry.plugin().pre_validate(&txn.source_tree) {
            Ok(PluginVerdict::Accept) => {}
            Ok(PluginVerdict::Reject(error)) => {
                txn.stage = TxnStage::Failed;
                tracing::info!(txn = %txn.id, plugin = entry.name(), "pre-validate rejected");
                return Ok(CommitOutcome::Rejected {
                    reason: RejectReason::ValidationFailed,
                    error,
                });
            }
            Err(e) => {
                txn.stage = TxnStage::Failed;
                return Err(EngineError::Plugin {
                    plugin: entry.name().to_string(),
                    phase: "pre-validate".to_string(),
                    message: e.message,
                });
            }
        }
    }
    txn.stage = TxnStage::PreValidated;

    // VALIDATE: static validator first, then plugin phases over the diff.
    if let Err(mut errors) = Validator::validate(&txn.source_tree, &backend.schema) {
        txn.stage = TxnStage::Failed;
        for e in &errors {
            tracing::info!(txn = %txn.id, error = %e, "validation error");
        }
        let error = if errors.is_empty() {
            RpcError::application(ErrorTag::OperationFailed, "validation failed")
        } else {
            errors.remove(0)
        };
        return Ok(CommitOutcome::Rejected {
            reason: RejectReason::ValidationFailed,
            error,
        });
    }
    for entry in backend.plugins.with_capability(Capability::Validate) {
        match entry.plugin().validate(&txn.view()) {
            Ok(PluginVerdict::Accept) => {}
            Ok(PluginVerdict::Reject(error)) => {
                txn.stage = TxnStage::Failed;
                tracing::info!(txn = %txn.id, plugin = entry.name(), "validate rejected");
                return Ok(CommitOutcome::Rejected {
                    reason: RejectReason::ValidationFailed,
                    error,
                });
            }
            Err(e) => {
                txn.stage = TxnStage::Failed;
                return Err(EngineError::Plugin {
                    plugin: entry.name().to_string(),
                    phase: "validate".to_string(),
                    message: e.message,
                });
            }
        }
    }
    txn.stage = TxnStage::Validated;

    // COMMIT: side-effect phase, in registration order.
    txn.stage = TxnStage::Committing;
    let commit_entries: Vec<&PluginEntry> = backend
        .plugins
        .with_capability(Capability::Commit)
        .collect();
    for (index, entry) in commit_entries.iter().enumerate() {
        if let Err(e) = entry.plugin().commit(&txn.view()) {
            tracing::warn!(
                txn = %txn.id,
                plugin = entry.name(),
                error = %e,
                "plugin commit failed, rolling back"
            );
            rollback_succeeded(&txn, &commit_entries[..index]);
            if let Err(restore) = store.write(target, &txn.target_tree) {
                return Err(EngineError::Unrecoverable(format!(
                    "restore of '{target}' after failed commit also failed: {restore}"
                )));
            }
            txn.stage = TxnStage::Failed;
            return Ok(CommitOutcome::Rejected {
                reason: RejectReason::PluginCommitFailed {
                    plugin: entry.name().to_string(),
                },
                error: RpcError::application(
                    ErrorTag::OperationFailed,
                    format!("plugin '{}' failed during commit: {}", entry.name(), e),
                ),
            });
        }
    }

    // Publish: the single point where readers observe the new content.
    if let Err(copy_err) = store.copy(source, target) {
        tracing::error!(txn = %txn.id, error = %copy_err, "publish failed, restoring target");
        if let Err(restore) = store.write(target, &txn.target_tree) {
            return Err(EngineError::Unrecoverable(format!(
                "restore of '{target}' after failed publish also failed: {restore}"
            )));
        }
        txn.stage = TxnStage::Failed;
        return Err(copy_err.into());
    }
    txn.stage = TxnStage::Done;

    // COMMIT-DONE: failures are logged, never undone.
    for entry in backend.plugins.with_capability(Capability::CommitDone) {
        if let Err(e) = entry.plugin().commit_done(&txn.view()) {
            tracing::warn!(txn = %txn.id, plugin = entry.name(), error = %e, "commit-done failed");
        }
    }
    tracing::info!(txn = %txn.id, source, target, actor, "commit published");
    Ok(CommitOutcome::Committed)
}

/// Fires `rollback` on every plugin whose commit already succeeded, in
/// reverse registration order. Rollback failures are logged; the target
/// restore still proceeds.
fn rollback_succeeded(txn: &Transaction, succeeded: &[&PluginEntry]) {
    for entry in succeeded.iter().rev() {
        if !entry.capabilities().contains(Capability::Rollback) {
            continue;
        }
        if let Err(e) = entry.plugin().rollback(&txn.view()) {
            tracing::error!(txn = %txn.id, plugin = entry.name(), error = %e, "rollback failed");
        }
    }
}

/// The `validate` operation: run the static validator and plugin
/// validation phases against `source` without committing anything.
/// Returns the first error document, or `None` when the content passes.
pub fn validate_only(backend: &Backend, source: &str) -> Result<Option<RpcError>, EngineError> {
    let store = &backend.store;
    let source_tree = match store.read(source, None) {
        Ok(tree) => tree,
        Err(StoreError::Corrupt { db, source }) => {
            return Ok(Some(RpcError::malformed(format!(
                "database '{db}' is not parseable: {source}"
            ))));
        }
        Err(e) => return Err(e.into()),
    };
    if let Err(mut errors) = Validator::validate(&source_tree, &backend.schema) {
        if !errors.is_empty() {
            return Ok(Some(errors.remove(0)));
        }
    }
    let running = store.read(RUNNING, None)?;
    let diff = DiffEngine::diff(&running, &source_tree, &backend.schema);
    let txn = Transaction {
        id: TxnId::new(),
        source: source.to_string(),
        target: RUNNING.to_string(),
        actor: String::new(),
        stage: TxnStage::Validated,
        diff,
        source_tree,
        target_tree: running,
    };
    for entry in backend.plugins.with_capability(Capability::PreValidate) {
        match entry.plugin().pre_validate(&txn.source_tree) {
            Ok(PluginVerdict::Accept) => {}
            Ok(PluginVerdict::Reject(error)) => return Ok(Some(error)),
            Err(e) => {
                return Err(EngineError::Plugin {
                    plugin: entry.name().to_string(),
                    phase: "pre-validate".to_string(),
                    message: e.message,
                })
            }
        }
    }
    for entry in backend.plugins.with_capability(Capability::Validate) {
        match entry.plugin().validate(&txn.view()) {
            Ok(PluginVerdict::Accept) => {}
            Ok(PluginVerdict::Reject(error)) => return Ok(Some(error)),
            Err(e) => {
                return Err(EngineError::Plugin {
                    plugin: entry.name().to_string(),
                    phase: "validate".to_string(),
                    message: e.message,
                })
            }
        }
    }
    Ok(None)
}

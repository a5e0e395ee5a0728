use std::fmt;
use std::path::Path;
use std::str::FromStr;

use confsmith_core::edit::{EditOp, EditOutcome};
use confsmith_core::validate::Validator;
use confsmith_core::xml;
use confsmith_store::{FAILSAFE, RUNNING, STARTUP, TMP};

use crate::backend::Backend;
use crate::error::EngineError;
use crate::plugin::Capability;
use crate::txn::{commit, CommitOutcome, RejectReason};

/// How the device is brought up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupMode {
    /// Leave running as it is.
    None,
    /// Start from an empty running.
    Init,
    /// Load the persisted startup database.
    Startup,
    /// Reload the previous running database.
    Running,
}

impl StartupMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Init => "init",
            Self::Startup => "startup",
            Self::Running => "running",
        }
    }
}

impl fmt::Display for StartupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StartupMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "init" => Ok(Self::Init),
            "startup" => Ok(Self::Startup),
            "running" => Ok(Self::Running),
            other => Err(format!(
                "unknown startup mode '{other}': expected none, init, startup or running"
            )),
        }
    }
}

/// How the boot pipeline ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupOutcome {
    /// Running reflects the selected source.
    Ok,
    /// The source failed; running holds the failsafe configuration.
    Failsafe,
}

/// The startup orchestrator's report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupReport {
    pub mode: StartupMode,
    pub outcome: StartupOutcome,
    pub extra_xml_merged: bool,
}

/// Boot pipeline: bring running up from the configured source, fall back
/// to the failsafe database when the source is broken or invalid, then
/// merge extra XML on top of whatever running was brought up.
///
/// Only [`EngineError::Unrecoverable`] halts the daemon; every other
/// failure descends into failsafe.
pub fn run_startup(
    backend: &Backend,
    extra_xml: Option<&Path>,
) -> Result<StartupReport, EngineError> {
    let mode = backend.config.startup_mode;
    let store = &backend.store;
    if !store.exists(RUNNING) {
        store.create(RUNNING)?;
    }

    let mut report = StartupReport {
        mode,
        outcome: StartupOutcome::Ok,
        extra_xml_merged: false,
    };

    let source = match mode {
        StartupMode::None => {
            tracing::info!("startup mode none, leaving running untouched");
            return Ok(report);
        }
        StartupMode::Init => {
            store.reset(RUNNING)?;
            tracing::info!("startup mode init, running reset to empty");
            None
        }
        StartupMode::Startup => Some(STARTUP.to_string()),
        StartupMode::Running => {
            // Reloading running goes through tmp so the commit pipeline
            // never has running as both source and target.
            store.copy(RUNNING, TMP)?;
            Some(TMP.to_string())
        }
    };

    if let Some(source) = source {
        report.outcome = bring_up_from(backend, &source)?;
    }

    // The bring-up merge always runs after the source (or failsafe) is
    // live, so extra XML lands on whichever running came up.
    match merge_extra_xml(backend, extra_xml) {
        Ok(merged) => report.extra_xml_merged = merged,
        Err(e) if e.is_unrecoverable() => return Err(e),
        Err(e) => {
            tracing::error!(error = %e, "extra xml phase failed");
            if report.outcome == StartupOutcome::Failsafe {
                return Err(EngineError::Unrecoverable(format!(
                    "extra xml failed during failsafe bring-up: {e}"
                )));
            }
            load_failsafe(backend)?;
            report.outcome = StartupOutcome::Failsafe;
        }
    }
    store.delete(TMP)?;
    tracing::info!(
        mode = %report.mode,
        outcome = ?report.outcome,
        extra_xml = report.extra_xml_merged,
        "startup complete"
    );
    Ok(report)
}

/// Commit `source` into running, descending into failsafe on rejection.
fn bring_up_from(backend: &Backend, source: &str) -> Result<StartupOutcome, EngineError> {
    let store = &backend.store;
    if !store.exists(source) {
        store.create(source)?;
    }
    module_state_check(backend, source)?;

    match commit(backend, source, RUNNING, "startup") {
        Ok(CommitOutcome::Committed) | Ok(CommitOutcome::NoChange) => {
            store.clear_broken_marker()?;
            tracing::info!(source, "running brought up from source");
            Ok(StartupOutcome::Ok)
        }
        Ok(CommitOutcome::Rejected { reason, error }) => {
            if matches!(reason, RejectReason::BrokenSource) {
                // Persistent marker so operators can observe the broken
                // startup after the failsafe takes over.
                store.set_broken_marker()?;
                tracing::error!(source, error = %error, "source database broken");
            } else {
                tracing::error!(source, error = %error, "source database invalid");
            }
            load_failsafe(backend)?;
            Ok(StartupOutcome::Failsafe)
        }
        Err(e) if e.is_unrecoverable() => Err(e),
        Err(e) => {
            tracing::error!(source, error = %e, "startup commit errored");
            load_failsafe(backend)?;
            Ok(StartupOutcome::Failsafe)
        }
    }
}

/// A persisted module-state fingerprint that does not match the live
/// schema hands off to the upgrade hook before any other read. The
/// single-version model keeps the hook to a logged handoff; the sidecar
/// is rewritten once the content is committed under the live schema.
fn module_state_check(backend: &Backend, source: &str) -> Result<(), EngineError> {
    if !backend.config.modstate_enabled {
        return Ok(());
    }
    match backend.store.read_module_state(source)? {
        Some(record) if !record.matches(&backend.schema) => {
            tracing::warn!(
                source,
                persisted = %record.fingerprint,
                live = %backend.schema.fingerprint(),
                "module-state mismatch, upgrade hook invoked"
            );
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Reset running and commit the failsafe database into it. The previous
/// running is parked in tmp and restored if the failsafe commit fails.
fn load_failsafe(backend: &Backend) -> Result<(), EngineError> {
    let store = &backend.store;
    if !store.exists(FAILSAFE) {
        return Err(EngineError::Unrecoverable(
            "startup failed and no failsafe database found".to_string(),
        ));
    }
    store.copy(RUNNING, TMP)?;
    store.reset(RUNNING)?;
    match commit(backend, FAILSAFE, RUNNING, "startup") {
        Ok(CommitOutcome::Committed) | Ok(CommitOutcome::NoChange) => {
            tracing::warn!("startup failed, failsafe database loaded");
            Ok(())
        }
        Ok(CommitOutcome::Rejected { error, .. }) => {
            store.copy(TMP, RUNNING)?;
            Err(EngineError::Unrecoverable(format!(
                "failsafe database rejected: {error}"
            )))
        }
        Err(e) => {
            store.copy(TMP, RUNNING)?;
            Err(EngineError::Unrecoverable(format!(
                "failsafe commit failed: {e}"
            )))
        }
    }
}

/// The extra-XML bring-up merge: plugin reset hooks and an optional
/// override file contribute to tmp, which is validated and then merged
/// into running without firing commit callbacks.
fn merge_extra_xml(backend: &Backend, file: Option<&Path>) -> Result<bool, EngineError> {
    let store = &backend.store;
    store.create(TMP)?;
    store.reset(TMP)?;

    for entry in backend.plugins.with_capability(Capability::Reset) {
        if let Err(e) = entry.plugin().reset(TMP, store) {
            return Err(EngineError::Plugin {
                plugin: entry.name().to_string(),
                phase: "reset".to_string(),
                message: e.message,
            });
        }
    }

    if let Some(path) = file {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Io(format!("cannot read {}: {e}", path.display())))?;
        let tree = xml::parse_config(&content)
            .map_err(|e| EngineError::Parse(format!("extra xml {}: {e}", path.display())))?;
        match store.put(TMP, EditOp::Merge, &tree, "startup")? {
            EditOutcome::Applied => {}
            EditOutcome::Rejected(error) => {
                return Err(EngineError::Validation(format!(
                    "extra xml merge rejected: {error}"
                )));
            }
        }
    }

    let tmp_tree = store.read(TMP, None)?;
    if tmp_tree.is_empty() {
        return Ok(false);
    }

    // Only the static validator runs on the bring-up merge.
    if let Err(errors) = Validator::validate(&tmp_tree, &backend.schema) {
        for e in &errors {
            tracing::error!(error = %e, "extra xml invalid");
        }
        return Err(EngineError::Validation(
            "extra xml failed validation".to_string(),
        ));
    }

    match store.put(RUNNING, EditOp::Merge, &tmp_tree, "startup")? {
        EditOutcome::Applied => {
            tracing::info!("extra xml merged into running");
            Ok(true)
        }
        EditOutcome::Rejected(error) => Err(EngineError::Validation(format!(
            "extra xml merge rejected: {error}"
        ))),
    }
}

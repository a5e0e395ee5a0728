//! # confsmith-engine
//!
//! The transactional core: the plugin registry and its capability model,
//! the commit state machine with compensating rollback, and the startup
//! orchestrator with failsafe fallback.

pub mod backend;
pub mod error;
pub mod plugin;
pub mod startup;
pub mod txn;

pub use backend::{Backend, EngineConfig};
pub use error::{EngineError, PluginError};
pub use plugin::{
    bind_extensions, AuthDecision, Capability, CapabilitySet, ConfigPlugin, Credentials,
    PluginEntry, PluginRegistry, PluginVerdict,
};
pub use startup::{run_startup, StartupMode, StartupOutcome, StartupReport};
pub use txn::{
    commit, validate_only, CommitOutcome, RejectReason, Transaction, TransactionView, TxnId,
    TxnStage,
};

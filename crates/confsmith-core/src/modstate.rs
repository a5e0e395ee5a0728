use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::SchemaSpec;

/// One module a persisted database was produced against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRevision {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

/// The module-state sidecar: the schema fingerprint a database was last
/// written under. A mismatch against the live schema means the content
/// predates the current model and must pass the upgrade hook before any
/// other read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleStateRecord {
    pub fingerprint: String,
    pub modules: Vec<ModuleRevision>,
    pub saved_at: DateTime<Utc>,
}

impl ModuleStateRecord {
    /// Captures the live schema's module state.
    pub fn of(spec: &SchemaSpec) -> Self {
        Self {
            fingerprint: spec.fingerprint(),
            modules: spec
                .module_revisions()
                .into_iter()
                .map(|(name, revision)| ModuleRevision { name, revision })
                .collect(),
            saved_at: Utc::now(),
        }
    }

    /// True when this record matches the live schema.
    pub fn matches(&self, spec: &SchemaSpec) -> bool {
        self.fingerprint == spec.fingerprint()
    }
}

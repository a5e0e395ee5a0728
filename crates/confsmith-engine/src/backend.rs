use std::path::PathBuf;
use std::sync::Arc;

use confsmith_core::schema::SchemaSpec;
use confsmith_store::Datastore;

use crate::error::EngineError;
use crate::plugin::{bind_extensions, PluginRegistry};
use crate::startup::StartupMode;

/// Engine behavior knobs, resolved from the daemon configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub startup_mode: StartupMode,
    /// Toggles the module-state check during boot.
    pub modstate_enabled: bool,
    /// Reply formatting for protocol documents.
    pub pretty: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            startup_mode: StartupMode::Startup,
            modstate_enabled: true,
            pretty: false,
        }
    }
}

/// The explicit engine context: configuration, schema, datastore and
/// plugins, constructed once at boot and passed through call graphs.
pub struct Backend {
    pub config: EngineConfig,
    pub schema: Arc<SchemaSpec>,
    pub store: Datastore,
    pub plugins: PluginRegistry,
}

impl Backend {
    /// Builds the context: binds extension statements against the plugin
    /// registry, freezes the schema, and opens the datastore directory.
    pub fn new(
        config: EngineConfig,
        mut schema: SchemaSpec,
        db_dir: impl Into<PathBuf>,
        plugins: PluginRegistry,
    ) -> Result<Self, EngineError> {
        bind_extensions(&mut schema, &plugins)?;
        let schema = Arc::new(schema);
        let store = Datastore::open(db_dir, Arc::clone(&schema))?;
        Ok(Self {
            config,
            schema,
            store,
            plugins,
        })
    }
}

use std::path::{Path, PathBuf};

use confsmith_core::schema::SchemaSpec;
use confsmith_engine::StartupMode;
use confsmith_server::SocketFamily;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::error::CliError;

/// The daemon configuration record as written in TOML. Unknown keys are
/// rejected at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DaemonConfig {
    pub socket_family: String,
    pub socket_path: String,
    pub startup_mode: String,
    pub modstate_enabled: bool,
    pub stream_discovery_rfc8040: bool,
    pub stream_discovery_rfc5277: bool,
    pub pretty: bool,
    pub schema_dir: String,
    pub db_dir: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_family: "unix".to_string(),
            socket_path: "/tmp/confsmith.sock".to_string(),
            startup_mode: "startup".to_string(),
            modstate_enabled: true,
            stream_discovery_rfc8040: true,
            stream_discovery_rfc5277: false,
            pretty: false,
            schema_dir: "schemas/".to_string(),
            db_dir: "db/".to_string(),
        }
    }
}

impl DaemonConfig {
    /// Applies one `key=value` override. Unknown keys are rejected.
    pub fn apply_override(&mut self, assignment: &str) -> Result<(), CliError> {
        let (key, value) = assignment.split_once('=').ok_or_else(|| CliError::Config {
            message: format!("override '{assignment}' is not of the form key=value"),
        })?;
        let parse_bool = |v: &str| -> Result<bool, CliError> {
            v.parse().map_err(|_| CliError::Config {
                message: format!("option '{key}' expects true or false, got '{v}'"),
            })
        };
        match key {
            "socket_family" => self.socket_family = value.to_string(),
            "socket_path" => self.socket_path = value.to_string(),
            "startup_mode" => self.startup_mode = value.to_string(),
            "modstate_enabled" => self.modstate_enabled = parse_bool(value)?,
            "stream_discovery_rfc8040" => self.stream_discovery_rfc8040 = parse_bool(value)?,
            "stream_discovery_rfc5277" => self.stream_discovery_rfc5277 = parse_bool(value)?,
            "pretty" => self.pretty = parse_bool(value)?,
            "schema_dir" => self.schema_dir = value.to_string(),
            "db_dir" => self.db_dir = value.to_string(),
            unknown => {
                return Err(CliError::Config {
                    message: format!("unknown option '{unknown}'"),
                })
            }
        }
        Ok(())
    }
}

/// The resolved, strongly-typed settings the daemon actually runs with.
#[derive(Debug, Clone)]
pub struct Settings {
    pub socket_family: SocketFamily,
    pub socket_path: String,
    pub startup_mode: StartupMode,
    pub modstate_enabled: bool,
    pub stream_discovery_rfc8040: bool,
    pub stream_discovery_rfc5277: bool,
    pub pretty: bool,
    pub schema_dir: PathBuf,
    pub db_dir: PathBuf,
}

/// Discovery order for the config file:
/// 1. `--config <path>` / `CONFSMITH_CONFIG` (explicit)
/// 2. `./confsmith.toml` (project-local)
/// 3. `$XDG_CONFIG_HOME/confsmith/config.toml`
/// 4. `~/.config/confsmith/config.toml`
pub fn load_config(explicit: Option<&Path>) -> Result<DaemonConfig, CliError> {
    if let Some(path) = explicit {
        return load_config_from(path);
    }
    let local = PathBuf::from("confsmith.toml");
    if local.exists() {
        return load_config_from(&local);
    }
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg).join("confsmith/config.toml");
        if path.exists() {
            return load_config_from(&path);
        }
    }
    if let Some(home) = std::env::var_os("HOME") {
        let path = PathBuf::from(home).join(".config/confsmith/config.toml");
        if path.exists() {
            return load_config_from(&path);
        }
    }
    Ok(DaemonConfig::default())
}

fn load_config_from(path: &Path) -> Result<DaemonConfig, CliError> {
    let text = std::fs::read_to_string(path).map_err(|e| CliError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    toml::from_str(&text).map_err(|e| CliError::Config {
        message: format!("{}: {e}", path.display()),
    })
}

/// Merges the config file with CLI flags and overrides into the typed
/// settings record. Flags win over overrides, which win over the file.
pub fn resolve(mut config: DaemonConfig, cli: &Cli) -> Result<Settings, CliError> {
    for assignment in &cli.overrides {
        config.apply_override(assignment)?;
    }
    if let Some(family) = &cli.socket_family {
        config.socket_family = family.clone();
    }
    if let Some(path) = &cli.socket_path {
        config.socket_path = path.clone();
    }
    if let Some(mode) = &cli.startup_mode {
        config.startup_mode = mode.clone();
    }
    if let Some(dir) = &cli.schema_dir {
        config.schema_dir = dir.display().to_string();
    }
    if let Some(dir) = &cli.db_dir {
        config.db_dir = dir.display().to_string();
    }
    if cli.pretty {
        config.pretty = true;
    }

    let socket_family = config
        .socket_family
        .parse::<SocketFamily>()
        .map_err(|message| CliError::Config { message })?;
    let startup_mode = config
        .startup_mode
        .parse::<StartupMode>()
        .map_err(|message| CliError::Config { message })?;
    Ok(Settings {
        socket_family,
        socket_path: config.socket_path,
        startup_mode,
        modstate_enabled: config.modstate_enabled,
        stream_discovery_rfc8040: config.stream_discovery_rfc8040,
        stream_discovery_rfc5277: config.stream_discovery_rfc5277,
        pretty: config.pretty,
        schema_dir: PathBuf::from(config.schema_dir),
        db_dir: PathBuf::from(config.db_dir),
    })
}

/// Loads every `*.yl` module from a directory, in alphabetical order,
/// into one schema spec. A missing directory yields the empty spec.
pub fn load_schema_dir(dir: &Path) -> Result<SchemaSpec, CliError> {
    let mut builder = SchemaSpec::builder();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(dir = %dir.display(), "schema directory missing, running schemaless");
            return Ok(SchemaSpec::empty());
        }
        Err(e) => {
            return Err(CliError::Io {
                path: dir.to_path_buf(),
                source: e,
            })
        }
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "yl"))
        .collect();
    files.sort();
    for file in &files {
        let source = std::fs::read_to_string(file).map_err(|e| CliError::Io {
            path: file.clone(),
            source: e,
        })?;
        confsmith_dsl::parse_into(&mut builder, &source).map_err(|errors| CliError::Schema {
            file: file.clone(),
            errors,
        })?;
        tracing::debug!(file = %file.display(), "schema module loaded");
    }
    builder.finish().map_err(|e| CliError::Config {
        message: format!("schema set inconsistent: {e}"),
    })
}

use std::path::PathBuf;

use confsmith_dsl::DslError;
use confsmith_engine::EngineError;
use confsmith_server::ServerError;

/// Exit codes for the backend process.
///
/// - 0: clean shutdown
/// - 1: configuration error
/// - 2: unrecoverable startup or runtime failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    ConfigError = 1,
    Unrecoverable = 2,
}

/// Errors surfaced by the backend binary.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Bad configuration file, option value or override key.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Schema source failed to parse.
    #[error("schema errors in {file}")]
    Schema {
        file: PathBuf,
        errors: Vec<DslError>,
    },

    /// IO during boot (config file, schema dir).
    #[error("io error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Server(#[from] ServerError),
}

impl CliError {
    /// Maps this error to the process exit code.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Config { .. } | Self::Schema { .. } | Self::Io { .. } => ExitCode::ConfigError,
            Self::Engine(_) | Self::Server(_) => ExitCode::Unrecoverable,
        }
    }

    /// One line per underlying problem, for stderr.
    pub fn details(&self) -> Vec<String> {
        match self {
            Self::Schema { errors, .. } => errors.iter().map(|e| e.to_string()).collect(),
            other => vec![other.to_string()],
        }
    }
}

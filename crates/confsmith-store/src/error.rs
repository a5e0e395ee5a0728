use std::path::PathBuf;

use confsmith_core::error::XmlError;

/// Errors returned by the datastore layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database name failed validation.
    #[error("invalid database name '{0}': must match [a-z][a-z0-9_-]*")]
    InvalidName(String),

    /// The database does not exist and the operation requires it.
    #[error("database '{db}' does not exist")]
    NoSuchDatabase { db: String },

    /// Persistence backing could not be read or written.
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// On-disk content is not parseable XML.
    #[error("database '{db}' is not parseable: {source}")]
    Corrupt {
        db: String,
        #[source]
        source: XmlError,
    },

    /// Module-state sidecar exists but cannot be decoded.
    #[error("module-state sidecar of '{db}' is unreadable: {message}")]
    BadSidecar { db: String, message: String },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

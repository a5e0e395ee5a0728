use confsmith_core::rpc_error::{ErrorTag, RpcError};
use confsmith_store::StoreError;

/// A failing plugin callback.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct PluginError {
    pub message: String,
}

impl PluginError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The engine error taxonomy. Every variant maps to a complete
/// `<rpc-error>` via [`EngineError::to_rpc_error`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("database '{db}' is locked by session {holder}")]
    LockDenied { db: String, holder: u32 },

    #[error("data missing: {0}")]
    DataMissing(String),

    #[error("data exists: {0}")]
    DataExists(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("plugin '{plugin}' failed during {phase}: {message}")]
    Plugin {
        plugin: String,
        phase: String,
        message: String,
    },

    #[error("internal error: {0}")]
    Internal(String),

    /// The engine could not restore a consistent state; the daemon must
    /// stop serving.
    #[error("unrecoverable: {0}")]
    Unrecoverable(String),
}

impl EngineError {
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::Unrecoverable(_))
    }

    /// The NETCONF error document clients see for this failure.
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            Self::Parse(m) => RpcError::malformed(m.clone()),
            Self::Schema(m) => RpcError::application(ErrorTag::UnknownElement, m.clone()),
            Self::Validation(m) => RpcError::application(ErrorTag::InvalidValue, m.clone()),
            Self::LockDenied { db, holder } => RpcError::lock_denied(db, *holder),
            Self::DataMissing(m) => RpcError::application(ErrorTag::DataMissing, m.clone()),
            Self::DataExists(m) => RpcError::application(ErrorTag::DataExists, m.clone()),
            Self::AccessDenied(m) => RpcError::application(ErrorTag::AccessDenied, m.clone()),
            Self::Unauthenticated(m) => RpcError::application(ErrorTag::AccessDenied, m.clone())
                .with_app_tag("unauthenticated"),
            Self::NotSupported(m) => {
                RpcError::application(ErrorTag::OperationNotSupported, m.clone())
            }
            Self::Io(m) => RpcError::application(ErrorTag::OperationFailed, m.clone()),
            Self::Plugin {
                plugin,
                phase,
                message,
            } => RpcError::application(
                ErrorTag::OperationFailed,
                format!("plugin '{plugin}' failed during {phase}: {message}"),
            ),
            Self::Internal(m) | Self::Unrecoverable(m) => {
                RpcError::application(ErrorTag::OperationFailed, m.clone())
            }
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NoSuchDatabase { db } => {
                Self::DataMissing(format!("database '{db}' does not exist"))
            }
            StoreError::Corrupt { .. } => Self::Parse(e.to_string()),
            StoreError::InvalidName(_) | StoreError::BadSidecar { .. } => {
                Self::Schema(e.to_string())
            }
            StoreError::Io { .. } => Self::Io(e.to_string()),
        }
    }
}

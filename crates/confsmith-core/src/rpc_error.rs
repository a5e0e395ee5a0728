use std::fmt;

use serde::{Deserialize, Serialize};

/// NETCONF `error-type`: which protocol layer detected the problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Transport,
    Rpc,
    Protocol,
    Application,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Transport => "transport",
            Self::Rpc => "rpc",
            Self::Protocol => "protocol",
            Self::Application => "application",
        };
        write!(f, "{s}")
    }
}

/// The subset of the NETCONF `error-tag` registry the engine emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum ErrorTag {
    InUse,
    InvalidValue,
    TooBig,
    MissingAttribute,
    BadAttribute,
    UnknownAttribute,
    MissingElement,
    BadElement,
    UnknownElement,
    UnknownNamespace,
    AccessDenied,
    LockDenied,
    ResourceDenied,
    RollbackFailed,
    DataExists,
    DataMissing,
    OperationNotSupported,
    OperationFailed,
    PartialOperation,
    MalformedMessage,
}

impl ErrorTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InUse => "in-use",
            Self::InvalidValue => "invalid-value",
            Self::TooBig => "too-big",
            Self::MissingAttribute => "missing-attribute",
            Self::BadAttribute => "bad-attribute",
            Self::UnknownAttribute => "unknown-attribute",
            Self::MissingElement => "missing-element",
            Self::BadElement => "bad-element",
            Self::UnknownElement => "unknown-element",
            Self::UnknownNamespace => "unknown-namespace",
            Self::AccessDenied => "access-denied",
            Self::LockDenied => "lock-denied",
            Self::ResourceDenied => "resource-denied",
            Self::RollbackFailed => "rollback-failed",
            Self::DataExists => "data-exists",
            Self::DataMissing => "data-missing",
            Self::OperationNotSupported => "operation-not-supported",
            Self::OperationFailed => "operation-failed",
            Self::PartialOperation => "partial-operation",
            Self::MalformedMessage => "malformed-message",
        }
    }

    /// The HTTP status a RESTCONF gateway maps this tag to.
    /// Exactly one status per tag.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidValue
            | Self::TooBig
            | Self::MissingAttribute
            | Self::BadAttribute
            | Self::UnknownAttribute
            | Self::MissingElement
            | Self::BadElement
            | Self::UnknownElement
            | Self::UnknownNamespace
            | Self::MalformedMessage => 400,
            Self::AccessDenied => 403,
            Self::LockDenied => 412,
            Self::InUse | Self::DataExists | Self::ResourceDenied => 409,
            Self::DataMissing => 404,
            Self::OperationNotSupported => 501,
            Self::OperationFailed | Self::RollbackFailed | Self::PartialOperation => 500,
        }
    }
}

impl fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Error,
    Warning,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A complete NETCONF `<rpc-error>` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub error_type: ErrorType,
    pub tag: ErrorTag,
    pub severity: ErrorSeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// `error-info` children as `(element, text)` pairs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub info: Vec<(String, String)>,
}

impl RpcError {
    /// An application-layer error with the given tag and message.
    pub fn application(tag: ErrorTag, message: impl Into<String>) -> Self {
        Self {
            error_type: ErrorType::Application,
            tag,
            severity: ErrorSeverity::Error,
            app_tag: None,
            path: None,
            message: Some(message.into()),
            info: Vec::new(),
        }
    }

    /// A protocol-layer error with the given tag and message.
    pub fn protocol(tag: ErrorTag, message: impl Into<String>) -> Self {
        Self {
            error_type: ErrorType::Protocol,
            ..Self::application(tag, message)
        }
    }

    /// An rpc-layer error for malformed requests.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            error_type: ErrorType::Rpc,
            ..Self::application(ErrorTag::MalformedMessage, message)
        }
    }

    /// A `lock-denied` error naming the holding session in error-info.
    pub fn lock_denied(db: &str, holder: u32) -> Self {
        Self {
            error_type: ErrorType::Protocol,
            tag: ErrorTag::LockDenied,
            severity: ErrorSeverity::Error,
            app_tag: None,
            path: None,
            message: Some(format!("database '{db}' is locked by session {holder}")),
            info: vec![("session-id".to_string(), holder.to_string())],
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_app_tag(mut self, app_tag: impl Into<String>) -> Self {
        self.app_tag = Some(app_tag.into());
        self
    }

    pub fn with_info(mut self, element: impl Into<String>, text: impl Into<String>) -> Self {
        self.info.push((element.into(), text.into()));
        self
    }

    /// Renders the `<rpc-error>` element.
    pub fn to_xml(&self) -> String {
        let mut out = String::from("<rpc-error>");
        out.push_str(&format!("<error-type>{}</error-type>", self.error_type));
        out.push_str(&format!("<error-tag>{}</error-tag>", self.tag));
        out.push_str(&format!(
            "<error-severity>{}</error-severity>",
            self.severity
        ));
        if let Some(app_tag) = &self.app_tag {
            out.push_str(&format!("<error-app-tag>{}</error-app-tag>", escape(app_tag)));
        }
        if let Some(path) = &self.path {
            out.push_str(&format!("<error-path>{}</error-path>", escape(path)));
        }
        if let Some(message) = &self.message {
            out.push_str(&format!(
                "<error-message>{}</error-message>",
                escape(message)
            ));
        }
        if !self.info.is_empty() {
            out.push_str("<error-info>");
            for (element, text) in &self.info {
                out.push_str(&format!("<{element}>{}</{element}>", escape(text)));
            }
            out.push_str("</error-info>");
        }
        out.push_str("</rpc-error>");
        out
    }

    /// Renders the error as a RESTCONF-style JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::json!({
            "error-type": self.error_type.to_string(),
            "error-tag": self.tag.to_string(),
            "error-severity": self.severity.to_string(),
        });
        let map = obj.as_object_mut().expect("object literal");
        if let Some(app_tag) = &self.app_tag {
            map.insert("error-app-tag".into(), app_tag.clone().into());
        }
        if let Some(path) = &self.path {
            map.insert("error-path".into(), path.clone().into());
        }
        if let Some(message) = &self.message {
            map.insert("error-message".into(), message.clone().into());
        }
        if !self.info.is_empty() {
            let info: serde_json::Map<String, serde_json::Value> = self
                .info
                .iter()
                .map(|(k, v)| (k.clone(), v.clone().into()))
                .collect();
            map.insert("error-info".into(), info.into());
        }
        obj
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.tag)?;
        match &self.message {
            Some(m) => write!(f, "{m}")?,
            None => write!(f, "(no message)")?,
        }
        if let Some(p) = &self.path {
            write!(f, " at {p}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RpcError {}

use std::fmt;

/// Errors that occur when constructing or manipulating config-model types.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ModelError {
    /// Database name failed validation.
    InvalidDatabaseName(String),
    /// Element name is not a valid XML/YANG identifier.
    InvalidElementName(String),
    /// A path segment could not be parsed.
    InvalidPathSegment(String),
    /// A path string contained no segments.
    EmptyPath,
    /// Module name failed validation.
    InvalidModuleName(String),
    /// Integer range constraint min > max.
    InvalidRange { min: i64, max: i64 },
    /// A list declares a key leaf that is not defined in its body.
    UndefinedListKey { list: String, key: String },
    /// Enumeration type declared with no variants.
    EmptyEnumeration,
    /// Duplicate enumeration variant.
    DuplicateEnumVariant(String),
    /// Type name is not a recognized yang-lite built-in.
    UnknownTypeName(String),
    /// A range/length restriction was attached to a type that takes none.
    RangeNotApplicable(String),
    /// Two modules declare the same name.
    DuplicateModule(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDatabaseName(s) => {
                write!(f, "invalid database name '{s}': must match [a-z][a-z0-9_-]*")
            }
            Self::InvalidElementName(s) => {
                write!(
                    f,
                    "invalid element name '{s}': must match [a-zA-Z_][a-zA-Z0-9_.-]*"
                )
            }
            Self::InvalidPathSegment(s) => write!(f, "invalid path segment '{s}'"),
            Self::EmptyPath => write!(f, "path must contain at least one segment"),
            Self::InvalidModuleName(s) => {
                write!(f, "invalid module name '{s}': must match [a-z][a-z0-9-]*")
            }
            Self::InvalidRange { min, max } => {
                write!(f, "invalid range: min ({min}) > max ({max})")
            }
            Self::UndefinedListKey { list, key } => {
                write!(f, "list '{list}' declares key '{key}' but defines no such leaf")
            }
            Self::EmptyEnumeration => write!(f, "enumeration must have at least one variant"),
            Self::DuplicateEnumVariant(v) => write!(f, "duplicate enumeration variant '{v}'"),
            Self::UnknownTypeName(t) => write!(f, "unknown type name '{t}'"),
            Self::RangeNotApplicable(t) => {
                write!(f, "type '{t}' does not accept a range restriction")
            }
            Self::DuplicateModule(m) => write!(f, "duplicate module '{m}'"),
        }
    }
}

impl std::error::Error for ModelError {}

/// Errors from the XML codec.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum XmlError {
    /// The underlying parser rejected the input.
    Syntax { message: String },
    /// Input ended before the document was complete.
    UnexpectedEof,
    /// The document root is not `<config>`.
    NotConfigRoot(String),
    /// Text content appeared where only elements are allowed.
    MixedContent(String),
}

impl fmt::Display for XmlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax { message } => write!(f, "xml syntax error: {message}"),
            Self::UnexpectedEof => write!(f, "unexpected end of xml input"),
            Self::NotConfigRoot(name) => {
                write!(f, "expected <config> document root, found <{name}>")
            }
            Self::MixedContent(path) => {
                write!(f, "mixed element and text content under {path}")
            }
        }
    }
}

impl std::error::Error for XmlError {}

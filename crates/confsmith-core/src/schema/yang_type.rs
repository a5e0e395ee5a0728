use std::fmt;

use crate::error::ModelError;
use crate::path::NodePath;

/// An inclusive numeric bound restriction, `min..max`.
///
/// Bounds are `i128` so the full `uint64` value space is representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub min: i128,
    pub max: i128,
}

impl Range {
    pub fn new(min: i128, max: i128) -> Result<Self, ModelError> {
        if min > max {
            return Err(ModelError::InvalidRange {
                min: min as i64,
                max: max as i64,
            });
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, v: i128) -> bool {
        self.min <= v && v <= self.max
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.min, self.max)
    }
}

/// A leaf value that failed its type check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueError {
    pub type_name: String,
    pub value: String,
    pub reason: String,
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' is not a valid {}: {}",
            self.value, self.type_name, self.reason
        )
    }
}

impl std::error::Error for ValueError {}

/// The yang-lite scalar type system for leaves and leaf-lists.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum YangType {
    Int8 { range: Option<Range> },
    Int16 { range: Option<Range> },
    Int32 { range: Option<Range> },
    Int64 { range: Option<Range> },
    Uint8 { range: Option<Range> },
    Uint16 { range: Option<Range> },
    Uint32 { range: Option<Range> },
    Uint64 { range: Option<Range> },
    /// Free-form text with an optional length restriction.
    String { length: Option<Range> },
    Boolean,
    Enumeration { variants: Vec<String> },
    /// The value must equal some value present at `path`.
    /// Resolution is checked by the validator, not here.
    LeafRef { path: NodePath },
    /// Presence leaf: carries no value.
    Empty,
}

impl YangType {
    /// Builds a type from its yang-lite name, without restrictions.
    pub fn from_name(name: &str) -> Result<Self, ModelError> {
        Ok(match name {
            "int8" => Self::Int8 { range: None },
            "int16" => Self::Int16 { range: None },
            "int32" => Self::Int32 { range: None },
            "int64" => Self::Int64 { range: None },
            "uint8" => Self::Uint8 { range: None },
            "uint16" => Self::Uint16 { range: None },
            "uint32" => Self::Uint32 { range: None },
            "uint64" => Self::Uint64 { range: None },
            "string" => Self::String { length: None },
            "boolean" => Self::Boolean,
            "empty" => Self::Empty,
            other => return Err(ModelError::UnknownTypeName(other.to_string())),
        })
    }

    /// The type's yang-lite name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Int8 { .. } => "int8",
            Self::Int16 { .. } => "int16",
            Self::Int32 { .. } => "int32",
            Self::Int64 { .. } => "int64",
            Self::Uint8 { .. } => "uint8",
            Self::Uint16 { .. } => "uint16",
            Self::Uint32 { .. } => "uint32",
            Self::Uint64 { .. } => "uint64",
            Self::String { .. } => "string",
            Self::Boolean => "boolean",
            Self::Enumeration { .. } => "enumeration",
            Self::LeafRef { .. } => "leafref",
            Self::Empty => "empty",
        }
    }

    /// Attaches a range (integers) or length (string) restriction.
    pub fn with_range(self, range: Range) -> Result<Self, ModelError> {
        Ok(match self {
            Self::Int8 { .. } => Self::Int8 { range: Some(range) },
            Self::Int16 { .. } => Self::Int16 { range: Some(range) },
            Self::Int32 { .. } => Self::Int32 { range: Some(range) },
            Self::Int64 { .. } => Self::Int64 { range: Some(range) },
            Self::Uint8 { .. } => Self::Uint8 { range: Some(range) },
            Self::Uint16 { .. } => Self::Uint16 { range: Some(range) },
            Self::Uint32 { .. } => Self::Uint32 { range: Some(range) },
            Self::Uint64 { .. } => Self::Uint64 { range: Some(range) },
            Self::String { .. } => Self::String {
                length: Some(range),
            },
            other => return Err(ModelError::RangeNotApplicable(other.name().to_string())),
        })
    }

    /// Checks a leaf's text value against this type.
    pub fn check(&self, value: &str) -> Result<(), ValueError> {
        let err = |reason: String| ValueError {
            type_name: self.name().to_string(),
            value: value.to_string(),
            reason,
        };
        match self {
            Self::Int8 { range } => check_int(value, i8::MIN as i128, i8::MAX as i128, *range),
            Self::Int16 { range } => check_int(value, i16::MIN as i128, i16::MAX as i128, *range),
            Self::Int32 { range } => check_int(value, i32::MIN as i128, i32::MAX as i128, *range),
            Self::Int64 { range } => check_int(value, i64::MIN as i128, i64::MAX as i128, *range),
            Self::Uint8 { range } => check_int(value, 0, u8::MAX as i128, *range),
            Self::Uint16 { range } => check_int(value, 0, u16::MAX as i128, *range),
            Self::Uint32 { range } => check_int(value, 0, u32::MAX as i128, *range),
            Self::Uint64 { range } => check_int(value, 0, u64::MAX as i128, *range),
            Self::String { length } => {
                if let Some(l) = length {
                    let n = value.chars().count() as i128;
                    if !l.contains(n) {
                        return Err(err(format!("length {n} outside {l}")));
                    }
                }
                Ok(())
            }
            Self::Boolean => match value {
                "true" | "false" => Ok(()),
                _ => Err(err("expected 'true' or 'false'".to_string())),
            },
            Self::Enumeration { variants } => {
                if variants.iter().any(|v| v == value) {
                    Ok(())
                } else {
                    Err(err(format!("expected one of: {}", variants.join(", "))))
                }
            }
            // Referential integrity is the validator's job.
            Self::LeafRef { .. } => Ok(()),
            Self::Empty => {
                if value.is_empty() {
                    Ok(())
                } else {
                    Err(err("empty type carries no value".to_string()))
                }
            }
        }
        .map_err(|e| ValueError {
            type_name: self.name().to_string(),
            ..e
        })
    }
}

fn check_int(
    value: &str,
    type_min: i128,
    type_max: i128,
    range: Option<Range>,
) -> Result<(), ValueError> {
    let mk = |reason: String| ValueError {
        type_name: String::new(),
        value: value.to_string(),
        reason,
    };
    let v: i128 = value
        .parse()
        .map_err(|_| mk("not an integer".to_string()))?;
    if v < type_min || v > type_max {
        return Err(mk(format!("outside {type_min}..{type_max}")));
    }
    if let Some(r) = range {
        if !r.contains(v) {
            return Err(mk(format!("outside restricted range {r}")));
        }
    }
    Ok(())
}

impl fmt::Display for YangType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int8 { range: Some(r) }
            | Self::Int16 { range: Some(r) }
            | Self::Int32 { range: Some(r) }
            | Self::Int64 { range: Some(r) }
            | Self::Uint8 { range: Some(r) }
            | Self::Uint16 { range: Some(r) }
            | Self::Uint32 { range: Some(r) }
            | Self::Uint64 { range: Some(r) } => write!(f, "{} {{ range {r}; }}", self.name()),
            Self::String { length: Some(l) } => write!(f, "string {{ length {l}; }}"),
            Self::Enumeration { variants } => {
                write!(f, "enumeration {{ ")?;
                for v in variants {
                    write!(f, "enum {v}; ")?;
                }
                write!(f, "}}")
            }
            Self::LeafRef { path } => write!(f, "leafref {{ path \"{path}\"; }}"),
            _ => write!(f, "{}", self.name()),
        }
    }
}

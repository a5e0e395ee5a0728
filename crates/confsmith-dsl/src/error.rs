use std::fmt;

use confsmith_core::error::ModelError;

/// A byte-offset span in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// Inclusive start byte offset.
    pub start: usize,
    /// Exclusive end byte offset.
    pub end: usize,
}

impl Span {
    /// Creates a new span from start (inclusive) to end (exclusive).
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Errors that occur during yang-lite parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DslError {
    /// The lexer encountered a token that does not match any rule.
    InvalidToken { span: Span },

    /// The parser encountered an unexpected token.
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    /// The parser reached the end of input when more tokens were expected.
    UnexpectedEndOfInput { expected: String },

    /// A statement that may appear at most once appeared again.
    DuplicateStatement { keyword: String, span: Span },

    /// A required statement was missing from a block.
    MissingStatement {
        keyword: String,
        owner: String,
        span: Span,
    },

    /// An integer literal could not be parsed.
    InvalidIntegerLiteral { text: String, span: Span },

    /// An error propagated from confsmith-core model validation.
    CoreModelError { source: ModelError, span: Span },
}

impl fmt::Display for DslError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidToken { span } => {
                write!(f, "invalid token at {span}")
            }
            Self::UnexpectedToken {
                expected,
                found,
                span,
            } => {
                write!(
                    f,
                    "unexpected token at {span}: expected {expected}, found {found}"
                )
            }
            Self::UnexpectedEndOfInput { expected } => {
                write!(f, "unexpected end of input: expected {expected}")
            }
            Self::DuplicateStatement { keyword, span } => {
                write!(f, "duplicate '{keyword}' statement at {span}")
            }
            Self::MissingStatement {
                keyword,
                owner,
                span,
            } => {
                write!(f, "{owner} at {span} is missing its '{keyword}' statement")
            }
            Self::InvalidIntegerLiteral { text, span } => {
                write!(
                    f,
                    "invalid integer literal '{text}' at {span}: expected a valid integer"
                )
            }
            Self::CoreModelError { source, span } => {
                write!(f, "model error at {span}: {source}")
            }
        }
    }
}

impl std::error::Error for DslError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CoreModelError { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn span_display() {
        assert_eq!(Span::new(10, 20).to_string(), "10..20");
    }

    #[test]
    fn error_display_invalid_token() {
        let err = DslError::InvalidToken {
            span: Span::new(0, 1),
        };
        let msg = err.to_string();
        assert!(msg.contains("invalid token"));
        assert!(msg.contains("0..1"));
    }

    #[test]
    fn error_display_unexpected_token() {
        let err = DslError::UnexpectedToken {
            expected: "'{'".into(),
            found: "';'".into(),
            span: Span::new(5, 6),
        };
        let msg = err.to_string();
        assert!(msg.contains("expected '{'"));
        assert!(msg.contains("found ';'"));
    }

    #[test]
    fn error_display_missing_statement() {
        let err = DslError::MissingStatement {
            keyword: "namespace".into(),
            owner: "module 'example'".into(),
            span: Span::new(0, 10),
        };
        let msg = err.to_string();
        assert!(msg.contains("module 'example'"));
        assert!(msg.contains("'namespace'"));
    }

    #[test]
    fn core_model_error_has_source() {
        let err = DslError::CoreModelError {
            source: ModelError::EmptyPath,
            span: Span::new(0, 10),
        };
        assert!(err.source().is_some());
    }

    #[test]
    fn non_core_errors_have_no_source() {
        let err = DslError::InvalidToken {
            span: Span::new(0, 1),
        };
        assert!(err.source().is_none());
    }
}

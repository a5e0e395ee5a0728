//! # confsmith-dsl
//!
//! Parser and printer for yang-lite, the schema definition language
//! confsmith loads device models from.
//!
//! This crate provides:
//! - A lexer that tokenizes `.yl` source files
//! - A recursive descent parser that populates a `SchemaSpec`
//! - A printer that converts a `SchemaSpec` back to yang-lite text
//! - Round-trip fidelity: `parse(print(spec))` produces an equivalent spec
//!
//! # Example
//!
//! ```
//! use confsmith_dsl::{parse, print};
//!
//! let source = r#"
//! module example {
//!     namespace "urn:example:config";
//!     prefix ex;
//!
//!     container a {
//!         leaf x { type int8; }
//!     }
//! }
//! "#;
//!
//! let spec = parse(source).expect("parse failed");
//! assert!(spec.module("example").is_some());
//!
//! let text = print(&spec);
//! assert!(text.contains("module example {"));
//! ```

pub mod error;
mod lexer;
pub mod parser;
pub mod printer;
pub mod token;

pub use error::{DslError, Span};
pub use parser::{parse, parse_into};
pub use printer::{print, print_module};

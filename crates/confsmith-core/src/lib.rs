//! # confsmith-core
//!
//! The configuration data model shared by every confsmith crate:
//!
//! - [`ConfigTree`]: arena-backed labeled trees, navigable both ways,
//!   with per-node schema pointers
//! - [`NodePath`]: slash-separated paths with `[key=value]` predicates,
//!   doubling as the read-filter syntax
//! - [`xml`]: the ConfigTree ↔ XML text codec
//! - [`SchemaSpec`]: the loaded yang-lite module set, immutable after boot
//! - [`Validator`]: structural validation producing NETCONF error documents
//! - [`DiffEngine`]: pure tree diffing, the body of every transaction
//! - [`edit`]: NETCONF `edit-config` operation semantics
//! - [`RpcError`]: the `<rpc-error>` document and its RESTCONF mapping
//! - [`ModuleStateRecord`]: the module-state sidecar format

pub mod diff;
pub mod edit;
pub mod error;
pub mod modstate;
pub mod path;
pub mod rpc_error;
pub mod schema;
pub mod tree;
pub mod validate;
pub mod xml;

pub use diff::{DiffEngine, DiffEntry, TreeDiff};
pub use edit::{apply_edit, EditOp, EditOutcome};
pub use error::{ModelError, XmlError};
pub use modstate::{ModuleRevision, ModuleStateRecord};
pub use path::{NodePath, PathSegment};
pub use rpc_error::{ErrorSeverity, ErrorTag, ErrorType, RpcError};
pub use schema::{
    Module, Range, SchemaNode, SchemaNodeId, SchemaNodeKind, SchemaSpec, SchemaSpecBuilder,
    UnknownStatement, YangType,
};
pub use tree::{ConfigTree, NodeId};
pub use validate::{bind_schema, Validator};

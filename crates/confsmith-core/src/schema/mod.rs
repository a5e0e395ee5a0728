//! Schema model: yang-lite modules bound into an immutable [`SchemaSpec`].

mod module;
mod node;
mod spec;
mod yang_type;

pub use module::{Module, UnknownStatement};
pub use node::{SchemaNode, SchemaNodeId, SchemaNodeKind};
pub use spec::{SchemaSpec, SchemaSpecBuilder};
pub use yang_type::{Range, ValueError, YangType};

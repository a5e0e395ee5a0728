use std::fmt;
use std::str::FromStr;

use crate::path::{NodePath, PathSegment};
use crate::rpc_error::{ErrorTag, RpcError};
use crate::schema::{SchemaNodeId, SchemaNodeKind, SchemaSpec};
use crate::tree::{ConfigTree, NodeId};

/// NETCONF edit operations, used both as the `default-operation` of an
/// `edit-config` and as per-node `operation` attribute overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOp {
    Merge,
    Replace,
    Create,
    Delete,
    Remove,
    None,
}

impl EditOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Replace => "replace",
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Remove => "remove",
            Self::None => "none",
        }
    }
}

impl fmt::Display for EditOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EditOp {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge" => Ok(Self::Merge),
            "replace" => Ok(Self::Replace),
            "create" => Ok(Self::Create),
            "delete" => Ok(Self::Delete),
            "remove" => Ok(Self::Remove),
            "none" => Ok(Self::None),
            other => Err(RpcError::protocol(
                ErrorTag::BadAttribute,
                format!("unknown operation '{other}'"),
            )),
        }
    }
}

/// The three-way result of applying an edit: either the target tree was
/// updated, or it was left untouched with the reason attached.
#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    Applied,
    Rejected(RpcError),
}

impl EditOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Applies `edit` to `target` under NETCONF `edit-config` semantics.
///
/// Per-node `operation` attributes override `default_op` and are inherited
/// downward. On rejection the target is unchanged: the edit runs against a
/// scratch copy that only replaces the target on success.
pub fn apply_edit(
    target: &mut ConfigTree,
    edit: &ConfigTree,
    default_op: EditOp,
    spec: &SchemaSpec,
) -> EditOutcome {
    let mut scratch = target.clone();
    let scratch_root = scratch.root();
    let result = apply_children(
        &mut scratch,
        scratch_root,
        edit,
        edit.root(),
        None,
        default_op,
        spec,
        &NodePath::root(),
    );
    match result {
        Ok(()) => {
            *target = scratch;
            EditOutcome::Applied
        }
        Err(e) => EditOutcome::Rejected(e),
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_children(
    target: &mut ConfigTree,
    t_node: NodeId,
    edit: &ConfigTree,
    e_node: NodeId,
    schema: Option<SchemaNodeId>,
    inherited: EditOp,
    spec: &SchemaSpec,
    path: &NodePath,
) -> Result<(), RpcError> {
    for e_child in edit.children(e_node).to_vec() {
        let op = match edit.attr(e_child, "operation") {
            Some(raw) => raw.parse::<EditOp>()?,
            None => inherited,
        };
        let name = edit.name(e_child).to_string();
        let child_schema = spec.data_child(schema, &name);
        let seg = segment_for(edit, e_child, child_schema, spec);
        let child_path = path.join(seg);
        let counterpart = find_counterpart(target, t_node, edit, e_child, child_schema, spec);

        match op {
            EditOp::Create => {
                if counterpart.is_some() {
                    return Err(RpcError::application(
                        ErrorTag::DataExists,
                        format!("'{child_path}' already exists"),
                    )
                    .with_path(child_path.to_string()));
                }
                let id = target.graft(t_node, edit, e_child);
                target.clear_attrs_recursive(id);
            }
            EditOp::Delete => match counterpart {
                Some(t_child) => target.detach(t_child),
                None => {
                    return Err(RpcError::application(
                        ErrorTag::DataMissing,
                        format!("'{child_path}' does not exist"),
                    )
                    .with_path(child_path.to_string()));
                }
            },
            EditOp::Remove => {
                if let Some(t_child) = counterpart {
                    target.detach(t_child);
                }
            }
            EditOp::Replace => {
                if let Some(t_child) = counterpart {
                    target.detach(t_child);
                }
                let id = target.graft(t_node, edit, e_child);
                target.clear_attrs_recursive(id);
            }
            EditOp::Merge => {
                let is_leaf = edit.children(e_child).is_empty();
                let t_child = match counterpart {
                    Some(t_child) => t_child,
                    None => target.append_child(t_node, name.clone()),
                };
                if is_leaf {
                    if let Some(v) = edit.value(e_child) {
                        target.set_value(t_child, v);
                    }
                } else {
                    // Recursing (rather than grafting) honors nested
                    // operation attributes inside a freshly-created subtree.
                    apply_children(
                        target,
                        t_child,
                        edit,
                        e_child,
                        child_schema,
                        EditOp::Merge,
                        spec,
                        &child_path,
                    )?;
                }
            }
            EditOp::None => match counterpart {
                Some(t_child) => {
                    apply_children(
                        target,
                        t_child,
                        edit,
                        e_child,
                        child_schema,
                        EditOp::None,
                        spec,
                        &child_path,
                    )?;
                }
                None => {
                    if let Some(missing) = first_delete_under(edit, e_child, &child_path) {
                        return Err(RpcError::application(
                            ErrorTag::DataMissing,
                            format!("'{missing}' does not exist"),
                        )
                        .with_path(missing.to_string()));
                    }
                }
            },
        }
    }
    Ok(())
}

/// Under an absent positioning node, an explicit `delete` still has to
/// fail with data-missing.
fn first_delete_under(edit: &ConfigTree, id: NodeId, path: &NodePath) -> Option<NodePath> {
    for child in edit.children(id) {
        let child_path = path.join(PathSegment {
            name: edit.name(*child).to_string(),
            keys: Vec::new(),
        });
        if edit.attr(*child, "operation") == Some("delete") {
            return Some(child_path);
        }
        if let Some(found) = first_delete_under(edit, *child, &child_path) {
            return Some(found);
        }
    }
    None
}

fn find_counterpart(
    target: &ConfigTree,
    t_node: NodeId,
    edit: &ConfigTree,
    e_child: NodeId,
    child_schema: Option<SchemaNodeId>,
    spec: &SchemaSpec,
) -> Option<NodeId> {
    let name = edit.name(e_child);
    match child_schema.map(|s| &spec.node(s).kind) {
        Some(SchemaNodeKind::List { keys }) => {
            let key_values: Vec<(String, String)> = keys
                .iter()
                .filter_map(|k| {
                    edit.first_child(e_child, k)
                        .and_then(|leaf| edit.value(leaf))
                        .map(|v| (k.clone(), v.to_string()))
                })
                .collect();
            target.find_list_entry(t_node, name, &key_values)
        }
        Some(SchemaNodeKind::LeafList { .. }) => target
            .children_named(t_node, name)
            .find(|c| target.value(*c) == edit.value(e_child)),
        _ => target.first_child(t_node, name),
    }
}

fn segment_for(
    edit: &ConfigTree,
    id: NodeId,
    schema: Option<SchemaNodeId>,
    spec: &SchemaSpec,
) -> PathSegment {
    let keys = match schema.map(|s| &spec.node(s).kind) {
        Some(SchemaNodeKind::List { keys }) => keys
            .iter()
            .filter_map(|k| {
                edit.first_child(id, k)
                    .and_then(|leaf| edit.value(leaf))
                    .map(|v| (k.clone(), v.to_string()))
            })
            .collect(),
        _ => Vec::new(),
    };
    PathSegment {
        name: edit.name(id).to_string(),
        keys,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SchemaNodeKind, YangType};
    use crate::xml::parse_config;

    fn spec() -> SchemaSpec {
        let mut b = SchemaSpec::builder();
        let m = b.module("net", "urn:net", "n").unwrap();
        let a = b.add_node(m, None, "a", SchemaNodeKind::Container { presence: false });
        b.add_node(
            m,
            Some(a),
            "x",
            SchemaNodeKind::Leaf {
                yang_type: YangType::Int32 { range: None },
                mandatory: false,
                default: None,
            },
        );
        b.add_node(
            m,
            Some(a),
            "tag",
            SchemaNodeKind::LeafList {
                yang_type: YangType::String { length: None },
            },
        );
        let servers = b.add_node(m, None, "servers", SchemaNodeKind::Container { presence: false });
        let server = b.add_node(
            m,
            Some(servers),
            "server",
            SchemaNodeKind::List {
                keys: vec!["name".into()],
            },
        );
        for leaf in ["name", "host", "port"] {
            b.add_node(
                m,
                Some(server),
                leaf,
                SchemaNodeKind::Leaf {
                    yang_type: YangType::String { length: None },
                    mandatory: false,
                    default: None,
                },
            );
        }
        b.finish().unwrap()
    }

    fn run(target: &str, edit: &str, op: EditOp) -> (ConfigTree, EditOutcome) {
        let mut t = parse_config(target).unwrap();
        let e = parse_config(edit).unwrap();
        let outcome = apply_edit(&mut t, &e, op, &spec());
        (t, outcome)
    }

    #[test]
    fn merge_creates_missing_subtree() {
        let (t, outcome) = run("<config/>", "<config><a><x>1</x></a></config>", EditOp::Merge);
        assert!(outcome.is_applied());
        assert!(t.semantic_eq(&parse_config("<config><a><x>1</x></a></config>").unwrap()));
    }

    #[test]
    fn merge_overwrites_leaf() {
        let (t, outcome) = run(
            "<config><a><x>1</x></a></config>",
            "<config><a><x>2</x></a></config>",
            EditOp::Merge,
        );
        assert!(outcome.is_applied());
        assert!(t.semantic_eq(&parse_config("<config><a><x>2</x></a></config>").unwrap()));
    }

    #[test]
    fn merge_preserves_list_identity() {
        let (t, outcome) = run(
            "<config><servers><server><name>web</name><host>h1</host></server></servers></config>",
            "<config><servers><server><name>web</name><port>80</port></server></servers></config>",
            EditOp::Merge,
        );
        assert!(outcome.is_applied());
        let expect = "<config><servers><server><name>web</name><host>h1</host>\
                      <port>80</port></server></servers></config>";
        assert!(t.semantic_eq(&parse_config(expect).unwrap()));
    }

    #[test]
    fn merge_appends_new_list_entry() {
        let (t, outcome) = run(
            "<config><servers><server><name>web</name></server></servers></config>",
            "<config><servers><server><name>db</name></server></servers></config>",
            EditOp::Merge,
        );
        assert!(outcome.is_applied());
        let servers = t.first_child(t.root(), "servers").unwrap();
        assert_eq!(t.children(servers).len(), 2);
    }

    #[test]
    fn merge_leaf_list_adds_value_once() {
        let (t, outcome) = run(
            "<config><a><tag>red</tag></a></config>",
            "<config><a><tag>red</tag><tag>blue</tag></a></config>",
            EditOp::Merge,
        );
        assert!(outcome.is_applied());
        let a = t.first_child(t.root(), "a").unwrap();
        assert_eq!(t.children_named(a, "tag").count(), 2);
    }

    #[test]
    fn create_rejects_existing() {
        let (t, outcome) = run(
            "<config><a><x>1</x></a></config>",
            "<config><a operation=\"create\"><x>1</x></a></config>",
            EditOp::Merge,
        );
        match outcome {
            EditOutcome::Rejected(e) => {
                assert_eq!(e.tag, ErrorTag::DataExists);
                assert_eq!(e.path.as_deref(), Some("/a"));
            }
            EditOutcome::Applied => panic!("expected rejection"),
        }
        // Target untouched on rejection.
        assert!(t.semantic_eq(&parse_config("<config><a><x>1</x></a></config>").unwrap()));
    }

    #[test]
    fn create_adds_fresh() {
        let (t, outcome) = run(
            "<config/>",
            "<config><a operation=\"create\"><x>1</x></a></config>",
            EditOp::None,
        );
        assert!(outcome.is_applied());
        assert!(!t.is_empty());
    }

    #[test]
    fn delete_absent_is_error() {
        let (_, outcome) = run(
            "<config/>",
            "<config><a operation=\"delete\"/></config>",
            EditOp::Merge,
        );
        match outcome {
            EditOutcome::Rejected(e) => assert_eq!(e.tag, ErrorTag::DataMissing),
            EditOutcome::Applied => panic!("expected rejection"),
        }
    }

    #[test]
    fn remove_absent_is_noop() {
        let (t, outcome) = run(
            "<config/>",
            "<config><a operation=\"remove\"/></config>",
            EditOp::Merge,
        );
        assert!(outcome.is_applied());
        assert!(t.is_empty());
    }

    #[test]
    fn delete_removes_subtree() {
        let (t, outcome) = run(
            "<config><a><x>1</x></a><b/></config>",
            "<config><a operation=\"delete\"/></config>",
            EditOp::None,
        );
        assert!(outcome.is_applied());
        assert!(t.first_child(t.root(), "a").is_none());
        assert!(t.first_child(t.root(), "b").is_some());
    }

    #[test]
    fn delete_specific_list_entry() {
        let (t, outcome) = run(
            "<config><servers><server><name>web</name></server>\
             <server><name>db</name></server></servers></config>",
            "<config><servers><server operation=\"delete\"><name>web</name></server></servers></config>",
            EditOp::None,
        );
        assert!(outcome.is_applied());
        let servers = t.first_child(t.root(), "servers").unwrap();
        let remaining: Vec<_> = t.children_named(servers, "server").collect();
        assert_eq!(remaining.len(), 1);
        let name = t.first_child(remaining[0], "name").unwrap();
        assert_eq!(t.value(name), Some("db"));
    }

    #[test]
    fn replace_substitutes_subtree() {
        let (t, outcome) = run(
            "<config><a><x>1</x><tag>red</tag></a></config>",
            "<config><a operation=\"replace\"><x>9</x></a></config>",
            EditOp::Merge,
        );
        assert!(outcome.is_applied());
        assert!(t.semantic_eq(&parse_config("<config><a><x>9</x></a></config>").unwrap()));
    }

    #[test]
    fn default_op_none_only_positions() {
        let (t, outcome) = run(
            "<config><a><x>1</x></a></config>",
            "<config><a><x>2</x></a></config>",
            EditOp::None,
        );
        assert!(outcome.is_applied());
        // x carried no explicit op, so nothing changed.
        assert!(t.semantic_eq(&parse_config("<config><a><x>1</x></a></config>").unwrap()));
    }

    #[test]
    fn none_with_nested_delete_on_absent_ancestor() {
        let (_, outcome) = run(
            "<config/>",
            "<config><a><x operation=\"delete\"/></a></config>",
            EditOp::None,
        );
        match outcome {
            EditOutcome::Rejected(e) => assert_eq!(e.tag, ErrorTag::DataMissing),
            EditOutcome::Applied => panic!("expected rejection"),
        }
    }

    #[test]
    fn nested_override_inside_merge() {
        let (t, outcome) = run(
            "<config><a><x>1</x><tag>red</tag></a></config>",
            "<config><a><x operation=\"remove\"/><tag>blue</tag></a></config>",
            EditOp::Merge,
        );
        assert!(outcome.is_applied());
        let expect = "<config><a><tag>red</tag><tag>blue</tag></a></config>";
        assert!(t.semantic_eq(&parse_config(expect).unwrap()));
    }

    #[test]
    fn bad_operation_attribute() {
        let (_, outcome) = run(
            "<config/>",
            "<config><a operation=\"explode\"/></config>",
            EditOp::Merge,
        );
        match outcome {
            EditOutcome::Rejected(e) => assert_eq!(e.tag, ErrorTag::BadAttribute),
            EditOutcome::Applied => panic!("expected rejection"),
        }
    }

    #[test]
    fn edit_op_parse_and_display() {
        for (s, op) in [
            ("merge", EditOp::Merge),
            ("replace", EditOp::Replace),
            ("create", EditOp::Create),
            ("delete", EditOp::Delete),
            ("remove", EditOp::Remove),
            ("none", EditOp::None),
        ] {
            assert_eq!(s.parse::<EditOp>().unwrap(), op);
            assert_eq!(op.to_string(), s);
        }
        assert!("upsert".parse::<EditOp>().is_err());
    }
}

use crate::path::NodePath;
use crate::rpc_error::{ErrorTag, RpcError};
use crate::schema::{SchemaNodeId, SchemaNodeKind, SchemaSpec, YangType};
use crate::tree::{ConfigTree, NodeId};

/// Annotates every recognized element with its schema node pointer.
/// Unknown elements are left unbound for the validator to flag.
pub fn bind_schema(tree: &mut ConfigTree, spec: &SchemaSpec) {
    fn bind(tree: &mut ConfigTree, id: NodeId, schema: Option<SchemaNodeId>, spec: &SchemaSpec) {
        for child in tree.children(id).to_vec() {
            let name = tree.name(child).to_string();
            if let Some(child_schema) = spec.data_child(schema, &name) {
                tree.set_schema(child, child_schema);
                bind(tree, child, Some(child_schema), spec);
            }
        }
    }
    let root = tree.root();
    bind(tree, root, None, spec);
}

/// Structural validation of a configuration tree against the schema.
///
/// Pure function module, like the diff engine: no I/O, no side effects.
pub struct Validator;

impl Validator {
    /// Checks `tree` against `spec` and collects every violation as a
    /// NETCONF error document.
    pub fn validate(tree: &ConfigTree, spec: &SchemaSpec) -> Result<(), Vec<RpcError>> {
        let mut errors = Vec::new();
        Self::check_children(tree, tree.root(), None, spec, &NodePath::root(), &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            tracing::debug!(violations = errors.len(), "validation failed");
            Err(errors)
        }
    }

    fn check_children(
        tree: &ConfigTree,
        node: NodeId,
        schema: Option<SchemaNodeId>,
        spec: &SchemaSpec,
        path: &NodePath,
        errors: &mut Vec<RpcError>,
    ) {
        for child in tree.children(node).iter().copied() {
            let name = tree.name(child);
            let child_schema = match spec.data_child(schema, name) {
                Some(s) => s,
                None => {
                    errors.push(
                        RpcError::application(
                            ErrorTag::UnknownElement,
                            format!("element '{name}' is not defined by the schema"),
                        )
                        .with_path(format!("{path}/{name}")),
                    );
                    continue;
                }
            };
            let seg = crate::path::PathSegment {
                name: name.to_string(),
                keys: Self::key_values(tree, child, child_schema, spec),
            };
            let child_path = path.join(seg);
            Self::check_node(tree, child, child_schema, spec, &child_path, errors);
        }

        Self::check_mandatory(tree, node, schema, spec, path, errors);
        Self::check_choices(tree, node, schema, spec, path, errors);
        Self::check_list_uniqueness(tree, node, schema, spec, path, errors);
    }

    fn check_node(
        tree: &ConfigTree,
        node: NodeId,
        schema: SchemaNodeId,
        spec: &SchemaSpec,
        path: &NodePath,
        errors: &mut Vec<RpcError>,
    ) {
        match &spec.node(schema).kind {
            SchemaNodeKind::Leaf { yang_type, .. } => {
                Self::check_leaf_value(tree, node, yang_type, path, errors);
            }
            SchemaNodeKind::LeafList { yang_type } => {
                Self::check_leaf_value(tree, node, yang_type, path, errors);
            }
            SchemaNodeKind::List { keys } => {
                for key in keys {
                    let present = tree
                        .first_child(node, key)
                        .and_then(|leaf| tree.value(leaf))
                        .is_some();
                    if !present {
                        errors.push(
                            RpcError::application(
                                ErrorTag::MissingElement,
                                format!("list entry is missing its key leaf '{key}'"),
                            )
                            .with_path(path.to_string()),
                        );
                    }
                }
                Self::check_children(tree, node, Some(schema), spec, path, errors);
            }
            SchemaNodeKind::Container { .. } => {
                Self::check_children(tree, node, Some(schema), spec, path, errors);
            }
            // data_child never resolves to a choice or case directly
            SchemaNodeKind::Choice | SchemaNodeKind::Case => {}
        }
    }

    fn check_leaf_value(
        tree: &ConfigTree,
        node: NodeId,
        yang_type: &YangType,
        path: &NodePath,
        errors: &mut Vec<RpcError>,
    ) {
        if !tree.children(node).is_empty() {
            errors.push(
                RpcError::application(
                    ErrorTag::BadElement,
                    format!("leaf '{}' has element children", tree.name(node)),
                )
                .with_path(path.to_string()),
            );
            return;
        }
        let value = tree.value(node).unwrap_or_default();
        if let Err(e) = yang_type.check(value) {
            errors.push(
                RpcError::application(ErrorTag::InvalidValue, e.to_string())
                    .with_path(path.to_string()),
            );
            return;
        }
        if let YangType::LeafRef { path: target } = yang_type {
            let referenced = Self::leafref_resolves(tree, target, value);
            if !referenced {
                errors.push(
                    RpcError::application(
                        ErrorTag::DataMissing,
                        format!("leafref value '{value}' has no instance at {target}"),
                    )
                    .with_app_tag("instance-required")
                    .with_path(path.to_string()),
                );
            }
        }
    }

    fn leafref_resolves(tree: &ConfigTree, target: &NodePath, value: &str) -> bool {
        tree.find(target)
            .into_iter()
            .any(|id| tree.value(id) == Some(value))
    }

    /// Mandatory leaves must be present under every present parent
    /// (and at the top level).
    fn check_mandatory(
        tree: &ConfigTree,
        node: NodeId,
        schema: Option<SchemaNodeId>,
        spec: &SchemaSpec,
        path: &NodePath,
        errors: &mut Vec<RpcError>,
    ) {
        // Mandatory checks apply inside list entries only when the entry
        // exists, which is the case by construction here.
        let child_schemas: Vec<SchemaNodeId> = match schema {
            None => spec
                .modules()
                .iter()
                .flat_map(|m| m.top.iter().copied())
                .collect(),
            Some(s) => spec.node(s).children.clone(),
        };
        for cs in child_schemas {
            let sn = spec.node(cs);
            if let SchemaNodeKind::Leaf {
                mandatory: true, ..
            } = sn.kind
            {
                if tree.first_child(node, &sn.name).is_none() {
                    errors.push(
                        RpcError::application(
                            ErrorTag::MissingElement,
                            format!("mandatory leaf '{}' is not configured", sn.name),
                        )
                        .with_path(format!(
                            "{}/{}",
                            if path.is_root() { String::new() } else { path.to_string() },
                            sn.name
                        )),
                    );
                }
            }
        }
    }

    /// At most one case of a choice may contribute data children.
    fn check_choices(
        tree: &ConfigTree,
        node: NodeId,
        schema: Option<SchemaNodeId>,
        spec: &SchemaSpec,
        path: &NodePath,
        errors: &mut Vec<RpcError>,
    ) {
        let child_schemas: Vec<SchemaNodeId> = match schema {
            None => return,
            Some(s) => spec.node(s).children.clone(),
        };
        for cs in child_schemas {
            if !matches!(spec.node(cs).kind, SchemaNodeKind::Choice) {
                continue;
            }
            let mut present_cases = Vec::new();
            for case in spec.node(cs).children.iter().copied() {
                let case_present = spec.node(case).children.iter().any(|member| {
                    tree.first_child(node, &spec.node(*member).name).is_some()
                });
                if case_present {
                    present_cases.push(spec.node(case).name.clone());
                }
            }
            if present_cases.len() > 1 {
                errors.push(
                    RpcError::application(
                        ErrorTag::BadElement,
                        format!(
                            "choice '{}' has multiple cases configured: {}",
                            spec.node(cs).name,
                            present_cases.join(", ")
                        ),
                    )
                    .with_path(path.to_string()),
                );
            }
        }
    }

    /// Keyed-list entries must be unique by key values.
    fn check_list_uniqueness(
        tree: &ConfigTree,
        node: NodeId,
        schema: Option<SchemaNodeId>,
        spec: &SchemaSpec,
        path: &NodePath,
        errors: &mut Vec<RpcError>,
    ) {
        use std::collections::HashMap;
        let mut seen: HashMap<(String, Vec<(String, String)>), usize> = HashMap::new();
        for child in tree.children(node).iter().copied() {
            let name = tree.name(child).to_string();
            let Some(cs) = spec.data_child(schema, &name) else {
                continue;
            };
            if !matches!(spec.node(cs).kind, SchemaNodeKind::List { .. }) {
                continue;
            }
            let keys = Self::key_values(tree, child, cs, spec);
            if keys.is_empty() {
                continue;
            }
            *seen.entry((name, keys)).or_insert(0) += 1;
        }
        for ((name, keys), count) in seen {
            if count > 1 {
                let seg = crate::path::PathSegment { name, keys };
                errors.push(
                    RpcError::application(
                        ErrorTag::OperationFailed,
                        "duplicate list entry".to_string(),
                    )
                    .with_app_tag("data-not-unique")
                    .with_path(path.join(seg).to_string()),
                );
            }
        }
    }

    fn key_values(
        tree: &ConfigTree,
        id: NodeId,
        schema: SchemaNodeId,
        spec: &SchemaSpec,
    ) -> Vec<(String, String)> {
        spec.list_keys(schema)
            .iter()
            .filter_map(|k| {
                tree.first_child(id, k)
                    .and_then(|leaf| tree.value(leaf))
                    .map(|v| (k.clone(), v.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaNodeKind;
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
                yang_type: YangType::Int8 { range: None },
                mandatory: false,
                default: None,
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
        b.add_node(
            m,
            Some(server),
            "name",
            SchemaNodeKind::Leaf {
                yang_type: YangType::String { length: None },
                mandatory: true,
                default: None,
            },
        );
        b.add_node(
            m,
            Some(server),
            "uplink",
            SchemaNodeKind::Leaf {
                yang_type: YangType::LeafRef {
                    path: NodePath::parse("/links/link/id").unwrap(),
                },
                mandatory: false,
                default: None,
            },
        );
        let links = b.add_node(m, None, "links", SchemaNodeKind::Container { presence: false });
        let link = b.add_node(
            m,
            Some(links),
            "link",
            SchemaNodeKind::List {
                keys: vec!["id".into()],
            },
        );
        b.add_node(
            m,
            Some(link),
            "id",
            SchemaNodeKind::Leaf {
                yang_type: YangType::String { length: None },
                mandatory: false,
                default: None,
            },
        );
        let transport = b.add_node(m, Some(a), "transport", SchemaNodeKind::Choice);
        let tcp = b.add_node(m, Some(transport), "tcp", SchemaNodeKind::Case);
        b.add_node(
            m,
            Some(tcp),
            "tcp-port",
            SchemaNodeKind::Leaf {
                yang_type: YangType::Uint16 { range: None },
                mandatory: false,
                default: None,
            },
        );
        let tls = b.add_node(m, Some(transport), "tls", SchemaNodeKind::Case);
        b.add_node(
            m,
            Some(tls),
            "tls-port",
            SchemaNodeKind::Leaf {
                yang_type: YangType::Uint16 { range: None },
                mandatory: false,
                default: None,
            },
        );
        b.finish().unwrap()
    }

    fn errors_of(xml: &str) -> Vec<RpcError> {
        Validator::validate(&parse_config(xml).unwrap(), &spec()).unwrap_err()
    }

    #[test]
    fn valid_tree_passes() {
        let tree = parse_config("<config><a><x>5</x></a></config>").unwrap();
        assert!(Validator::validate(&tree, &spec()).is_ok());
    }

    #[test]
    fn empty_tree_passes() {
        assert!(Validator::validate(&ConfigTree::new(), &spec()).is_ok());
    }

    #[test]
    fn int8_out_of_range() {
        let errors = errors_of("<config><a><x>999</x></a></config>");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].tag, ErrorTag::InvalidValue);
        assert_eq!(errors[0].path.as_deref(), Some("/a/x"));
    }

    #[test]
    fn unknown_element_flagged() {
        let errors = errors_of("<config><nonsense/></config>");
        assert_eq!(errors[0].tag, ErrorTag::UnknownElement);
    }

    #[test]
    fn missing_list_key() {
        let errors = errors_of("<config><servers><server><uplink>l1</uplink></server></servers></config>");
        assert!(errors
            .iter()
            .any(|e| e.tag == ErrorTag::MissingElement && e.message.as_deref()
                == Some("list entry is missing its key leaf 'name'")));
    }

    #[test]
    fn mandatory_leaf_inside_list_entry() {
        // 'name' is both key and mandatory; an entry without it trips both.
        let errors = errors_of("<config><servers><server><uplink>l1</uplink></server></servers></config>");
        assert!(errors.iter().any(|e| e.tag == ErrorTag::MissingElement));
    }

    #[test]
    fn duplicate_list_keys() {
        let errors = errors_of(
            "<config><servers><server><name>web</name></server>\
             <server><name>web</name></server></servers></config>",
        );
        assert!(errors
            .iter()
            .any(|e| e.app_tag.as_deref() == Some("data-not-unique")));
    }

    #[test]
    fn leafref_resolvable() {
        let xml = "<config><links><link><id>l1</id></link></links>\
                   <servers><server><name>web</name><uplink>l1</uplink></server></servers></config>";
        let tree = parse_config(xml).unwrap();
        assert!(Validator::validate(&tree, &spec()).is_ok());
    }

    #[test]
    fn leafref_dangling() {
        let xml = "<config><servers><server><name>web</name><uplink>l9</uplink></server></servers></config>";
        let errors = errors_of(xml);
        let e = errors
            .iter()
            .find(|e| e.tag == ErrorTag::DataMissing)
            .expect("dangling leafref error");
        assert_eq!(e.app_tag.as_deref(), Some("instance-required"));
    }

    #[test]
    fn choice_cases_exclusive() {
        let errors = errors_of(
            "<config><a><tcp-port>80</tcp-port><tls-port>443</tls-port></a></config>",
        );
        let e = errors
            .iter()
            .find(|e| e.tag == ErrorTag::BadElement)
            .expect("choice violation");
        assert!(e.message.as_ref().unwrap().contains("transport"));
    }

    #[test]
    fn single_choice_case_ok() {
        let tree = parse_config("<config><a><tcp-port>80</tcp-port></a></config>").unwrap();
        assert!(Validator::validate(&tree, &spec()).is_ok());
    }

    #[test]
    fn leaf_with_children_rejected() {
        let errors = errors_of("<config><a><x><y>1</y></x></a></config>");
        assert!(errors.iter().any(|e| e.tag == ErrorTag::BadElement
            || e.tag == ErrorTag::UnknownElement));
    }

    #[test]
    fn bind_schema_annotates_known_nodes() {
        let mut tree = parse_config("<config><a><x>5</x></a><junk/></config>").unwrap();
        bind_schema(&mut tree, &spec());
        let a = tree.first_child(tree.root(), "a").unwrap();
        let x = tree.first_child(a, "x").unwrap();
        assert!(tree.schema_of(a).is_some());
        assert!(tree.schema_of(x).is_some());
        let junk = tree.first_child(tree.root(), "junk").unwrap();
        assert!(tree.schema_of(junk).is_none());
    }

    #[test]
    fn multiple_errors_collected() {
        let errors = errors_of("<config><a><x>999</x></a><junk/></config>");
        assert!(errors.len() >= 2);
    }
}

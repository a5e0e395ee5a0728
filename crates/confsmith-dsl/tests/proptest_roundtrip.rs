//! Print→parse round-trip fidelity over generated module shapes.

use std::collections::BTreeSet;

use confsmith_core::schema::{SchemaNodeKind, SchemaSpec, YangType};
use confsmith_dsl::{parse, print};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum LeafShape {
    Int8,
    Uint32,
    Text,
    Flag,
}

fn leaf_type(shape: &LeafShape) -> YangType {
    match shape {
        LeafShape::Int8 => YangType::Int8 { range: None },
        LeafShape::Uint32 => YangType::Uint32 { range: None },
        LeafShape::Text => YangType::String { length: None },
        LeafShape::Flag => YangType::Boolean,
    }
}

fn shape() -> impl Strategy<Value = LeafShape> {
    prop_oneof![
        Just(LeafShape::Int8),
        Just(LeafShape::Uint32),
        Just(LeafShape::Text),
        Just(LeafShape::Flag),
    ]
}

fn build_spec(
    module: &str,
    leaves: &BTreeSet<String>,
    shapes: &[LeafShape],
    mandatory_mask: &[bool],
) -> SchemaSpec {
    let mut b = SchemaSpec::builder();
    let m = b.module(module, &format!("urn:{module}"), "p").unwrap();
    b.set_revision(m, "2024-01-15");
    let top = b.add_node(m, None, "settings", SchemaNodeKind::Container { presence: false });
    for (i, leaf) in leaves.iter().enumerate() {
        let yang_type = leaf_type(&shapes[i % shapes.len().max(1)]);
        b.add_node(
            m,
            Some(top),
            leaf,
            SchemaNodeKind::Leaf {
                yang_type,
                mandatory: mandatory_mask[i % mandatory_mask.len().max(1)],
                default: None,
            },
        );
    }
    b.finish().unwrap()
}

proptest! {
    /// parse(print(spec)) reproduces the module fingerprint and every
    /// leaf of the original spec.
    #[test]
    fn printed_spec_reparses(
        module in "[a-z][a-z0-9]{0,8}",
        leaves in prop::collection::btree_set("[a-z][a-z0-9]{0,8}", 1..6),
        shapes in prop::collection::vec(shape(), 1..4),
        mandatory_mask in prop::collection::vec(any::<bool>(), 1..4),
    ) {
        // Prefixes keep generated names out of keyword space.
        let module = format!("mod-{module}");
        let leaves: BTreeSet<String> = leaves.iter().map(|l| format!("lf-{l}")).collect();
        let spec = build_spec(&module, &leaves, &shapes, &mandatory_mask);
        let text = print(&spec);
        let reparsed = parse(&text).expect("printer output parses");

        prop_assert_eq!(spec.fingerprint(), reparsed.fingerprint());
        let top = reparsed.top_node("settings").expect("container survives");
        for leaf in &leaves {
            prop_assert!(reparsed.data_child(Some(top), leaf).is_some(), "leaf {leaf} lost");
        }
    }
}

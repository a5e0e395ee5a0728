//! Property tests for the datastore layer: reset idempotency and
//! copy/read fidelity over arbitrary content.

use std::collections::BTreeMap;
use std::sync::Arc;

use confsmith_core::schema::SchemaSpec;
use confsmith_core::tree::ConfigTree;
use confsmith_store::Datastore;
use proptest::prelude::*;
use tempfile::TempDir;

fn tree_of(leaves: &BTreeMap<u8, u8>) -> ConfigTree {
    let mut tree = ConfigTree::new();
    for (idx, value) in leaves {
        tree.append_leaf(tree.root(), format!("leaf{idx}"), value.to_string());
    }
    tree
}

fn store() -> (TempDir, Datastore) {
    let dir = TempDir::new().unwrap();
    let ds = Datastore::open(dir.path().join("db"), Arc::new(SchemaSpec::empty())).unwrap();
    (dir, ds)
}

proptest! {
    /// reset; reset == reset, whatever was there before.
    #[test]
    fn reset_is_idempotent(leaves in prop::collection::btree_map(0u8..16, any::<u8>(), 0..8)) {
        let (_t, ds) = store();
        ds.create("candidate").unwrap();
        ds.write("candidate", &tree_of(&leaves)).unwrap();

        ds.reset("candidate").unwrap();
        let once = ds.read("candidate", None).unwrap();
        ds.reset("candidate").unwrap();
        let twice = ds.read("candidate", None).unwrap();

        prop_assert!(once.is_empty());
        prop_assert!(once.semantic_eq(&twice));
    }

    /// What is written is what is read, and copies are faithful.
    #[test]
    fn write_copy_read_fidelity(leaves in prop::collection::btree_map(0u8..16, any::<u8>(), 0..8)) {
        let (_t, ds) = store();
        ds.create("candidate").unwrap();
        let tree = tree_of(&leaves);
        ds.write("candidate", &tree).unwrap();
        prop_assert!(ds.read("candidate", None).unwrap().semantic_eq(&tree));

        ds.copy("candidate", "running").unwrap();
        prop_assert!(ds.read("running", None).unwrap().semantic_eq(&tree));
    }
}

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use confsmith_core::edit::{apply_edit, EditOp, EditOutcome};
use confsmith_core::modstate::ModuleStateRecord;
use confsmith_core::path::NodePath;
use confsmith_core::schema::SchemaSpec;
use confsmith_core::tree::ConfigTree;
use confsmith_core::xml;

use crate::error::StoreError;
use crate::lock::LockTable;

/// Well-known database names.
pub const RUNNING: &str = "running";
pub const CANDIDATE: &str = "candidate";
pub const STARTUP: &str = "startup";
pub const FAILSAFE: &str = "failsafe";
pub const TMP: &str = "tmp";

const BROKEN_MARKER: &str = "startup_broken";

fn valid_db_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-'))
}

/// File-backed store of named configuration databases.
///
/// Each database is `<name>_db.xml` rooted at `<config>`, with an optional
/// `<name>_db.modstate.json` sidecar recording the schema fingerprint it
/// was written under. The store owns the on-disk bytes exclusively; trees
/// returned from [`read`](Datastore::read) are owned by the caller.
///
/// Writes against the same database are serialized; reads proceed
/// concurrently with other reads.
pub struct Datastore {
    dir: PathBuf,
    schema: Arc<SchemaSpec>,
    locks: LockTable,
    guards: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl Datastore {
    /// Opens (and creates if needed) a datastore directory.
    pub fn open(dir: impl Into<PathBuf>, schema: Arc<SchemaSpec>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(Self {
            dir,
            schema,
            locks: LockTable::new(),
            guards: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn schema(&self) -> &Arc<SchemaSpec> {
        &self.schema
    }

    /// Advisory session locks over these databases.
    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    fn guard(&self, db: &str) -> Arc<RwLock<()>> {
        let mut guards = self.guards.lock().expect("guard table poisoned");
        guards
            .entry(db.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    fn check_name(db: &str) -> Result<(), StoreError> {
        if valid_db_name(db) {
            Ok(())
        } else {
            Err(StoreError::InvalidName(db.to_string()))
        }
    }

    fn db_path(&self, db: &str) -> PathBuf {
        self.dir.join(format!("{db}_db.xml"))
    }

    fn sidecar_path(&self, db: &str) -> PathBuf {
        self.dir.join(format!("{db}_db.modstate.json"))
    }

    /// Non-mutating existence check.
    pub fn exists(&self, db: &str) -> bool {
        valid_db_name(db) && self.db_path(db).is_file()
    }

    /// Idempotent creation of an empty database.
    pub fn create(&self, db: &str) -> Result<(), StoreError> {
        Self::check_name(db)?;
        let guard = self.guard(db);
        let _w = guard.write().expect("db guard poisoned");
        if self.db_path(db).is_file() {
            return Ok(());
        }
        self.write_atomic(&self.db_path(db), &xml::empty_config_document())?;
        self.write_sidecar(db)?;
        tracing::info!(db, "database created");
        Ok(())
    }

    /// Truncates content to the canonical empty configuration.
    pub fn reset(&self, db: &str) -> Result<(), StoreError> {
        Self::check_name(db)?;
        let guard = self.guard(db);
        let _w = guard.write().expect("db guard poisoned");
        self.write_atomic(&self.db_path(db), &xml::empty_config_document())?;
        self.write_sidecar(db)?;
        tracing::info!(db, "database reset to empty");
        Ok(())
    }

    /// Atomic replacement of `dst` with the content of `src`.
    /// On failure `dst` is unchanged.
    pub fn copy(&self, src: &str, dst: &str) -> Result<(), StoreError> {
        Self::check_name(src)?;
        Self::check_name(dst)?;
        if src == dst {
            return Ok(());
        }
        let src_path = self.db_path(src);
        let content = {
            let src_guard = self.guard(src);
            let _r = src_guard.read().expect("db guard poisoned");
            fs::read_to_string(&src_path).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    StoreError::NoSuchDatabase { db: src.to_string() }
                } else {
                    StoreError::io(&src_path, e)
                }
            })?
        };
        let guard = self.guard(dst);
        let _w = guard.write().expect("db guard poisoned");
        self.write_atomic(&self.db_path(dst), &content)?;
        match fs::read_to_string(self.sidecar_path(src)) {
            Ok(sidecar) => self.write_atomic(&self.sidecar_path(dst), &sidecar)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let _ = fs::remove_file(self.sidecar_path(dst));
            }
            Err(e) => return Err(StoreError::io(self.sidecar_path(src), e)),
        }
        tracing::debug!(src, dst, "database copied");
        Ok(())
    }

    /// Removes a database. Absence is not an error.
    pub fn delete(&self, db: &str) -> Result<(), StoreError> {
        Self::check_name(db)?;
        let guard = self.guard(db);
        let _w = guard.write().expect("db guard poisoned");
        for path in [self.db_path(db), self.sidecar_path(db)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io(&path, e)),
            }
        }
        tracing::info!(db, "database deleted");
        Ok(())
    }

    /// Reads the configured subtree; an empty tree when the database is
    /// absent. The returned tree is owned by the caller.
    pub fn read(&self, db: &str, filter: Option<&NodePath>) -> Result<ConfigTree, StoreError> {
        Self::check_name(db)?;
        let guard = self.guard(db);
        let _r = guard.read().expect("db guard poisoned");
        let path = self.db_path(db);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ConfigTree::new());
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        let tree = xml::parse_config(&content).map_err(|e| StoreError::Corrupt {
            db: db.to_string(),
            source: e,
        })?;
        Ok(match filter {
            Some(f) if !f.is_root() => tree.project(f),
            _ => tree,
        })
    }

    /// Replaces the whole content of `db` with `tree`.
    pub fn write(&self, db: &str, tree: &ConfigTree) -> Result<(), StoreError> {
        Self::check_name(db)?;
        let guard = self.guard(db);
        let _w = guard.write().expect("db guard poisoned");
        self.write_atomic(&self.db_path(db), &xml::to_xml_document(tree, true))?;
        self.write_sidecar(db)?;
        Ok(())
    }

    /// Applies an edit under NETCONF default-operation semantics.
    /// Serialized against other writers of the same database.
    pub fn put(
        &self,
        db: &str,
        op: EditOp,
        edit: &ConfigTree,
        actor: &str,
    ) -> Result<EditOutcome, StoreError> {
        Self::check_name(db)?;
        let guard = self.guard(db);
        let _w = guard.write().expect("db guard poisoned");
        let path = self.db_path(db);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NoSuchDatabase { db: db.to_string() });
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        let mut tree = xml::parse_config(&content).map_err(|e| StoreError::Corrupt {
            db: db.to_string(),
            source: e,
        })?;
        let outcome = apply_edit(&mut tree, edit, op, &self.schema);
        if let EditOutcome::Applied = outcome {
            self.write_atomic(&path, &xml::to_xml_document(&tree, true))?;
            self.write_sidecar(db)?;
            tracing::info!(db, op = %op, actor, "edit applied");
        } else {
            tracing::debug!(db, op = %op, actor, "edit rejected");
        }
        Ok(outcome)
    }

    // -- Module-state sidecars --

    /// The module-state record a database was last written under, if the
    /// sidecar exists.
    pub fn read_module_state(&self, db: &str) -> Result<Option<ModuleStateRecord>, StoreError> {
        Self::check_name(db)?;
        let path = self.sidecar_path(db);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        let record =
            serde_json::from_str(&content).map_err(|e| StoreError::BadSidecar {
                db: db.to_string(),
                message: e.to_string(),
            })?;
        Ok(Some(record))
    }

    /// Stamps `db` with the live schema's module state.
    pub fn write_module_state(&self, db: &str) -> Result<(), StoreError> {
        Self::check_name(db)?;
        self.write_sidecar(db)
    }

    fn write_sidecar(&self, db: &str) -> Result<(), StoreError> {
        let record = ModuleStateRecord::of(&self.schema);
        let json = serde_json::to_string_pretty(&record).expect("record serializes");
        self.write_atomic(&self.sidecar_path(db), &json)
    }

    // -- Broken-startup marker --

    /// Sets the persistent marker operators check after a broken boot.
    pub fn set_broken_marker(&self) -> Result<(), StoreError> {
        self.write_atomic(&self.dir.join(BROKEN_MARKER), "startup database was not parseable\n")
    }

    pub fn clear_broken_marker(&self) -> Result<(), StoreError> {
        let path = self.dir.join(BROKEN_MARKER);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    pub fn broken_marker_set(&self) -> bool {
        self.dir.join(BROKEN_MARKER).is_file()
    }

    /// Write-to-temp then rename, so readers never observe a torn file
    /// and a failed write leaves the destination unchanged.
    fn write_atomic(&self, path: &Path, content: &str) -> Result<(), StoreError> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, content).map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
    }
}

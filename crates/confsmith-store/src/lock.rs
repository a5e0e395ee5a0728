use std::collections::HashMap;
use std::sync::Mutex;

/// Why a lock operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    /// The database is locked; RFC 6241 treats re-locking by the holder
    /// the same as contention.
    #[error("lock is held by session {holder}")]
    Held { holder: u32 },

    /// Unlock by a session that does not hold the lock.
    #[error("lock is not held by this session")]
    NotHeld,
}

/// Advisory per-database session locks. At most one session holds the
/// lock on a given database.
#[derive(Debug, Default)]
pub struct LockTable {
    held: Mutex<HashMap<String, u32>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock on `db` for `session`.
    pub fn lock(&self, db: &str, session: u32) -> Result<(), LockError> {
        let mut held = self.held.lock().expect("lock table poisoned");
        match held.get(db) {
            Some(holder) => Err(LockError::Held { holder: *holder }),
            None => {
                held.insert(db.to_string(), session);
                tracing::debug!(db, session, "database locked");
                Ok(())
            }
        }
    }

    /// Releases the lock on `db`, which must be held by `session`.
    pub fn unlock(&self, db: &str, session: u32) -> Result<(), LockError> {
        let mut held = self.held.lock().expect("lock table poisoned");
        match held.get(db) {
            Some(holder) if *holder == session => {
                held.remove(db);
                tracing::debug!(db, session, "database unlocked");
                Ok(())
            }
            Some(holder) => Err(LockError::Held { holder: *holder }),
            None => Err(LockError::NotHeld),
        }
    }

    /// The session currently holding the lock on `db`, if any.
    pub fn holder(&self, db: &str) -> Option<u32> {
        self.held
            .lock()
            .expect("lock table poisoned")
            .get(db)
            .copied()
    }

    /// The holder when it is a session other than `session`.
    /// Writes are gated on this.
    pub fn held_by_other(&self, db: &str, session: u32) -> Option<u32> {
        self.holder(db).filter(|h| *h != session)
    }

    /// Databases locked by `session`.
    pub fn held_by(&self, session: u32) -> Vec<String> {
        let held = self.held.lock().expect("lock table poisoned");
        let mut dbs: Vec<String> = held
            .iter()
            .filter(|(_, s)| **s == session)
            .map(|(db, _)| db.clone())
            .collect();
        dbs.sort();
        dbs
    }

    /// Drops every lock owned by `session`; used when a session closes
    /// or is killed. Returns the databases that were released.
    pub fn release_session(&self, session: u32) -> Vec<String> {
        let mut held = self.held.lock().expect("lock table poisoned");
        let dbs: Vec<String> = held
            .iter()
            .filter(|(_, s)| **s == session)
            .map(|(db, _)| db.clone())
            .collect();
        for db in &dbs {
            held.remove(db);
        }
        if !dbs.is_empty() {
            tracing::debug!(session, released = dbs.len(), "session locks released");
        }
        dbs
    }
}

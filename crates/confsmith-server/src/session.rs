use std::collections::HashMap;

use confsmith_engine::Credentials;

/// A client conversation: identity, credentials, and the subscriptions
/// it owns. Lock ownership lives in the datastore's lock table, keyed by
/// the same session id.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: u32,
    pub username: Option<String>,
    pub credentials: Credentials,
    pub subscriptions: Vec<String>,
}

impl Session {
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or("anonymous")
    }
}

/// All live sessions, keyed by their numeric NETCONF session id.
/// Ids start at 1 and are never reused within a server lifetime.
#[derive(Debug, Default)]
pub struct SessionTable {
    next_id: u32,
    sessions: HashMap<u32, Session>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            sessions: HashMap::new(),
        }
    }

    /// Opens a session and returns its id.
    pub fn open(&mut self, credentials: Credentials) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.sessions.insert(
            id,
            Session {
                id,
                username: None,
                credentials,
                subscriptions: Vec::new(),
            },
        );
        tracing::info!(session = id, "session opened");
        id
    }

    pub fn get(&self, id: u32) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Removes a session, returning it so the caller can release locks
    /// and reap subscription workers.
    pub fn close(&mut self, id: u32) -> Option<Session> {
        let session = self.sessions.remove(&id);
        if session.is_some() {
            tracing::info!(session = id, "session closed");
        }
        session
    }

    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.sessions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sequential_and_unique() {
        let mut table = SessionTable::new();
        let a = table.open(Credentials::default());
        let b = table.open(Credentials::default());
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        table.close(a);
        let c = table.open(Credentials::default());
        assert_eq!(c, 3);
    }

    #[test]
    fn close_returns_session() {
        let mut table = SessionTable::new();
        let id = table.open(Credentials::default());
        table.get_mut(id).unwrap().subscriptions.push("sub_x".into());
        let closed = table.close(id).unwrap();
        assert_eq!(closed.subscriptions, vec!["sub_x"]);
        assert!(table.close(id).is_none());
        assert!(!table.contains(id));
    }

    #[test]
    fn display_name_defaults_to_anonymous() {
        let mut table = SessionTable::new();
        let id = table.open(Credentials::default());
        assert_eq!(table.get(id).unwrap().display_name(), "anonymous");
        table.get_mut(id).unwrap().username = Some("admin".into());
        assert_eq!(table.get(id).unwrap().display_name(), "admin");
    }

    #[test]
    fn ids_listing_sorted() {
        let mut table = SessionTable::new();
        for _ in 0..3 {
            table.open(Credentials::default());
        }
        assert_eq!(table.ids(), vec![1, 2, 3]);
        assert_eq!(table.len(), 3);
    }
}

//! Notification streams and per-subscription workers.
//!
//! Each subscription is served by an isolated worker task that owns its
//! outbound stream and never touches the primary datastore path; a
//! supervisor tracks worker ids so every termination path reaps them.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::Utc;
use confsmith_core::tree::ConfigTree;
use confsmith_core::xml;
use mti::prelude::{MagicTypeId, MagicTypeIdExt, V7};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::server::Outbound;

const SUB_PREFIX: &str = "sub";

/// A TypeID-based subscription identifier with prefix "sub".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(MagicTypeId);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(SUB_PREFIX.create_type_id::<V7>())
    }

    pub fn parse(s: &str) -> Option<Self> {
        let id = MagicTypeId::from_str(s).ok()?;
        (id.prefix().as_str() == SUB_PREFIX).then_some(Self(id))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One event on a stream.
#[derive(Debug, Clone)]
pub struct Notification {
    pub stream: String,
    /// Inner payload element, e.g. `<netconf-config-change>...`.
    pub payload: ConfigTree,
}

/// The named notification streams this backend exposes.
///
/// The two discovery toggles select which stream-discovery document
/// `get` advertises; the default `NETCONF` stream always exists.
pub struct StreamRegistry {
    senders: HashMap<String, broadcast::Sender<Notification>>,
    rfc8040_discovery: bool,
    rfc5277_discovery: bool,
}

impl StreamRegistry {
    pub fn new(rfc8040_discovery: bool, rfc5277_discovery: bool) -> Self {
        let mut senders = HashMap::new();
        let (tx, _) = broadcast::channel(64);
        senders.insert("NETCONF".to_string(), tx);
        Self {
            senders,
            rfc8040_discovery,
            rfc5277_discovery,
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.senders.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn subscribe(&self, stream: &str) -> Option<broadcast::Receiver<Notification>> {
        self.senders.get(stream).map(|tx| tx.subscribe())
    }

    /// Publishes an event; subscribers lagging behind drop it.
    pub fn publish(&self, notification: Notification) {
        if let Some(tx) = self.senders.get(&notification.stream) {
            let receivers = tx.receiver_count();
            if receivers > 0 {
                let _ = tx.send(notification);
            }
        }
    }

    /// The stream-discovery document exposed through `get`, shaped by the
    /// enabled discovery models.
    pub fn discovery_document(&self) -> ConfigTree {
        let mut tree = ConfigTree::new();
        let root = tree.root();
        if self.rfc8040_discovery {
            let streams = tree.append_child(root, "streams");
            for name in self.names() {
                tree.append_leaf(streams, "stream", name);
            }
        }
        if self.rfc5277_discovery {
            let netconf = tree.append_child(root, "netconf");
            let streams = tree.append_child(netconf, "streams");
            for name in self.names() {
                let stream = tree.append_child(streams, "stream");
                tree.append_leaf(stream, "name", name);
                tree.append_leaf(stream, "replay-support", "false");
            }
        }
        tree
    }
}

/// Renders one `<notification>` document.
pub fn notification_document(notification: &Notification, pretty: bool) -> String {
    let mut doc = ConfigTree::with_root("notification");
    let root = doc.root();
    doc.append_leaf(root, "eventTime", Utc::now().to_rfc3339());
    for child in notification.payload.children(notification.payload.root()).to_vec() {
        doc.graft(root, &notification.payload, child);
    }
    xml::to_xml(&doc, pretty)
}

/// Tracks subscription workers so shutdown and session teardown reap all
/// of them.
#[derive(Default)]
pub struct SubscriptionSupervisor {
    workers: Mutex<HashMap<String, WorkerHandle>>,
}

struct WorkerHandle {
    session: u32,
    handle: JoinHandle<()>,
}

impl SubscriptionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns the worker for one subscription: it forwards events from
    /// the stream channel to the owning connection's outbound queue.
    pub fn spawn(
        &self,
        id: SubscriptionId,
        session: u32,
        mut events: broadcast::Receiver<Notification>,
        outbound: mpsc::UnboundedSender<Outbound>,
        pretty: bool,
    ) {
        let sub = id.as_str().to_string();
        let worker_sub = sub.clone();
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(notification) => {
                        let frame = notification_document(&notification, pretty);
                        if outbound.send(Outbound::Frame(frame)).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(
                            subscription = %worker_sub,
                            missed,
                            "subscription lagged, events dropped"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::debug!(subscription = %worker_sub, "subscription worker finished");
        });
        self.workers
            .lock()
            .expect("supervisor poisoned")
            .insert(sub, WorkerHandle { session, handle });
    }

    pub fn len(&self) -> usize {
        self.workers.lock().expect("supervisor poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aborts and forgets every worker owned by `session`.
    pub fn reap_session(&self, session: u32) -> usize {
        let mut workers = self.workers.lock().expect("supervisor poisoned");
        let ids: Vec<String> = workers
            .iter()
            .filter(|(_, w)| w.session == session)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ids {
            if let Some(worker) = workers.remove(id) {
                worker.handle.abort();
            }
        }
        if !ids.is_empty() {
            tracing::debug!(session, reaped = ids.len(), "subscription workers reaped");
        }
        ids.len()
    }

    /// Aborts every worker; the shutdown path.
    pub fn shutdown_all(&self) {
        let mut workers = self.workers.lock().expect("supervisor poisoned");
        for (_, worker) in workers.drain() {
            worker.handle.abort();
        }
    }
}

//! The RPC dispatcher: routes parsed NETCONF requests to the datastore
//! and the transaction engine, gating writes on advisory locks and every
//! request on the auth plugin when one is registered.

use std::sync::Mutex;

use confsmith_core::edit::EditOutcome;
use confsmith_core::rpc_error::{ErrorTag, RpcError};
use confsmith_core::tree::ConfigTree;
use confsmith_engine::{
    commit, validate_only, Backend, Capability, CommitOutcome, EngineError,
};
use confsmith_store::{LockError, CANDIDATE, RUNNING};
use tokio::sync::mpsc;

use crate::proto::{parse_rpc, Reply, Request};
use crate::server::Outbound;
use crate::session::SessionTable;
use crate::subscription::{
    Notification, StreamRegistry, SubscriptionId, SubscriptionSupervisor,
};

/// Everything the dispatcher needs, shared by the primary worker and the
/// connection tasks.
pub struct ServerState {
    pub backend: Backend,
    pub sessions: Mutex<SessionTable>,
    pub streams: StreamRegistry,
    pub supervisor: SubscriptionSupervisor,
    pub outbounds: Mutex<std::collections::HashMap<u32, mpsc::UnboundedSender<Outbound>>>,
}

impl ServerState {
    pub fn new(backend: Backend, rfc8040_discovery: bool, rfc5277_discovery: bool) -> Self {
        Self {
            backend,
            sessions: Mutex::new(SessionTable::new()),
            streams: StreamRegistry::new(rfc8040_discovery, rfc5277_discovery),
            supervisor: SubscriptionSupervisor::new(),
            outbounds: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Releases everything a session owns: locks, subscription workers,
    /// table entry, outbound registration.
    pub fn teardown_session(&self, session: u32) {
        self.backend.store.locks().release_session(session);
        self.supervisor.reap_session(session);
        self.sessions
            .lock()
            .expect("session table poisoned")
            .close(session);
        self.outbounds
            .lock()
            .expect("outbound table poisoned")
            .remove(&session);
    }
}

/// A dispatched reply plus whether the connection should close.
#[derive(Debug)]
pub struct DispatchResult {
    pub reply: Reply,
    pub close: bool,
}

impl DispatchResult {
    fn reply(reply: Reply) -> Self {
        Self {
            reply,
            close: false,
        }
    }
}

/// Parses and dispatches one framed request, returning the serialized
/// reply. Only [`EngineError::Unrecoverable`] escapes as `Err`.
pub fn handle_rpc(
    state: &ServerState,
    session: u32,
    text: &str,
    outbound: &mpsc::UnboundedSender<Outbound>,
) -> Result<(String, bool), EngineError> {
    let pretty = state.backend.config.pretty;
    let rpc = match parse_rpc(text) {
        Ok(rpc) => rpc,
        Err(e) => {
            // Malformed requests never touch the datastore.
            return Ok((Reply::error(e).to_xml(None, pretty), false));
        }
    };
    let result = dispatch(state, session, &rpc.request, outbound)?;
    let xml = result.reply.to_xml(rpc.message_id.as_deref(), pretty);
    Ok((xml, result.close))
}

/// Routes one request. RPCs on a session arrive here FIFO; cross-session
/// ordering is whatever order the primary worker receives them in.
pub fn dispatch(
    state: &ServerState,
    session: u32,
    request: &Request,
    outbound: &mpsc::UnboundedSender<Outbound>,
) -> Result<DispatchResult, EngineError> {
    if let Err(e) = authenticate(state, session) {
        return Ok(DispatchResult::reply(Reply::error(e)));
    }
    let actor = state
        .sessions
        .lock()
        .expect("session table poisoned")
        .get(session)
        .map(|s| s.display_name().to_string())
        .unwrap_or_else(|| "anonymous".to_string());
    let store = &state.backend.store;

    let result = match request {
        Request::GetConfig { source, filter } => match store.read(source, filter.as_ref()) {
            Ok(tree) => DispatchResult::reply(Reply::Data(tree)),
            Err(e) => DispatchResult::reply(Reply::error(EngineError::from(e).to_rpc_error())),
        },

        Request::Get { filter } => match store.read(RUNNING, filter.as_ref()) {
            Ok(mut tree) => {
                if filter.is_none() {
                    // Stream discovery rides along with untargeted reads.
                    let discovery = state.streams.discovery_document();
                    let root = tree.root();
                    for child in discovery.children(discovery.root()).to_vec() {
                        tree.graft(root, &discovery, child);
                    }
                }
                DispatchResult::reply(Reply::Data(tree))
            }
            Err(e) => DispatchResult::reply(Reply::error(EngineError::from(e).to_rpc_error())),
        },

        Request::EditConfig {
            target,
            default_op,
            config,
        } => {
            if let Err(e) = check_lock(state, target, session) {
                return Ok(DispatchResult::reply(Reply::error(e)));
            }
            if !store.exists(target) {
                if let Err(e) = store.create(target) {
                    return Ok(DispatchResult::reply(Reply::error(
                        EngineError::from(e).to_rpc_error(),
                    )));
                }
            }
            match store.put(target, *default_op, config, &actor) {
                Ok(EditOutcome::Applied) => DispatchResult::reply(Reply::Ok),
                Ok(EditOutcome::Rejected(e)) => DispatchResult::reply(Reply::error(e)),
                Err(e) => DispatchResult::reply(Reply::error(EngineError::from(e).to_rpc_error())),
            }
        }

        Request::CopyConfig { source, target } => {
            if source == target {
                return Ok(DispatchResult::reply(Reply::error(RpcError::application(
                    ErrorTag::InvalidValue,
                    "source and target name the same database",
                ))));
            }
            if let Err(e) = check_lock(state, target, session) {
                return Ok(DispatchResult::reply(Reply::error(e)));
            }
            match store.copy(source, target) {
                Ok(()) => DispatchResult::reply(Reply::Ok),
                Err(e) => DispatchResult::reply(Reply::error(EngineError::from(e).to_rpc_error())),
            }
        }

        Request::DeleteConfig { target } => {
            if target == RUNNING {
                return Ok(DispatchResult::reply(Reply::error(RpcError::application(
                    ErrorTag::OperationNotSupported,
                    "the running database cannot be deleted",
                ))));
            }
            if let Err(e) = check_lock(state, target, session) {
                return Ok(DispatchResult::reply(Reply::error(e)));
            }
            match store.delete(target) {
                Ok(()) => DispatchResult::reply(Reply::Ok),
                Err(e) => DispatchResult::reply(Reply::error(EngineError::from(e).to_rpc_error())),
            }
        }

        Request::Lock { target } => match store.locks().lock(target, session) {
            Ok(()) => DispatchResult::reply(Reply::Ok),
            Err(LockError::Held { holder }) => {
                DispatchResult::reply(Reply::error(RpcError::lock_denied(target, holder)))
            }
            Err(LockError::NotHeld) => DispatchResult::reply(Reply::error(
                RpcError::application(ErrorTag::OperationFailed, "lock state inconsistent"),
            )),
        },

        Request::Unlock { target } => match store.locks().unlock(target, session) {
            Ok(()) => DispatchResult::reply(Reply::Ok),
            Err(LockError::Held { holder }) => DispatchResult::reply(Reply::error(
                RpcError::application(
                    ErrorTag::OperationFailed,
                    format!("lock on '{target}' is held by session {holder}"),
                )
                .with_info("session-id", holder.to_string()),
            )),
            Err(LockError::NotHeld) => DispatchResult::reply(Reply::error(
                RpcError::application(
                    ErrorTag::OperationFailed,
                    format!("lock on '{target}' is not held"),
                ),
            )),
        },

        Request::Validate { source } => match validate_only(&state.backend, source) {
            Ok(None) => DispatchResult::reply(Reply::Ok),
            Ok(Some(e)) => DispatchResult::reply(Reply::error(e)),
            Err(e) if e.is_unrecoverable() => return Err(e),
            Err(e) => DispatchResult::reply(Reply::error(e.to_rpc_error())),
        },

        Request::Commit => {
            if let Err(e) = check_lock(state, RUNNING, session) {
                return Ok(DispatchResult::reply(Reply::error(e)));
            }
            if !store.exists(CANDIDATE) {
                if let Err(e) = store.create(CANDIDATE) {
                    return Ok(DispatchResult::reply(Reply::error(
                        EngineError::from(e).to_rpc_error(),
                    )));
                }
            }
            match commit(&state.backend, CANDIDATE, RUNNING, &actor) {
                Ok(CommitOutcome::Committed) => {
                    state
                        .streams
                        .publish(config_change_notification(session, &actor));
                    DispatchResult::reply(Reply::Ok)
                }
                Ok(CommitOutcome::NoChange) => DispatchResult::reply(Reply::Ok),
                Ok(CommitOutcome::Rejected { error, .. }) => {
                    DispatchResult::reply(Reply::error(error))
                }
                Err(e) if e.is_unrecoverable() => return Err(e),
                Err(e) => DispatchResult::reply(Reply::error(e.to_rpc_error())),
            }
        }

        Request::DiscardChanges => {
            if let Err(e) = check_lock(state, CANDIDATE, session) {
                return Ok(DispatchResult::reply(Reply::error(e)));
            }
            if !store.exists(RUNNING) {
                if let Err(e) = store.create(RUNNING) {
                    return Ok(DispatchResult::reply(Reply::error(
                        EngineError::from(e).to_rpc_error(),
                    )));
                }
            }
            match store.copy(RUNNING, CANDIDATE) {
                Ok(()) => DispatchResult::reply(Reply::Ok),
                Err(e) => DispatchResult::reply(Reply::error(EngineError::from(e).to_rpc_error())),
            }
        }

        Request::CreateSubscription { stream, filter: _ } => {
            match state.streams.subscribe(stream) {
                Some(events) => {
                    let id = SubscriptionId::new();
                    state.supervisor.spawn(
                        id.clone(),
                        session,
                        events,
                        outbound.clone(),
                        state.backend.config.pretty,
                    );
                    if let Some(s) = state
                        .sessions
                        .lock()
                        .expect("session table poisoned")
                        .get_mut(session)
                    {
                        s.subscriptions.push(id.as_str().to_string());
                    }
                    tracing::info!(session, stream = %stream, subscription = %id, "subscription created");
                    DispatchResult::reply(Reply::Ok)
                }
                None => DispatchResult::reply(Reply::error(RpcError::application(
                    ErrorTag::InvalidValue,
                    format!("no such stream '{stream}'"),
                ))),
            }
        }

        Request::CloseSession => {
            state.teardown_session(session);
            DispatchResult {
                reply: Reply::Ok,
                close: true,
            }
        }

        Request::KillSession { session_id } => {
            if *session_id == session {
                return Ok(DispatchResult::reply(Reply::error(RpcError::application(
                    ErrorTag::InvalidValue,
                    "a session cannot kill itself",
                ))));
            }
            let exists = state
                .sessions
                .lock()
                .expect("session table poisoned")
                .contains(*session_id);
            if !exists {
                return Ok(DispatchResult::reply(Reply::error(RpcError::application(
                    ErrorTag::InvalidValue,
                    format!("no session {session_id}"),
                ))));
            }
            // Drop the victim's socket; its transaction semantics are
            // unaffected because the primary worker finishes requests
            // regardless of the reply channel.
            let victim_outbound = state
                .outbounds
                .lock()
                .expect("outbound table poisoned")
                .get(session_id)
                .cloned();
            state.teardown_session(*session_id);
            if let Some(tx) = victim_outbound {
                let _ = tx.send(Outbound::Close);
            }
            tracing::info!(by = session, killed = session_id, "session killed");
            DispatchResult::reply(Reply::Ok)
        }
    };
    Ok(result)
}

/// When any plugin declares the auth capability, every RPC is gated on a
/// positive decision; otherwise the session runs as the anonymous
/// identity.
fn authenticate(state: &ServerState, session: u32) -> Result<(), RpcError> {
    if !state.backend.plugins.has_capability(Capability::Auth) {
        return Ok(());
    }
    let credentials = state
        .sessions
        .lock()
        .expect("session table poisoned")
        .get(session)
        .map(|s| s.credentials.clone())
        .unwrap_or_default();
    for entry in state.backend.plugins.with_capability(Capability::Auth) {
        match entry.plugin().authenticate(&credentials) {
            Ok(confsmith_engine::AuthDecision::Accept { username }) => {
                if let Some(s) = state
                    .sessions
                    .lock()
                    .expect("session table poisoned")
                    .get_mut(session)
                {
                    s.username = Some(username);
                }
                return Ok(());
            }
            Ok(confsmith_engine::AuthDecision::Reject) => {}
            Err(e) => {
                return Err(RpcError::application(
                    ErrorTag::AccessDenied,
                    format!("auth plugin '{}' failed: {e}", entry.name()),
                ));
            }
        }
    }
    Err(
        RpcError::application(ErrorTag::AccessDenied, "authentication required")
            .with_app_tag("unauthenticated"),
    )
}

/// Advisory-lock gate for write operations.
fn check_lock(state: &ServerState, db: &str, session: u32) -> Result<(), RpcError> {
    match state.backend.store.locks().held_by_other(db, session) {
        Some(holder) => Err(RpcError::lock_denied(db, holder)),
        None => Ok(()),
    }
}

fn config_change_notification(session: u32, actor: &str) -> Notification {
    let mut payload = ConfigTree::new();
    let change = payload.append_child(payload.root(), "netconf-config-change");
    let by = payload.append_child(change, "changed-by");
    payload.append_leaf(by, "session-id", session.to_string());
    payload.append_leaf(by, "username", actor);
    payload.append_leaf(change, "datastore", RUNNING);
    Notification {
        stream: "NETCONF".to_string(),
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use confsmith_core::xml::parse_config;
    use confsmith_engine::{
        AuthDecision, CapabilitySet, ConfigPlugin, Credentials, EngineConfig, PluginError,
        PluginRegistry,
    };
    use tempfile::TempDir;

    const SCHEMA: &str = r#"
        module net {
            namespace "urn:net";
            prefix n;
            container a {
                leaf x { type int8; }
            }
        }
    "#;

    fn state_with(plugins: PluginRegistry) -> (TempDir, Arc<ServerState>) {
        let dir = TempDir::new().unwrap();
        let backend = Backend::new(
            EngineConfig::default(),
            confsmith_dsl::parse(SCHEMA).unwrap(),
            dir.path().join("db"),
            plugins,
        )
        .unwrap();
        backend.store.create(RUNNING).unwrap();
        backend.store.create(CANDIDATE).unwrap();
        (dir, Arc::new(ServerState::new(backend, true, false)))
    }

    fn state() -> (TempDir, Arc<ServerState>) {
        state_with(PluginRegistry::new())
    }

    fn open_session(
        state: &ServerState,
    ) -> (
        u32,
        mpsc::UnboundedSender<Outbound>,
        mpsc::UnboundedReceiver<Outbound>,
    ) {
        let id = state
            .sessions
            .lock()
            .unwrap()
            .open(Credentials::default());
        let (tx, rx) = mpsc::unbounded_channel();
        state.outbounds.lock().unwrap().insert(id, tx.clone());
        (id, tx, rx)
    }

    fn rpc(state: &ServerState, session: u32, out: &mpsc::UnboundedSender<Outbound>, text: &str) -> String {
        let (reply, _) = handle_rpc(state, session, text, out).unwrap();
        reply
    }

    #[test]
    fn edit_and_commit_scenario() {
        let (_t, state) = state();
        let (sid, out, _rx) = open_session(&state);
        let reply = rpc(
            &state,
            sid,
            &out,
            r#"<rpc message-id="1"><edit-config><target><candidate/></target>
               <config><a><x>1</x></a></config></edit-config></rpc>"#,
        );
        assert!(reply.contains("<ok/>"), "{reply}");

        let reply = rpc(&state, sid, &out, r#"<rpc message-id="2"><commit/></rpc>"#);
        assert!(reply.contains("<ok/>"), "{reply}");

        let running = state.backend.store.read(RUNNING, None).unwrap();
        assert!(running.semantic_eq(&parse_config("<config><a><x>1</x></a></config>").unwrap()));
    }

    #[test]
    fn invalid_candidate_commit_rejected() {
        let (_t, state) = state();
        let (sid, out, _rx) = open_session(&state);
        rpc(
            &state,
            sid,
            &out,
            r#"<rpc><edit-config><target><candidate/></target>
               <config><a><x>999</x></a></config></edit-config></rpc>"#,
        );
        let reply = rpc(&state, sid, &out, "<rpc><commit/></rpc>");
        assert!(reply.contains("invalid-value"), "{reply}");
        assert!(state.backend.store.read(RUNNING, None).unwrap().is_empty());
    }

    #[test]
    fn lock_denied_names_holder() {
        let (_t, state) = state();
        let (s1, _o1, _rx1) = open_session(&state);
        let (s2, o2, _rx2) = open_session(&state);
        state.backend.store.locks().lock(CANDIDATE, s1).unwrap();

        let reply = rpc(
            &state,
            s2,
            &o2,
            r#"<rpc><edit-config><target><candidate/></target>
               <config><a><x>1</x></a></config></edit-config></rpc>"#,
        );
        assert!(reply.contains("lock-denied"), "{reply}");
        assert!(reply.contains(&format!("<session-id>{s1}</session-id>")));
    }

    #[test]
    fn lock_rpc_and_unlock() {
        let (_t, state) = state();
        let (s1, o1, _rx1) = open_session(&state);
        let (s2, o2, _rx2) = open_session(&state);

        let reply = rpc(
            &state,
            s1,
            &o1,
            "<rpc><lock><target><candidate/></target></lock></rpc>",
        );
        assert!(reply.contains("<ok/>"));

        let reply = rpc(
            &state,
            s2,
            &o2,
            "<rpc><lock><target><candidate/></target></lock></rpc>",
        );
        assert!(reply.contains("lock-denied"));

        let reply = rpc(
            &state,
            s1,
            &o1,
            "<rpc><unlock><target><candidate/></target></unlock></rpc>",
        );
        assert!(reply.contains("<ok/>"));
    }

    #[test]
    fn get_config_returns_data() {
        let (_t, state) = state();
        let (sid, out, _rx) = open_session(&state);
        state
            .backend
            .store
            .write(RUNNING, &parse_config("<config><a><x>5</x></a></config>").unwrap())
            .unwrap();
        let reply = rpc(
            &state,
            sid,
            &out,
            r#"<rpc message-id="4"><get-config><source><running/></source></get-config></rpc>"#,
        );
        assert!(reply.contains("<data><a><x>5</x></a></data>"), "{reply}");
    }

    #[test]
    fn get_includes_stream_discovery() {
        let (_t, state) = state();
        let (sid, out, _rx) = open_session(&state);
        let reply = rpc(&state, sid, &out, "<rpc><get/></rpc>");
        assert!(reply.contains("<streams><stream>NETCONF</stream></streams>"), "{reply}");
    }

    #[test]
    fn delete_running_not_supported() {
        let (_t, state) = state();
        let (sid, out, _rx) = open_session(&state);
        let reply = rpc(
            &state,
            sid,
            &out,
            "<rpc><delete-config><target><running/></target></delete-config></rpc>",
        );
        assert!(reply.contains("operation-not-supported"), "{reply}");
        assert!(state.backend.store.exists(RUNNING));
    }

    #[test]
    fn discard_changes_restores_candidate() {
        let (_t, state) = state();
        let (sid, out, _rx) = open_session(&state);
        rpc(
            &state,
            sid,
            &out,
            r#"<rpc><edit-config><target><candidate/></target>
               <config><a><x>1</x></a></config></edit-config></rpc>"#,
        );
        let reply = rpc(&state, sid, &out, "<rpc><discard-changes/></rpc>");
        assert!(reply.contains("<ok/>"));
        assert!(state.backend.store.read(CANDIDATE, None).unwrap().is_empty());
    }

    #[test]
    fn validate_rpc() {
        let (_t, state) = state();
        let (sid, out, _rx) = open_session(&state);
        rpc(
            &state,
            sid,
            &out,
            r#"<rpc><edit-config><target><candidate/></target>
               <config><a><x>999</x></a></config></edit-config></rpc>"#,
        );
        let reply = rpc(
            &state,
            sid,
            &out,
            "<rpc><validate><source><candidate/></source></validate></rpc>",
        );
        assert!(reply.contains("invalid-value"), "{reply}");
    }

    #[test]
    fn malformed_rpc_gets_error_reply() {
        let (_t, state) = state();
        let (sid, out, _rx) = open_session(&state);
        let reply = rpc(&state, sid, &out, "this is not xml");
        assert!(reply.contains("malformed-message"), "{reply}");
    }

    #[test]
    fn close_session_releases_locks() {
        let (_t, state) = state();
        let (s1, o1, _rx1) = open_session(&state);
        let (s2, o2, _rx2) = open_session(&state);
        rpc(
            &state,
            s1,
            &o1,
            "<rpc><lock><target><candidate/></target></lock></rpc>",
        );
        let (reply, close) = handle_rpc(&state, s1, "<rpc><close-session/></rpc>", &o1).unwrap();
        assert!(reply.contains("<ok/>"));
        assert!(close);
        // The lock is free for the second session now.
        let reply = rpc(
            &state,
            s2,
            &o2,
            "<rpc><lock><target><candidate/></target></lock></rpc>",
        );
        assert!(reply.contains("<ok/>"), "{reply}");
    }

    #[test]
    fn kill_session_drops_victim_locks() {
        let (_t, state) = state();
        let (s1, o1, _rx1) = open_session(&state);
        let (s2, o2, _rx2) = open_session(&state);
        rpc(
            &state,
            s1,
            &o1,
            "<rpc><lock><target><candidate/></target></lock></rpc>",
        );
        let reply = rpc(
            &state,
            s2,
            &o2,
            &format!("<rpc><kill-session><session-id>{s1}</session-id></kill-session></rpc>"),
        );
        assert!(reply.contains("<ok/>"), "{reply}");
        assert!(!state.sessions.lock().unwrap().contains(s1));
        assert_eq!(state.backend.store.locks().holder(CANDIDATE), None);
    }

    #[test]
    fn kill_own_session_rejected() {
        let (_t, state) = state();
        let (sid, out, _rx) = open_session(&state);
        let reply = rpc(
            &state,
            sid,
            &out,
            &format!("<rpc><kill-session><session-id>{sid}</session-id></kill-session></rpc>"),
        );
        assert!(reply.contains("invalid-value"), "{reply}");
    }

    #[tokio::test]
    async fn subscription_receives_commit_notification() {
        let (_t, state) = state();
        let (sid, _unused, _old_rx) = open_session(&state);
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        state.outbounds.lock().unwrap().insert(sid, out_tx.clone());

        let (reply, _) = handle_rpc(
            &state,
            sid,
            "<rpc><create-subscription><stream>NETCONF</stream></create-subscription></rpc>",
            &out_tx,
        )
        .unwrap();
        assert!(reply.contains("<ok/>"));

        handle_rpc(
            &state,
            sid,
            r#"<rpc><edit-config><target><candidate/></target>
               <config><a><x>3</x></a></config></edit-config></rpc>"#,
            &out_tx,
        )
        .unwrap();
        handle_rpc(&state, sid, "<rpc><commit/></rpc>", &out_tx).unwrap();

        let frame = out_rx.recv().await.expect("notification delivered");
        match frame {
            Outbound::Frame(text) => {
                assert!(text.contains("<netconf-config-change>"), "{text}");
                assert!(text.contains("<datastore>running</datastore>"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_stream_rejected() {
        let (_t, state) = state();
        let (sid, out, _rx) = open_session(&state);
        let reply = rpc(
            &state,
            sid,
            &out,
            "<rpc><create-subscription><stream>SYSLOG</stream></create-subscription></rpc>",
        );
        assert!(reply.contains("invalid-value"), "{reply}");
    }

    struct TokenAuth;
    impl ConfigPlugin for TokenAuth {
        fn name(&self) -> &str {
            "token-auth"
        }
        fn capabilities(&self) -> CapabilitySet {
            CapabilitySet::empty().with(Capability::Auth)
        }
        fn authenticate(&self, creds: &Credentials) -> Result<AuthDecision, PluginError> {
            match creds.secret.as_deref() {
                Some("sesame") => Ok(AuthDecision::Accept {
                    username: creds
                        .username
                        .clone()
                        .unwrap_or_else(|| "operator".to_string()),
                }),
                _ => Ok(AuthDecision::Reject),
            }
        }
    }

    #[test]
    fn auth_plugin_gates_rpcs() {
        let mut plugins = PluginRegistry::new();
        plugins.register(Arc::new(TokenAuth)).unwrap();
        let (_t, state) = state_with(plugins);

        // Session without the secret is refused.
        let (sid, out, _rx) = open_session(&state);
        let reply = rpc(&state, sid, &out, "<rpc><get/></rpc>");
        assert!(reply.contains("access-denied"), "{reply}");

        // Session with the secret is attributed to its username.
        let good = state.sessions.lock().unwrap().open(Credentials {
            username: Some("alice".into()),
            secret: Some("sesame".into()),
        });
        let (tx, _rx) = mpsc::unbounded_channel();
        let reply = rpc(&state, good, &tx, "<rpc><get/></rpc>");
        assert!(reply.contains("<data>"), "{reply}");
        assert_eq!(
            state
                .sessions
                .lock()
                .unwrap()
                .get(good)
                .unwrap()
                .username
                .as_deref(),
            Some("alice")
        );
    }
}

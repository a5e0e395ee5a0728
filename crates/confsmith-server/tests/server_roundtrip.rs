//! Socket-level round trips: frames in, replies out, locks across
//! sessions, subscription notifications on commit.

use std::sync::Arc;
use std::time::Duration;

use confsmith_engine::{Backend, EngineConfig, PluginRegistry};
use confsmith_server::frame::{read_frame, write_frame};
use confsmith_server::{serve, ServerState, SocketFamily};
use confsmith_store::{CANDIDATE, RUNNING};
use tempfile::TempDir;
use tokio::net::UnixStream;
use tokio::sync::watch;

const SCHEMA: &str = r#"
    module net {
        namespace "urn:net";
        prefix n;
        container a {
            leaf x { type int8; }
        }
    }
"#;

struct Harness {
    _dir: TempDir,
    socket: std::path::PathBuf,
    shutdown: watch::Sender<bool>,
    server: tokio::task::JoinHandle<()>,
}

async fn start_server() -> Harness {
    let dir = TempDir::new().unwrap();
    let backend = Backend::new(
        EngineConfig::default(),
        confsmith_dsl::parse(SCHEMA).unwrap(),
        dir.path().join("db"),
        PluginRegistry::new(),
    )
    .unwrap();
    backend.store.create(RUNNING).unwrap();
    backend.store.create(CANDIDATE).unwrap();
    let state = Arc::new(ServerState::new(backend, true, false));
    let socket = dir.path().join("confsmith.sock");
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let addr = socket.display().to_string();
    let server = tokio::spawn(async move {
        let _ = serve(state, SocketFamily::Unix, &addr, shutdown_rx).await;
    });
    // The listener binds asynchronously; wait for the socket file.
    for _ in 0..100 {
        if socket.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Harness {
        _dir: dir,
        socket,
        shutdown: shutdown_tx,
        server,
    }
}

impl Harness {
    async fn connect(&self) -> UnixStream {
        for _ in 0..100 {
            if let Ok(stream) = UnixStream::connect(&self.socket).await {
                return stream;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("server never accepted a connection");
    }

    async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = tokio::time::timeout(Duration::from_secs(2), self.server).await;
    }
}

async fn call(stream: &mut UnixStream, rpc: &str) -> String {
    write_frame(stream, rpc).await.unwrap();
    read_frame(stream)
        .await
        .unwrap()
        .expect("server replied")
}

#[tokio::test]
async fn edit_commit_get_roundtrip() {
    let harness = start_server().await;
    let mut client = harness.connect().await;

    let reply = call(
        &mut client,
        r#"<rpc message-id="1"><edit-config><target><candidate/></target>
           <config><a><x>1</x></a></config></edit-config></rpc>"#,
    )
    .await;
    assert!(reply.contains("<ok/>"), "{reply}");
    assert!(reply.contains("message-id=\"1\""));

    let reply = call(&mut client, r#"<rpc message-id="2"><commit/></rpc>"#).await;
    assert!(reply.contains("<ok/>"), "{reply}");

    let reply = call(
        &mut client,
        r#"<rpc message-id="3"><get-config><source><running/></source></get-config></rpc>"#,
    )
    .await;
    assert!(reply.contains("<data><a><x>1</x></a></data>"), "{reply}");

    harness.stop().await;
}

#[tokio::test]
async fn lock_denied_across_connections() {
    let harness = start_server().await;
    let mut first = harness.connect().await;
    let mut second = harness.connect().await;

    let reply = call(
        &mut first,
        "<rpc><lock><target><candidate/></target></lock></rpc>",
    )
    .await;
    assert!(reply.contains("<ok/>"), "{reply}");

    let reply = call(
        &mut second,
        r#"<rpc><edit-config><target><candidate/></target>
           <config><a><x>2</x></a></config></edit-config></rpc>"#,
    )
    .await;
    assert!(reply.contains("lock-denied"), "{reply}");
    assert!(reply.contains("<session-id>"), "{reply}");

    // Closing the holder frees the lock for the second session.
    let reply = call(&mut first, "<rpc><close-session/></rpc>").await;
    assert!(reply.contains("<ok/>"));
    let reply = call(
        &mut second,
        "<rpc><lock><target><candidate/></target></lock></rpc>",
    )
    .await;
    assert!(reply.contains("<ok/>"), "{reply}");

    harness.stop().await;
}

#[tokio::test]
async fn invalid_edit_rejected_over_the_wire() {
    let harness = start_server().await;
    let mut client = harness.connect().await;

    call(
        &mut client,
        r#"<rpc><edit-config><target><candidate/></target>
           <config><a><x>999</x></a></config></edit-config></rpc>"#,
    )
    .await;
    let reply = call(&mut client, "<rpc><commit/></rpc>").await;
    assert!(reply.contains("invalid-value"), "{reply}");

    let reply = call(
        &mut client,
        r#"<rpc><get-config><source><running/></source></get-config></rpc>"#,
    )
    .await;
    assert!(reply.contains("<data/>"), "{reply}");

    harness.stop().await;
}

#[tokio::test]
async fn subscription_pushes_commit_notification() {
    let harness = start_server().await;
    let mut watcher = harness.connect().await;
    let mut editor = harness.connect().await;

    let reply = call(
        &mut watcher,
        "<rpc><create-subscription><stream>NETCONF</stream></create-subscription></rpc>",
    )
    .await;
    assert!(reply.contains("<ok/>"), "{reply}");

    call(
        &mut editor,
        r#"<rpc><edit-config><target><candidate/></target>
           <config><a><x>3</x></a></config></edit-config></rpc>"#,
    )
    .await;
    call(&mut editor, "<rpc><commit/></rpc>").await;

    let frame = tokio::time::timeout(Duration::from_secs(2), read_frame(&mut watcher))
        .await
        .expect("notification within deadline")
        .unwrap()
        .expect("stream open");
    assert!(frame.contains("<netconf-config-change>"), "{frame}");
    assert!(frame.contains("<datastore>running</datastore>"), "{frame}");

    harness.stop().await;
}

#[tokio::test]
async fn malformed_frame_gets_error_not_disconnect() {
    let harness = start_server().await;
    let mut client = harness.connect().await;

    let reply = call(&mut client, "<<<definitely not xml>>>").await;
    assert!(reply.contains("malformed-message"), "{reply}");

    // The connection is still usable.
    let reply = call(&mut client, "<rpc><get/></rpc>").await;
    assert!(reply.contains("<data>"), "{reply}");

    harness.stop().await;
}

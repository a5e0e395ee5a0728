//! The framed-socket server: one accept loop, one primary worker that
//! serializes every datastore mutation, and per-connection reader/writer
//! tasks.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use confsmith_engine::{Credentials, EngineError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::{mpsc, oneshot, watch};

use crate::dispatch::{handle_rpc, ServerState};
use crate::error::ServerError;
use crate::frame::{read_frame, write_frame};

/// RPC transport selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketFamily {
    Unix,
    Ipv4,
    Ipv6,
}

impl SocketFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unix => "unix",
            Self::Ipv4 => "ipv4",
            Self::Ipv6 => "ipv6",
        }
    }
}

impl fmt::Display for SocketFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SocketFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unix" => Ok(Self::Unix),
            "ipv4" => Ok(Self::Ipv4),
            "ipv6" => Ok(Self::Ipv6),
            other => Err(format!(
                "unknown socket family '{other}': expected unix, ipv4 or ipv6"
            )),
        }
    }
}

/// Messages queued to a connection's writer task.
#[derive(Debug, Clone)]
pub enum Outbound {
    Frame(String),
    Close,
}

/// Work queued to the primary worker.
enum PrimaryMsg {
    Rpc {
        session: u32,
        text: String,
        reply: oneshot::Sender<(String, bool)>,
    },
    Disconnect {
        session: u32,
    },
}

enum Listener {
    Unix(UnixListener),
    Tcp(TcpListener),
}

impl Listener {
    async fn bind(family: SocketFamily, addr: &str) -> Result<Self, ServerError> {
        let map_err = |source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        };
        match family {
            SocketFamily::Unix => {
                // A stale socket file from a previous run would refuse the bind.
                let _ = std::fs::remove_file(addr);
                Ok(Self::Unix(UnixListener::bind(addr).map_err(map_err)?))
            }
            SocketFamily::Ipv4 | SocketFamily::Ipv6 => {
                Ok(Self::Tcp(TcpListener::bind(addr).await.map_err(map_err)?))
            }
        }
    }

    async fn accept(&self) -> std::io::Result<Box<dyn Stream>> {
        match self {
            Self::Unix(l) => {
                let (stream, _) = l.accept().await?;
                Ok(Box::new(stream))
            }
            Self::Tcp(l) => {
                let (stream, _) = l.accept().await?;
                stream.set_nodelay(true)?;
                Ok(Box::new(stream))
            }
        }
    }
}

trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> Stream for T {}

/// Runs the server until `shutdown` fires or the engine reports an
/// unrecoverable failure. All subscription workers are reaped on exit.
pub async fn serve(
    state: Arc<ServerState>,
    family: SocketFamily,
    addr: &str,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ServerError> {
    let listener = Listener::bind(family, addr).await?;
    tracing::info!(%family, addr, "rpc server listening");

    let (primary_tx, primary_rx) = mpsc::unbounded_channel::<PrimaryMsg>();
    let (fatal_tx, mut fatal_rx) = oneshot::channel::<EngineError>();
    let primary = tokio::spawn(primary_worker(Arc::clone(&state), primary_rx, fatal_tx));

    let result = loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("shutdown requested");
                break Ok(());
            }
            fatal = &mut fatal_rx => {
                match fatal {
                    Ok(e) => break Err(ServerError::Engine(e)),
                    Err(_) => break Ok(()),
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok(stream) => {
                        let state = Arc::clone(&state);
                        let primary_tx = primary_tx.clone();
                        tokio::spawn(handle_connection(state, stream, primary_tx));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }
        }
    };

    state.supervisor.shutdown_all();
    drop(primary_tx);
    primary.abort();
    result
}

/// The single worker that serializes every datastore mutation. A client
/// disconnect mid-request does not cancel the request: processing runs
/// to a terminal state and only the reply delivery is skipped.
async fn primary_worker(
    state: Arc<ServerState>,
    mut rx: mpsc::UnboundedReceiver<PrimaryMsg>,
    fatal_tx: oneshot::Sender<EngineError>,
) {
    while let Some(msg) = rx.recv().await {
        match msg {
            PrimaryMsg::Rpc {
                session,
                text,
                reply,
            } => {
                let outbound = state
                    .outbounds
                    .lock()
                    .expect("outbound table poisoned")
                    .get(&session)
                    .cloned();
                let Some(outbound) = outbound else {
                    // Session already torn down; drop the request.
                    continue;
                };
                match handle_rpc(&state, session, &text, &outbound) {
                    Ok(response) => {
                        let _ = reply.send(response);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "engine unrecoverable, stopping");
                        let _ = fatal_tx.send(e);
                        return;
                    }
                }
            }
            PrimaryMsg::Disconnect { session } => {
                state.teardown_session(session);
            }
        }
    }
}

/// One task per connection: reads frames FIFO, hands them to the primary
/// worker, and forwards replies (and subscription notifications) through
/// the writer half.
async fn handle_connection(
    state: Arc<ServerState>,
    stream: Box<dyn Stream>,
    primary_tx: mpsc::UnboundedSender<PrimaryMsg>,
) {
    let session = state
        .sessions
        .lock()
        .expect("session table poisoned")
        .open(Credentials::default());
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
    state
        .outbounds
        .lock()
        .expect("outbound table poisoned")
        .insert(session, out_tx.clone());

    let (mut read_half, mut write_half) = tokio::io::split(stream);
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            match msg {
                Outbound::Frame(frame) => {
                    if write_frame(&mut write_half, &frame).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => break,
            }
        }
    });

    loop {
        let text = match read_frame(&mut read_half).await {
            Ok(Some(text)) => text,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(session, error = %e, "connection read failed");
                break;
            }
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        if primary_tx
            .send(PrimaryMsg::Rpc {
                session,
                text,
                reply: reply_tx,
            })
            .is_err()
        {
            break;
        }
        match reply_rx.await {
            Ok((reply, close)) => {
                if out_tx.send(Outbound::Frame(reply)).is_err() {
                    break;
                }
                if close {
                    let _ = out_tx.send(Outbound::Close);
                    break;
                }
            }
            // The primary worker stopped; nothing more to serve.
            Err(_) => break,
        }
    }

    let _ = primary_tx.send(PrimaryMsg::Disconnect { session });
    drop(out_tx);
    let _ = writer.await;
    tracing::debug!(session, "connection finished");
}

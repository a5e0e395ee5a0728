//! # confsmith-server
//!
//! The RPC front of the backend: NETCONF-shaped request parsing and
//! dispatch, session and lock bookkeeping, subscription workers, and the
//! framed-socket server loop with its single primary worker.

pub mod dispatch;
pub mod error;
pub mod frame;
pub mod proto;
pub mod server;
pub mod session;
pub mod subscription;

pub use dispatch::{dispatch, handle_rpc, DispatchResult, ServerState};
pub use error::ServerError;
pub use proto::{parse_rpc, Reply, Request, RpcRequest};
pub use server::{serve, Outbound, SocketFamily};
pub use session::{Session, SessionTable};
pub use subscription::{
    Notification, StreamRegistry, SubscriptionId, SubscriptionSupervisor,
};

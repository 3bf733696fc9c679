//! # SockSync Engine
//!
//! Keeps variables, lists and functions synchronized between one
//! authoritative ("local") owner and any number of remote mirrors.
//!
//! This crate provides:
//! - `Socket`, the per-connection coordinator (registry, subscription bookkeeping, decoding)
//! - `Group`, the capability interface every synchronized entity implements
//! - `LocalVariable` / `RemoteVariable`: full-value replication
//! - `LocalList` / `RemoteList`: page-windowed replication with insert/delete/set deltas
//! - `LocalFunction` / `RemoteFunction`: call/return RPC, blocking or fire-and-forget
//! - `ConnectionHooks`, run once per accepted connection
//! - `Transport`, the only thing the engine needs from the underlying channel
//!
//! ## Architecture
//!
//! ```text
//! raw text -> Socket::receive -> Envelope::decode -> registry[(type, name)]
//!          -> Group::handle_func -> Dispatcher (func? subscribed? fields?) -> handler
//!          -> state change -> LocalCore::send_func -> Transport::send (one or all subscribers)
//! ```
//!
//! ## Key Invariants
//!
//! - The local side is always authoritative; remote writes stay in the remote cache
//! - A socket is in a group's subscriber set iff the group is in the socket's subscriber set
//! - Messages for one list reach each subscriber in mutation order
//! - No state lock is held across an outbound send
//! - Protocol mistakes are answered to the sender only and never change state

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod function;
mod group;
mod hooks;
mod list;
mod socket;
mod transport;
mod variable;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use function::{FunctionError, FunctionResult, LocalFunction, RemoteFunction};
pub use group::{Dispatcher, Group, LocalCore, LocalGroup, RemoteCore, SyncValue};
pub use hooks::{ConnectionHooks, HookId};
pub use list::{LocalList, PageCursor, RemoteList};
pub use socket::{Socket, SocketId};
pub use transport::{MemoryTransport, Transport};
pub use variable::{LocalVariable, RemoteVariable};

pub use socksync_protocol::{ErrorCode, GroupId, GroupType, Payload};

//! The capability interface shared by every synchronized entity.
//!
//! A group is a named, typed entity (variable, list or function). Every kind
//! is a table of receive handlers riding the same validation pipeline in
//! [`Dispatcher`], plus either a [`LocalCore`] (authoritative side, many
//! subscribers) or a [`RemoteCore`] (mirror side, one bound socket).

mod dispatch;
mod local;
mod remote;

pub use dispatch::Dispatcher;
pub use local::{LocalCore, LocalGroup};
pub use remote::RemoteCore;

use crate::socket::Socket;
use serde::de::DeserializeOwned;
use serde::Serialize;
use socksync_protocol::{Envelope, GroupId};
use std::sync::Arc;

/// A value that variables and lists can carry over the wire.
pub trait SyncValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> SyncValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// A synchronized entity addressed by `(type, name)`.
pub trait Group: Send + Sync {
    /// Routing key of the group.
    fn id(&self) -> &GroupId;

    /// Validates and dispatches one inbound message from `socket`.
    ///
    /// Failures are reported to `socket` only; this never panics or returns an error.
    fn handle_func(&self, envelope: &Envelope, socket: &Arc<Socket>);

    /// Sockets a broadcast goes to: every subscriber of a local group, or
    /// the bound socket of a remote group.
    fn sockets(&self) -> Vec<Arc<Socket>>;

    /// Returns true if `socket` may use subscription-gated functions.
    fn is_subscribed(&self, socket: &Socket) -> bool;

    /// Forgets `socket` as a subscriber. Remote groups ignore this.
    fn remove_subscriber(&self, _socket: &Socket) {}

    /// Marks a remote group unsubscribed without messaging the peer.
    fn reset_subscription(&self) {}

    /// Called when `socket` disconnects, after subscriptions were dropped.
    fn on_disconnect(&self, _socket: &Socket) {}
}

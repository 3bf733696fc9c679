//! Connection-level coordinator.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::group::Group;
use crate::hooks::ConnectionHooks;
use crate::transport::Transport;
use parking_lot::{Mutex, RwLock};
use socksync_protocol::{Control, Envelope, ErrorCode, GroupId};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(u64);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket-{}", self.0)
    }
}

/// One end of a connection.
///
/// A socket owns:
/// - the registry of groups it dispatches inbound messages to
/// - the ids of local groups the peer subscribed to (for cleanup)
/// - the ids of remote groups this side subscribed to (for state tracking)
pub struct Socket {
    id: SocketId,
    transport: Arc<dyn Transport>,
    config: EngineConfig,
    groups: RwLock<HashMap<GroupId, Arc<dyn Group>>>,
    subscriber_groups: Mutex<BTreeSet<GroupId>>,
    subscription_groups: Mutex<BTreeSet<GroupId>>,
}

impl Socket {
    /// Creates a socket over a transport with the default configuration.
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        Self::with_config(transport, EngineConfig::default())
    }

    /// Creates a socket with an explicit configuration.
    pub fn with_config(transport: Arc<dyn Transport>, config: EngineConfig) -> Arc<Self> {
        Arc::new(Self {
            id: SocketId(NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed)),
            transport,
            config,
            groups: RwLock::new(HashMap::new()),
            subscriber_groups: Mutex::new(BTreeSet::new()),
            subscription_groups: Mutex::new(BTreeSet::new()),
        })
    }

    /// Returns the socket id.
    pub fn id(&self) -> SocketId {
        self.id
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the underlying transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Runs the connection hooks. Call once, before the first `receive`.
    pub fn connect(self: &Arc<Self>, hooks: &ConnectionHooks) {
        debug!(socket = %self.id, hooks = hooks.len(), "connecting");
        hooks.run(self);
    }

    /// Registers a group for inbound dispatch.
    pub fn register_group(&self, group: Arc<dyn Group>) -> EngineResult<()> {
        let id = group.id().clone();
        let mut groups = self.groups.write();
        if groups.contains_key(&id) {
            return Err(EngineError::DuplicateGroup(id));
        }
        debug!(socket = %self.id, group = %id, "registered group");
        groups.insert(id, group);
        Ok(())
    }

    /// Removes a group and any subscription bookkeeping for it.
    pub fn unregister_group(&self, id: &GroupId) -> Option<Arc<dyn Group>> {
        let group = self.groups.write().remove(id)?;
        if self.subscriber_groups.lock().remove(id) {
            group.remove_subscriber(self);
        }
        if self.subscription_groups.lock().remove(id) {
            group.reset_subscription();
        }
        Some(group)
    }

    /// Looks up a registered group.
    pub fn group(&self, id: &GroupId) -> Option<Arc<dyn Group>> {
        self.groups.read().get(id).cloned()
    }

    /// Returns the number of registered groups.
    pub fn group_count(&self) -> usize {
        self.groups.read().len()
    }

    /// Returns true if this side is subscribed to the remote group `id`.
    pub fn subscribed(&self, id: &GroupId) -> bool {
        self.subscription_groups.lock().contains(id)
    }

    /// Returns true if the peer is subscribed to the local group `id`.
    pub fn is_subscriber_of(&self, id: &GroupId) -> bool {
        self.subscriber_groups.lock().contains(id)
    }

    pub(crate) fn add_subscriber_group(&self, id: &GroupId) {
        self.subscriber_groups.lock().insert(id.clone());
    }

    pub(crate) fn remove_subscriber_group(&self, id: &GroupId) {
        self.subscriber_groups.lock().remove(id);
    }

    pub(crate) fn add_subscription(&self, id: &GroupId) {
        self.subscription_groups.lock().insert(id.clone());
    }

    pub(crate) fn remove_subscription(&self, id: &GroupId) {
        self.subscription_groups.lock().remove(id);
    }

    /// Handles one inbound text frame.
    ///
    /// Never fails: every problem is reported to the peer as an `error` frame.
    pub fn receive(self: &Arc<Self>, text: &str) {
        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => return self.report(&e.into()),
        };

        if let Some(control) = envelope.control() {
            match control {
                Control::Error(error) => {
                    debug!(socket = %self.id, code = %error.error_code, message = %error.message, "peer reported error");
                }
                Control::UnsubscribeAll => self.remove_all_subscribers(),
            }
            return;
        }

        let id = match envelope.target() {
            Ok(id) => id,
            Err(e) => return self.report(&e.into()),
        };
        let Some(group) = self.group(&id) else {
            return self.report(&EngineError::UnknownGroup(id));
        };
        group.handle_func(&envelope, self);
    }

    /// Drops every remote subscription this side holds and tells the peer.
    pub fn unsubscribe_all(&self) -> EngineResult<()> {
        self.send(&Envelope::unsubscribe_all())?;
        self.reset_subscriptions();
        Ok(())
    }

    /// Removes this socket from every local group it is subscribed to.
    pub fn remove_all_subscribers(&self) {
        let ids = std::mem::take(&mut *self.subscriber_groups.lock());
        for id in ids {
            if let Some(group) = self.group(&id) {
                group.remove_subscriber(self);
            }
        }
    }

    fn reset_subscriptions(&self) {
        let ids = std::mem::take(&mut *self.subscription_groups.lock());
        for id in ids {
            if let Some(group) = self.group(&id) {
                group.reset_subscription();
            }
        }
    }

    /// Tears down all bookkeeping after the connection closed.
    ///
    /// No further state change is pushed to this socket and pending blocking
    /// calls fail with [`EngineError::Disconnected`]. Groups may be registered
    /// again afterwards.
    pub fn disconnect(&self, code: Option<u16>) {
        debug!(socket = %self.id, ?code, "disconnecting");
        self.remove_all_subscribers();
        self.reset_subscriptions();
        let groups: Vec<Arc<dyn Group>> = self.groups.write().drain().map(|(_, g)| g).collect();
        for group in groups {
            group.on_disconnect(self);
        }
    }

    /// Encodes and sends one message.
    pub fn send(&self, envelope: &Envelope) -> EngineResult<()> {
        let text = envelope.encode()?;
        self.transport.send(&text)
    }

    /// Sends an `error` frame. Failures are logged and dropped.
    pub fn send_error(&self, code: ErrorCode, message: impl Into<String>) {
        let message = message.into();
        warn!(socket = %self.id, %code, %message, "reporting error to peer");
        if let Err(e) = self.send(&Envelope::error(code, message)) {
            warn!(socket = %self.id, error = %e, "failed to send error frame");
        }
    }

    pub(crate) fn report(&self, error: &EngineError) {
        self.send_error(error.error_code(), error.to_string());
    }
}

impl PartialEq for Socket {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Socket {}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.id)
            .field("groups", &self.group_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use crate::variable::{LocalVariable, RemoteVariable};
    use serde_json::{json, Value};

    fn socket() -> (Arc<Socket>, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::new());
        (Socket::new(transport.clone()), transport)
    }

    fn last_error_code(transport: &MemoryTransport) -> u64 {
        let frame = transport.last_json().unwrap();
        assert_eq!(frame["func"], json!("error"));
        assert_eq!(frame.as_object().unwrap().len(), 3);
        frame["error_code"].as_u64().unwrap()
    }

    #[test]
    fn invalid_json() {
        let (socket, transport) = socket();
        socket.receive("");
        assert_eq!(last_error_code(&transport), ErrorCode::InvalidJson as u64);
        socket.receive("{{ i am in} valid:");
        assert_eq!(last_error_code(&transport), ErrorCode::InvalidJson as u64);
        assert_eq!(transport.len(), 2);
    }

    #[test]
    fn missing_func() {
        let (socket, transport) = socket();
        socket.receive("{}");
        assert_eq!(last_error_code(&transport), ErrorCode::InvalidFunc as u64);
    }

    #[test]
    fn missing_or_invalid_type() {
        let (socket, transport) = socket();
        socket.receive(r#"{"func":"invalid"}"#);
        assert_eq!(last_error_code(&transport), ErrorCode::InvalidType as u64);
        socket.receive(r#"{"func":"subscribe","name":"a"}"#);
        assert_eq!(last_error_code(&transport), ErrorCode::InvalidType as u64);
        socket.receive(r#"{"func":"subscribe","type":"invalid","name":"a"}"#);
        assert_eq!(last_error_code(&transport), ErrorCode::InvalidType as u64);
    }

    #[test]
    fn missing_or_unknown_name() {
        let (socket, transport) = socket();
        socket.receive(r#"{"func":"subscribe","type":"var"}"#);
        assert_eq!(last_error_code(&transport), ErrorCode::InvalidName as u64);
        socket.receive(r#"{"func":"subscribe","type":"var","name":"missing"}"#);
        assert_eq!(last_error_code(&transport), ErrorCode::InvalidName as u64);
    }

    #[test]
    fn error_frames_are_ignored() {
        let (socket, transport) = socket();
        socket.receive(r#"{"func":"error","error_code":0,"message":"error"}"#);
        assert!(transport.is_empty());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let (socket, _) = socket();
        socket.register_group(LocalVariable::new("a", json!(1))).unwrap();
        let err = socket
            .register_group(LocalVariable::new("a", json!(2)))
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateGroup(_)));
        assert_eq!(socket.group_count(), 1);
    }

    #[test]
    fn subscriber_bookkeeping_is_symmetric() {
        let (socket, transport) = socket();
        let var = LocalVariable::new("a", json!(1));
        socket.register_group(var.clone()).unwrap();

        socket.receive(r#"{"func":"subscribe","type":"var","name":"a"}"#);
        assert!(transport.is_empty());
        assert!(socket.is_subscriber_of(var.id()));
        assert_eq!(var.subscriber_count(), 1);

        socket.receive(r#"{"func":"unsubscribe_all"}"#);
        assert!(transport.is_empty());
        assert!(!socket.is_subscriber_of(var.id()));
        assert_eq!(var.subscriber_count(), 0);
    }

    #[test]
    fn unsubscribe_all_resets_remote_groups() {
        let (socket, transport) = socket();
        let a = RemoteVariable::<Value>::new("a", &socket, true).unwrap();
        let b = RemoteVariable::<Value>::new("b", &socket, true).unwrap();
        transport.clear();

        socket.unsubscribe_all().unwrap();
        assert_eq!(transport.len(), 1);
        assert_eq!(transport.last_json().unwrap(), json!({"func": "unsubscribe_all"}));
        assert!(!a.is_subscribed());
        assert!(!b.is_subscribed());
        assert!(!socket.subscribed(a.id()));
    }

    #[test]
    fn disconnect_clears_registry() {
        let (socket, transport) = socket();
        let var = LocalVariable::new("g", json!(0));
        socket.register_group(var.clone()).unwrap();
        socket.receive(r#"{"func":"subscribe","type":"var","name":"g"}"#);

        socket.disconnect(None);
        assert_eq!(var.subscriber_count(), 0);
        assert_eq!(socket.group_count(), 0);

        socket.receive(r#"{"func":"subscribe","type":"var","name":"g"}"#);
        assert_eq!(last_error_code(&transport), ErrorCode::InvalidName as u64);

        transport.clear();
        socket.register_group(var.clone()).unwrap();
        socket.receive(r#"{"func":"subscribe","type":"var","name":"g"}"#);
        assert!(transport.is_empty());
        assert_eq!(var.subscriber_count(), 1);
    }

    #[test]
    fn unregister_drops_subscriber() {
        let (socket, _) = socket();
        let var = LocalVariable::new("g", json!(0));
        socket.register_group(var.clone()).unwrap();
        socket.receive(r#"{"func":"subscribe","type":"var","name":"g"}"#);

        assert!(socket.unregister_group(var.id()).is_some());
        assert_eq!(var.subscriber_count(), 0);
        assert!(!socket.is_subscriber_of(var.id()));
        assert!(socket.unregister_group(var.id()).is_none());
    }
}

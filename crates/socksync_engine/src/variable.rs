//! Full-value replication of a single value.

use crate::error::{EngineError, EngineResult};
use crate::group::{Dispatcher, Group, LocalCore, LocalGroup, RemoteCore, SyncValue};
use crate::socket::Socket;
use parking_lot::Mutex;
use serde_json::Value;
use socksync_protocol::{Envelope, GroupId, VarGet, VarSet};
use std::sync::Arc;

/// A variable owned by this side.
///
/// Subscribers receive `set {value}` on `get` and after every mutation.
pub struct LocalVariable<T = Value> {
    core: LocalCore,
    dispatcher: Dispatcher<LocalVariable<T>>,
    value: Mutex<T>,
}

impl<T: SyncValue> LocalVariable<T> {
    /// Creates a variable holding `value`.
    pub fn new(name: impl Into<String>, value: T) -> Arc<Self> {
        let core = LocalCore::new(GroupId::var(name));
        let dispatcher = core
            .dispatcher::<Self>()
            .register_receive::<VarGet>(true, |var, _, socket| var.send_value(Some(socket)));
        Arc::new(Self {
            core,
            dispatcher,
            value: Mutex::new(value),
        })
    }

    /// Returns the group id.
    pub fn id(&self) -> &GroupId {
        self.core.id()
    }

    /// Returns a copy of the current value.
    pub fn value(&self) -> T {
        self.value.lock().clone()
    }

    /// Replaces the value and pushes it to every subscriber.
    pub fn set_value(&self, value: T) -> EngineResult<()> {
        let _order = self.core.sequence();
        *self.value.lock() = value;
        self.send_value(None)
    }

    /// Mutates the value in place and pushes the result to every subscriber.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> EngineResult<()> {
        let _order = self.core.sequence();
        f(&mut *self.value.lock());
        self.send_value(None)
    }

    /// Returns the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.core.subscriber_count()
    }

    /// Returns the current subscribers.
    pub fn subscribers(&self) -> Vec<Arc<Socket>> {
        self.core.subscribers()
    }

    fn send_value(&self, target: Option<&Arc<Socket>>) -> EngineResult<()> {
        let _order = self.core.sequence();
        let value = serde_json::to_value(&*self.value.lock()).map_err(EngineError::invalid_value)?;
        let envelope = Envelope::from_args(self.core.id(), &VarSet { value })?;
        self.core.send_json(&envelope, target);
        Ok(())
    }
}

impl<T: SyncValue> Group for LocalVariable<T> {
    fn id(&self) -> &GroupId {
        self.core.id()
    }

    fn handle_func(&self, envelope: &Envelope, socket: &Arc<Socket>) {
        self.dispatcher.handle_func(self, envelope, socket);
    }

    fn sockets(&self) -> Vec<Arc<Socket>> {
        self.core.subscribers()
    }

    fn is_subscribed(&self, socket: &Socket) -> bool {
        self.core.is_subscribed(socket)
    }

    fn remove_subscriber(&self, socket: &Socket) {
        self.drop_subscriber(socket);
    }
}

impl<T: SyncValue> LocalGroup for LocalVariable<T> {
    fn local(&self) -> &LocalCore {
        &self.core
    }
}

/// A cached mirror of a variable owned by the peer.
///
/// The cache is empty until the first `set` arrives.
pub struct RemoteVariable<T = Value> {
    core: RemoteCore,
    dispatcher: Dispatcher<RemoteVariable<T>>,
    value: Mutex<Option<T>>,
}

impl<T: SyncValue> RemoteVariable<T> {
    /// Binds a mirror of the peer's variable `name` to `socket`.
    ///
    /// With `subscribe` set, subscribes and requests the current value.
    pub fn new(name: impl Into<String>, socket: &Arc<Socket>, subscribe: bool) -> EngineResult<Arc<Self>> {
        let core = RemoteCore::new(GroupId::var(name), socket);
        let dispatcher = Dispatcher::new().register_receive::<VarSet>(true, |var: &Self, args, _| {
            let value = serde_json::from_value(args.value).map_err(EngineError::invalid_value)?;
            *var.value.lock() = Some(value);
            Ok(())
        });
        let var = Arc::new(Self {
            core,
            dispatcher,
            value: Mutex::new(None),
        });
        var.core.attach(Arc::clone(&var), subscribe, Self::get)
    }

    /// Returns the group id.
    pub fn id(&self) -> &GroupId {
        self.core.id()
    }

    /// Returns the cached value.
    pub fn value(&self) -> Option<T> {
        self.value.lock().clone()
    }

    /// Overwrites the cache. The peer is not told.
    pub fn set_local(&self, value: T) {
        *self.value.lock() = Some(value);
    }

    /// Asks the peer for the current value.
    pub fn get(&self) -> EngineResult<()> {
        self.core.send(&VarGet {})
    }

    /// Subscribes to the peer's variable.
    pub fn subscribe(&self) -> EngineResult<()> {
        self.core.subscribe()
    }

    /// Unsubscribes from the peer's variable.
    pub fn unsubscribe(&self) -> EngineResult<()> {
        self.core.unsubscribe()
    }

    /// Returns true while subscribed.
    pub fn is_subscribed(&self) -> bool {
        self.core.subscribed()
    }
}

impl<T: SyncValue> Group for RemoteVariable<T> {
    fn id(&self) -> &GroupId {
        self.core.id()
    }

    fn handle_func(&self, envelope: &Envelope, socket: &Arc<Socket>) {
        self.dispatcher.handle_func(self, envelope, socket);
    }

    fn sockets(&self) -> Vec<Arc<Socket>> {
        vec![Arc::clone(self.core.socket())]
    }

    fn is_subscribed(&self, socket: &Socket) -> bool {
        self.core.is_subscribed(socket)
    }

    fn reset_subscription(&self) {
        self.core.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use socksync_protocol::ErrorCode;
    use serde_json::json;

    fn socket() -> (Arc<Socket>, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::new());
        (Socket::new(transport.clone()), transport)
    }

    fn subscribed(var: &Arc<LocalVariable<i64>>) -> (Arc<Socket>, Arc<MemoryTransport>) {
        let (socket, transport) = socket();
        socket.register_group(var.clone()).unwrap();
        socket.receive(r#"{"func":"subscribe","type":"var","name":"x"}"#);
        assert!(transport.is_empty());
        (socket, transport)
    }

    #[test]
    fn get_replies_with_value() {
        let var = LocalVariable::new("x", 10i64);
        let (socket, transport) = subscribed(&var);

        socket.receive(r#"{"func":"get","type":"var","name":"x"}"#);
        assert_eq!(transport.len(), 1);
        assert_eq!(
            transport.last_json().unwrap(),
            json!({"func": "set", "type": "var", "name": "x", "value": 10})
        );
    }

    #[test]
    fn set_value_broadcasts_to_subscribers_only() {
        let var = LocalVariable::new("x", 10i64);
        let (_first, first) = subscribed(&var);
        let (_second, second) = subscribed(&var);
        let (outsider, outsider_transport) = socket();
        outsider.register_group(var.clone()).unwrap();

        var.set_value(20).unwrap();
        for transport in [&first, &second] {
            assert_eq!(transport.len(), 1);
            assert_eq!(transport.last_json().unwrap()["value"], json!(20));
        }
        assert!(outsider_transport.is_empty());
        assert_eq!(var.value(), 20);

        var.update(|v| *v += 1).unwrap();
        assert_eq!(first.last_json().unwrap()["value"], json!(21));
    }

    #[test]
    fn get_requires_subscription() {
        let var = LocalVariable::new("x", 10i64);
        let (socket, transport) = socket();
        socket.register_group(var.clone()).unwrap();

        socket.receive(r#"{"func":"get","type":"var","name":"x"}"#);
        assert_eq!(transport.len(), 1);
        assert_eq!(
            transport.last_json().unwrap()["error_code"],
            json!(ErrorCode::InvalidFunc as u8)
        );
    }

    #[test]
    fn unsubscribe_stops_broadcasts() {
        let var = LocalVariable::new("x", 1i64);
        let (socket, transport) = subscribed(&var);
        socket.receive(r#"{"func":"unsubscribe","type":"var","name":"x"}"#);
        assert_eq!(var.subscriber_count(), 0);

        var.set_value(2).unwrap();
        assert!(transport.is_empty());

        socket.receive(r#"{"func":"unsubscribe","type":"var","name":"x"}"#);
        assert_eq!(
            transport.last_json().unwrap()["error_code"],
            json!(ErrorCode::InvalidFunc as u8)
        );
    }

    #[test]
    fn remote_primes_cache_on_subscribe() {
        let (socket, transport) = socket();
        let var = RemoteVariable::<i64>::new("x", &socket, true).unwrap();
        let frames = transport.json_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["func"], json!("subscribe"));
        assert_eq!(frames[1], json!({"func": "get", "type": "var", "name": "x"}));
        assert!(var.is_subscribed());
        assert_eq!(var.value(), None);

        socket.receive(r#"{"func":"set","type":"var","name":"x","value":5}"#);
        assert_eq!(var.value(), Some(5));
        assert_eq!(transport.len(), 2);
    }

    #[test]
    fn remote_set_requires_subscription() {
        let (socket, transport) = socket();
        let var = RemoteVariable::<i64>::new("x", &socket, false).unwrap();
        assert!(transport.is_empty());

        socket.receive(r#"{"func":"set","type":"var","name":"x","value":5}"#);
        assert_eq!(var.value(), None);
        assert_eq!(
            transport.last_json().unwrap()["error_code"],
            json!(ErrorCode::InvalidFunc as u8)
        );
    }

    #[test]
    fn remote_rejects_mistyped_value() {
        let (socket, transport) = socket();
        let var = RemoteVariable::<i64>::new("x", &socket, true).unwrap();
        transport.clear();

        socket.receive(r#"{"func":"set","type":"var","name":"x","value":"five"}"#);
        assert_eq!(var.value(), None);
        assert_eq!(
            transport.last_json().unwrap()["error_code"],
            json!(ErrorCode::Other as u8)
        );

        socket.receive(r#"{"func":"set","type":"var","name":"x"}"#);
        assert_eq!(
            transport.last_json().unwrap()["error_code"],
            json!(ErrorCode::MissingField as u8)
        );
    }

    #[test]
    fn remote_writes_stay_local() {
        let (socket, transport) = socket();
        let var = RemoteVariable::<Value>::new("x", &socket, false).unwrap();
        var.set_local(json!("mine"));
        assert_eq!(var.value(), Some(json!("mine")));
        assert!(transport.is_empty());
    }

    #[test]
    fn remote_names_are_unique_per_socket() {
        let (socket, _) = socket();
        let _var = RemoteVariable::<Value>::new("x", &socket, false).unwrap();
        assert!(matches!(
            RemoteVariable::<Value>::new("x", &socket, false),
            Err(EngineError::DuplicateGroup(_))
        ));
    }
}

use super::pending::PendingCalls;
use crate::error::{EngineError, EngineResult};
use crate::group::{Dispatcher, Group, RemoteCore};
use crate::socket::Socket;
use serde::Serialize;
use serde_json::Value;
use socksync_protocol::{Call, Envelope, GroupId, Payload, Return};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// A handle for calling a function the peer owns.
///
/// Receives `return`; answers `call` with `INVALID_FUNC` because it cannot
/// be called itself.
pub struct RemoteFunction {
    core: RemoteCore,
    dispatcher: Dispatcher<RemoteFunction>,
    pending: PendingCalls,
}

impl RemoteFunction {
    /// Binds the peer's function `name` to `socket`, subscribing if asked.
    pub fn new(name: impl Into<String>, socket: &Arc<Socket>, subscribe: bool) -> EngineResult<Arc<Self>> {
        Self::attach(RemoteCore::new(GroupId::function(name), socket), subscribe)
    }

    /// Binds a call-only stub that never subscribes.
    ///
    /// The stub is live while the transport is connected. The owner must
    /// accept calls from non-subscribers, as [`LocalFunction::open`] does.
    ///
    /// [`LocalFunction::open`]: super::LocalFunction::open
    pub fn stub(name: impl Into<String>, socket: &Arc<Socket>) -> EngineResult<Arc<Self>> {
        Self::attach(RemoteCore::unsubscribable(GroupId::function(name), socket), false)
    }

    fn attach(core: RemoteCore, subscribe: bool) -> EngineResult<Arc<Self>> {
        let dispatcher = Dispatcher::new()
            .register_receive::<Return>(false, |function: &Self, args, _| {
                function.pending.resolve(&args.id, args.value)
            })
            .register_receive::<Call>(false, |function: &Self, _, _| {
                Err(EngineError::NotCallable(function.core.id().clone()))
            });
        let function = Arc::new(Self {
            core,
            dispatcher,
            pending: PendingCalls::new(),
        });
        function.core.attach(Arc::clone(&function), subscribe, |_| Ok(()))
    }

    /// Returns the group id.
    pub fn id(&self) -> &GroupId {
        self.core.id()
    }

    /// Calls the function and blocks until it returns.
    ///
    /// Returns `Ok(None)` without sending anything while the group is not
    /// live. Fails with [`EngineError::Timeout`] once the socket's call
    /// timeout elapses and with [`EngineError::Disconnected`] if the socket
    /// goes away first.
    pub fn call(&self, args: Payload) -> EngineResult<Option<Value>> {
        if !self.core.is_live() {
            debug!(group = %self.core.id(), "call skipped, not live");
            return Ok(None);
        }
        let id = Uuid::new_v4().to_string();
        let slot = self.pending.register(&id);
        if let Err(e) = self.core.send(&Call {
            id: id.clone(),
            args,
        }) {
            self.pending.forget(&id);
            return Err(e);
        }
        let timeout = self.core.socket().config().call_timeout;
        self.pending.wait(&id, &slot, timeout).map(Some)
    }

    /// Like [`RemoteFunction::call`], taking any value that serializes to an object.
    pub fn call_with<A: Serialize>(&self, args: &A) -> EngineResult<Option<Value>> {
        match serde_json::to_value(args).map_err(EngineError::invalid_value)? {
            Value::Object(args) => self.call(args),
            other => Err(EngineError::InvalidValue(format!(
                "call arguments must be an object, got {other}"
            ))),
        }
    }

    /// Sends `call` without waiting; the return is discarded.
    ///
    /// Returns how many calls were sent: zero while the group is not live.
    pub fn call_all(&self, args: Payload) -> EngineResult<usize> {
        if !self.core.is_live() {
            return Ok(0);
        }
        let id = Uuid::new_v4().to_string();
        let ttl = self.core.socket().config().call_timeout;
        self.pending.ignore(&id, ttl);
        if let Err(e) = self.core.send(&Call {
            id: id.clone(),
            args,
        }) {
            self.pending.forget(&id);
            return Err(e);
        }
        Ok(1)
    }

    /// Returns the number of blocking calls awaiting a return.
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    /// Subscribes to the peer's function.
    pub fn subscribe(&self) -> EngineResult<()> {
        self.core.subscribe()
    }

    /// Unsubscribes from the peer's function.
    pub fn unsubscribe(&self) -> EngineResult<()> {
        self.core.unsubscribe()
    }

    /// Returns true while subscribed.
    pub fn is_subscribed(&self) -> bool {
        self.core.subscribed()
    }
}

impl Group for RemoteFunction {
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

    fn on_disconnect(&self, _socket: &Socket) {
        self.pending.cancel_all();
    }
}

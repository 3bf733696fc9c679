use super::{FunctionError, FunctionResult};
use crate::error::{EngineError, EngineResult};
use crate::group::{Dispatcher, Group, LocalCore, LocalGroup};
use crate::socket::Socket;
use socksync_protocol::{Call, Envelope, ErrorCode, GroupId, Payload, Return};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

type Callable = Arc<dyn Fn(Payload) -> FunctionResult + Send + Sync>;

/// A function this side executes on behalf of subscribers.
///
/// Every `call` runs on its own thread, so a slow callable never holds up
/// the connection that delivered it. The `return` goes to the caller only.
pub struct LocalFunction {
    core: LocalCore,
    dispatcher: Dispatcher<LocalFunction>,
    callable: Callable,
}

impl LocalFunction {
    /// Creates a function backed by `callable`. Only subscribers may call it.
    pub fn new(
        name: impl Into<String>,
        callable: impl Fn(Payload) -> FunctionResult + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::build(LocalCore::new(GroupId::function(name)), Arc::new(callable))
    }

    /// Creates a function anyone on the socket may call without subscribing.
    ///
    /// This is the owner a [`RemoteFunction::stub`](super::RemoteFunction::stub)
    /// talks to. `subscribe` and `unsubscribe` answer `INVALID_FUNC`.
    pub fn open(
        name: impl Into<String>,
        callable: impl Fn(Payload) -> FunctionResult + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::build(LocalCore::unsubscribable(GroupId::function(name)), Arc::new(callable))
    }

    fn build(core: LocalCore, callable: Callable) -> Arc<Self> {
        let requires_subscription = core.is_subscribable();
        let dispatcher = core
            .dispatcher::<Self>()
            .register_receive::<Call>(requires_subscription, |function, call, socket| {
                function.spawn(call, socket)
            });
        Arc::new(Self {
            core,
            dispatcher,
            callable,
        })
    }

    /// Returns the group id.
    pub fn id(&self) -> &GroupId {
        self.core.id()
    }

    /// Runs the callable on the current thread.
    pub fn invoke(&self, args: Payload) -> FunctionResult {
        run(&self.callable, args)
    }

    /// Returns the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.core.subscriber_count()
    }

    fn spawn(&self, call: Call, socket: &Arc<Socket>) -> EngineResult<()> {
        let callable = Arc::clone(&self.callable);
        let group = self.core.id().clone();
        let socket = Arc::clone(socket);
        thread::Builder::new()
            .name(format!("socksync-call-{}", group.name))
            .spawn(move || {
                let Call { id, args } = call;
                match run(&callable, args) {
                    Ok(value) => reply(&socket, &group, id, value),
                    Err(e) => socket.send_error(ErrorCode::Other, e.to_string()),
                }
            })
            .map_err(|e| EngineError::Callback(e.to_string()))?;
        Ok(())
    }
}

fn run(callable: &Callable, args: Payload) -> FunctionResult {
    catch_unwind(AssertUnwindSafe(|| callable(args))).unwrap_or_else(|panic| {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "function panicked".to_string());
        Err(FunctionError::from(message))
    })
}

fn reply(socket: &Socket, group: &GroupId, id: String, value: serde_json::Value) {
    let envelope = match Envelope::from_args(group, &Return { id, value }) {
        Ok(envelope) => envelope,
        Err(e) => return socket.send_error(ErrorCode::Other, e.to_string()),
    };
    // A caller that went away is not an error.
    match socket.send(&envelope) {
        Ok(()) => debug!(socket = %socket.id(), group = %group, "returned"),
        Err(e) => warn!(socket = %socket.id(), group = %group, error = %e, "dropped return"),
    }
}

impl Group for LocalFunction {
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

impl LocalGroup for LocalFunction {
    fn local(&self) -> &LocalCore {
        &self.core
    }
}

impl std::fmt::Debug for LocalFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFunction")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use serde_json::{json, Value};
    use std::sync::mpsc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn subscribed(function: &Arc<LocalFunction>) -> (Arc<Socket>, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::new());
        let socket = Socket::new(transport.clone());
        socket.register_group(function.clone()).unwrap();
        socket.receive(r#"{"func":"subscribe","type":"function","name":"f"}"#);
        (socket, transport)
    }

    #[test]
    fn call_returns_to_caller() {
        let function = LocalFunction::new("f", |args| Ok(json!(args["arg1"].as_i64().unwrap_or(0) + 1)));
        let (socket, transport) = subscribed(&function);

        socket.receive(r#"{"func":"call","type":"function","name":"f","id":"c1","args":{"arg1":41}}"#);
        assert!(transport.wait_for(1, WAIT));
        assert_eq!(
            transport.last_json().unwrap(),
            json!({"func": "return", "type": "function", "name": "f", "id": "c1", "value": 42})
        );
    }

    #[test]
    fn args_default_to_empty() {
        let function = LocalFunction::new("f", |args| Ok(json!(args.len())));
        let (socket, transport) = subscribed(&function);
        socket.receive(r#"{"func":"call","type":"function","name":"f","id":"c1"}"#);
        assert!(transport.wait_for(1, WAIT));
        assert_eq!(transport.last_json().unwrap()["value"], json!(0));
    }

    #[test]
    fn failures_become_other() {
        let function = LocalFunction::new("f", |_| Err("no luck".into()));
        let (socket, transport) = subscribed(&function);
        socket.receive(r#"{"func":"call","type":"function","name":"f","id":"c1"}"#);
        assert!(transport.wait_for(1, WAIT));
        let frame = transport.last_json().unwrap();
        assert_eq!(frame["error_code"], json!(ErrorCode::Other as u8));
        assert_eq!(frame["message"], json!("no luck"));
    }

    #[test]
    fn panics_become_other() {
        let function = LocalFunction::new("f", |_| panic!("kaboom"));
        let (socket, transport) = subscribed(&function);
        socket.receive(r#"{"func":"call","type":"function","name":"f","id":"c1"}"#);
        assert!(transport.wait_for(1, WAIT));
        assert_eq!(transport.last_json().unwrap()["message"], json!("kaboom"));

        let err = function.invoke(Payload::new()).unwrap_err();
        assert_eq!(err.to_string(), "kaboom");
    }

    #[test]
    fn slow_callee_does_not_block_dispatch() {
        let (release, gate) = mpsc::channel::<()>();
        let gate = parking_lot::Mutex::new(gate);
        let function = LocalFunction::new("f", move |_| {
            let _ = gate.lock().recv_timeout(WAIT);
            Ok(Value::Null)
        });
        let (socket, transport) = subscribed(&function);

        socket.receive(r#"{"func":"call","type":"function","name":"f","id":"slow"}"#);
        socket.receive(r#"{"func":"unknown","type":"function","name":"f"}"#);
        assert_eq!(transport.len(), 1, "dispatch answered while the call was running");

        release.send(()).unwrap();
        assert!(transport.wait_for(2, WAIT));
        assert_eq!(transport.last_json().unwrap()["id"], json!("slow"));
    }

    #[test]
    fn call_requires_subscription_and_id() {
        let function = LocalFunction::new("f", |_| Ok(Value::Null));
        let transport = Arc::new(MemoryTransport::new());
        let socket = Socket::new(transport.clone());
        socket.register_group(function.clone()).unwrap();

        socket.receive(r#"{"func":"call","type":"function","name":"f","id":"c1"}"#);
        assert_eq!(
            transport.last_json().unwrap()["error_code"],
            json!(ErrorCode::InvalidFunc as u8)
        );

        socket.receive(r#"{"func":"subscribe","type":"function","name":"f"}"#);
        socket.receive(r#"{"func":"call","type":"function","name":"f"}"#);
        assert_eq!(
            transport.last_json().unwrap()["error_code"],
            json!(ErrorCode::MissingField as u8)
        );
        assert_eq!(transport.len(), 2);
    }

    #[test]
    fn open_function_serves_non_subscribers() {
        let function = LocalFunction::open("f", |_| Ok(json!("ok")));
        let transport = Arc::new(MemoryTransport::new());
        let socket = Socket::new(transport.clone());
        socket.register_group(function.clone()).unwrap();

        socket.receive(r#"{"func":"subscribe","type":"function","name":"f"}"#);
        assert_eq!(
            transport.last_json().unwrap()["error_code"],
            json!(ErrorCode::InvalidFunc as u8)
        );
        assert_eq!(function.subscriber_count(), 0);

        transport.clear();
        socket.receive(r#"{"func":"call","type":"function","name":"f","id":"c1"}"#);
        assert!(transport.wait_for(1, WAIT));
        assert_eq!(
            transport.last_json().unwrap(),
            json!({"func": "return", "type": "function", "name": "f", "id": "c1", "value": "ok"})
        );
    }
}

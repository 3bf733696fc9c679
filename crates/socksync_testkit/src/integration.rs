//! Cross-crate integration test helpers.
//!
//! Two ways to drive a socket:
//! - a single socket over a [`MemoryTransport`], fed with hand-written frames
//!   and checked with the `assert_*` helpers
//! - a [`SocketPair`], two sockets wired back to back so an owner and its
//!   mirrors talk without a network

use parking_lot::Mutex;
use serde_json::{Map, Value};
use socksync_engine::{
    ConnectionHooks, EngineConfig, EngineError, EngineResult, ErrorCode, GroupId, MemoryTransport,
    Socket, Transport,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::trace;

/// Creates a socket over a recording transport.
pub fn memory_socket() -> (Arc<Socket>, Arc<MemoryTransport>) {
    memory_socket_with(EngineConfig::default())
}

/// Creates a socket over a recording transport with an explicit configuration.
pub fn memory_socket_with(config: EngineConfig) -> (Arc<Socket>, Arc<MemoryTransport>) {
    let transport = Arc::new(MemoryTransport::new());
    (Socket::with_config(transport.clone(), config), transport)
}

/// Feeds `socket` one frame built from its parts. `None` keys are left out.
pub fn receive_func(socket: &Arc<Socket>, func: &str, group_type: Option<&str>, name: Option<&str>, args: Value) {
    let mut frame = match args {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => panic!("frame arguments must be an object, got {other}"),
    };
    frame.insert("func".into(), Value::from(func));
    if let Some(group_type) = group_type {
        frame.insert("type".into(), Value::from(group_type));
    }
    if let Some(name) = name {
        frame.insert("name".into(), Value::from(name));
    }
    socket.receive(&Value::Object(frame).to_string());
}

/// Feeds `socket` one frame addressed to `group`.
pub fn receive_group_func(socket: &Arc<Socket>, func: &str, group: &GroupId, args: Value) {
    receive_func(
        socket,
        func,
        Some(group.group_type.as_str()),
        Some(&group.name),
        args,
    );
}

/// Asserts the last frame is exactly `func` addressed to `group` plus `args`.
pub fn assert_send_group_func(transport: &MemoryTransport, func: &str, group: &GroupId, args: Value) {
    let frame = last_frame(transport);
    assert_eq!(frame["func"], Value::from(func), "frame {frame}");
    assert_eq!(frame["type"], Value::from(group.group_type.as_str()), "frame {frame}");
    assert_eq!(frame["name"], Value::from(group.name.as_str()), "frame {frame}");

    let args = args.as_object().cloned().unwrap_or_default();
    for (key, value) in &args {
        assert_eq!(&frame[key], value, "key {key} of frame {frame}");
    }
    assert_eq!(frame_len(&frame), 3 + args.len(), "unexpected keys in frame {frame}");
}

/// Asserts the last frame is a bare `func` with no group or arguments.
pub fn assert_send_func(transport: &MemoryTransport, func: &str) {
    let frame = last_frame(transport);
    assert_eq!(frame, serde_json::json!({ "func": func }));
}

/// Asserts the last frame is an error frame carrying `code`.
pub fn assert_send_error(transport: &MemoryTransport, code: ErrorCode) {
    let frame = last_frame(transport);
    assert_eq!(frame["func"], Value::from("error"), "frame {frame}");
    assert_eq!(frame["error_code"], Value::from(u8::from(code)), "frame {frame}");
    assert_eq!(frame_len(&frame), 3, "unexpected keys in frame {frame}");
}

/// Asserts nothing was sent.
pub fn assert_no_send(transport: &MemoryTransport) {
    assert!(transport.is_empty(), "unexpected frames: {:?}", transport.frames());
}

/// Asserts exactly `count` frames were sent.
pub fn assert_send_count(transport: &MemoryTransport, count: usize) {
    assert_eq!(transport.len(), count, "frames: {:?}", transport.frames());
}

fn last_frame(transport: &MemoryTransport) -> Value {
    match transport.last_json() {
        Some(frame) => frame,
        None => panic!("nothing was sent"),
    }
}

fn frame_len(frame: &Value) -> usize {
    frame.as_object().map_or(0, Map::len)
}

/// A transport that hands every frame straight to the peer socket.
///
/// Delivery is synchronous: the peer's handlers run inside `send`, on the
/// sender's thread. Every frame is also recorded.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    peer: Mutex<Weak<Socket>>,
    connected: AtomicBool,
    sent: Mutex<Vec<String>>,
}

impl LoopbackTransport {
    /// Creates a connected transport with no peer yet.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Sets the socket frames are delivered to.
    pub fn set_peer(&self, peer: &Arc<Socket>) {
        *self.peer.lock() = Arc::downgrade(peer);
    }

    /// Returns every frame sent so far, parsed as JSON.
    pub fn sent_json(&self) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .filter_map(|frame| serde_json::from_str(frame).ok())
            .collect()
    }

    /// Forgets the recorded frames.
    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    /// Returns the number of frames sent so far.
    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    /// Returns true if nothing was sent.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Transport for LoopbackTransport {
    fn send(&self, text: &str) -> EngineResult<()> {
        if !self.is_connected() {
            return Err(EngineError::Transport("not connected".into()));
        }
        let peer = self
            .peer
            .lock()
            .upgrade()
            .ok_or_else(|| EngineError::Transport("peer dropped".into()))?;
        self.sent.lock().push(text.to_string());
        trace!(peer = %peer.id(), "loopback frame: {text}");
        peer.receive(text);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) -> EngineResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Two sockets wired back to back.
///
/// `local` is the owner side, where local groups are registered; `remote` is
/// the mirror side, where remote groups bind.
pub struct SocketPair {
    /// Owner-side socket.
    pub local: Arc<Socket>,
    /// Mirror-side socket.
    pub remote: Arc<Socket>,
    /// Frames sent by `local`.
    pub local_transport: Arc<LoopbackTransport>,
    /// Frames sent by `remote`.
    pub remote_transport: Arc<LoopbackTransport>,
}

impl SocketPair {
    /// Creates a pair with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Creates a pair whose sockets share `config`.
    pub fn with_config(config: EngineConfig) -> Self {
        let local_transport = Arc::new(LoopbackTransport::new());
        let remote_transport = Arc::new(LoopbackTransport::new());
        let local = Socket::with_config(local_transport.clone(), config.clone());
        let remote = Socket::with_config(remote_transport.clone(), config);
        local_transport.set_peer(&remote);
        remote_transport.set_peer(&local);
        Self {
            local,
            remote,
            local_transport,
            remote_transport,
        }
    }

    /// Runs `hooks` on the owner side, as a server would on accept.
    pub fn connect(&self, hooks: &ConnectionHooks) {
        self.local.connect(hooks);
    }

    /// Drops the connection on both sides.
    pub fn disconnect(&self) {
        let _ = self.local_transport.close();
        let _ = self.remote_transport.close();
        self.local.disconnect(None);
        self.remote.disconnect(None);
    }
}

impl Default for SocketPair {
    fn default() -> Self {
        Self::new()
    }
}

/// Polls `check` until it holds or `timeout` elapses. Returns the last result.
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

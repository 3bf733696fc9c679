//! Transport layer abstraction.

use crate::error::{EngineError, EngineResult};
use parking_lot::{Condvar, Mutex};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// A duplex message channel carrying one text frame per message.
///
/// This trait abstracts the network layer, allowing for different implementations
/// (WebSocket, line-delimited TCP, in-memory for testing, etc.). Accepting
/// connections and reading frames belong to the implementation; the engine only
/// needs to push frames out.
pub trait Transport: Send + Sync {
    /// Sends one encoded message.
    fn send(&self, text: &str) -> EngineResult<()>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;

    /// Closes the transport connection.
    fn close(&self) -> EngineResult<()>;
}

/// An in-memory transport that records every frame it is asked to send.
#[derive(Debug)]
pub struct MemoryTransport {
    connected: AtomicBool,
    frames: Mutex<Vec<String>>,
    arrived: Condvar,
}

impl MemoryTransport {
    /// Creates a new connected transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            frames: Mutex::new(Vec::new()),
            arrived: Condvar::new(),
        }
    }

    /// Returns a copy of every recorded frame.
    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().clone()
    }

    /// Returns every recorded frame parsed as JSON. Unparseable frames are skipped.
    pub fn json_frames(&self) -> Vec<Value> {
        self.frames
            .lock()
            .iter()
            .filter_map(|f| serde_json::from_str(f).ok())
            .collect()
    }

    /// Returns the most recent frame parsed as JSON.
    pub fn last_json(&self) -> Option<Value> {
        self.frames
            .lock()
            .last()
            .and_then(|f| serde_json::from_str(f).ok())
    }

    /// Removes and returns every recorded frame.
    pub fn take_frames(&self) -> Vec<String> {
        std::mem::take(&mut *self.frames.lock())
    }

    /// Forgets every recorded frame.
    pub fn clear(&self) {
        self.frames.lock().clear();
    }

    /// Returns the number of recorded frames.
    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocks until at least `count` frames are recorded or `timeout` elapses.
    ///
    /// Returns true if the count was reached.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut frames = self.frames.lock();
        while frames.len() < count {
            if self.arrived.wait_until(&mut frames, deadline).timed_out() {
                return frames.len() >= count;
            }
        }
        true
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    fn send(&self, text: &str) -> EngineResult<()> {
        if !self.is_connected() {
            return Err(EngineError::Transport("not connected".into()));
        }
        self.frames.lock().push(text.to_string());
        self.arrived.notify_all();
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

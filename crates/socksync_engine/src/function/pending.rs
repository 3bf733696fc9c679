//! Table of in-flight blocking calls.

use crate::error::{EngineError, EngineResult};
use parking_lot::{Condvar, Mutex};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

enum CallState {
    Pending,
    Resolved(Value),
    Cancelled,
}

pub(crate) struct Slot {
    state: Mutex<CallState>,
    ready: Condvar,
}

/// Upper bound on remembered fire-and-forget ids. The oldest go first.
const MAX_IGNORED: usize = 4096;

/// Pending calls keyed by id, plus the ids of fire-and-forget calls whose
/// return is discarded.
///
/// A callee that fails answers with an id-less error, so an ignored id may
/// never be consumed. Ignored ids are kept no longer than the call timeout
/// and never more than [`MAX_IGNORED`] at once.
#[derive(Default)]
pub(crate) struct PendingCalls {
    calls: Mutex<HashMap<String, Arc<Slot>>>,
    ignored: Mutex<HashMap<String, Instant>>,
}

impl PendingCalls {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a blocking call. Must happen before the `call` is sent.
    pub(crate) fn register(&self, id: &str) -> Arc<Slot> {
        let slot = Arc::new(Slot {
            state: Mutex::new(CallState::Pending),
            ready: Condvar::new(),
        });
        self.calls.lock().insert(id.to_string(), Arc::clone(&slot));
        slot
    }

    /// Registers a call whose return will be dropped.
    ///
    /// Ids older than `ttl` are pruned first, as a return for them would
    /// have timed out had the call been blocking.
    pub(crate) fn ignore(&self, id: &str, ttl: Option<Duration>) {
        let now = Instant::now();
        let mut ignored = self.ignored.lock();
        if let Some(ttl) = ttl {
            ignored.retain(|_, sent| now.duration_since(*sent) < ttl);
        }
        while ignored.len() >= MAX_IGNORED {
            let oldest = ignored
                .iter()
                .min_by_key(|(_, sent)| **sent)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(oldest) => ignored.remove(&oldest),
                None => break,
            };
        }
        ignored.insert(id.to_string(), now);
    }

    /// Number of fire-and-forget ids still remembered.
    pub(crate) fn ignored_len(&self) -> usize {
        self.ignored.lock().len()
    }

    /// Drops an id that never made it onto the wire.
    pub(crate) fn forget(&self, id: &str) {
        self.calls.lock().remove(id);
        self.ignored.lock().remove(id);
    }

    /// Number of blocking calls awaiting a return.
    pub(crate) fn len(&self) -> usize {
        self.calls.lock().len()
    }

    /// Delivers a return value.
    ///
    /// An ignored id is consumed silently. An id that is unknown or already
    /// answered is `BadId`.
    pub(crate) fn resolve(&self, id: &str, value: Value) -> EngineResult<()> {
        if self.ignored.lock().remove(id).is_some() {
            return Ok(());
        }
        let slot = self
            .calls
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::BadId(id.to_string()))?;
        let mut state = slot.state.lock();
        if !matches!(*state, CallState::Pending) {
            return Err(EngineError::BadId(id.to_string()));
        }
        *state = CallState::Resolved(value);
        slot.ready.notify_all();
        Ok(())
    }

    /// Blocks until the call is resolved, cancelled, or `timeout` elapses.
    ///
    /// The entry is removed in every case, so a late return is `BadId`.
    pub(crate) fn wait(&self, id: &str, slot: &Slot, timeout: Option<Duration>) -> EngineResult<Value> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let outcome = {
            let mut state = slot.state.lock();
            while matches!(*state, CallState::Pending) {
                match deadline {
                    Some(deadline) => {
                        if slot.ready.wait_until(&mut state, deadline).timed_out() {
                            break;
                        }
                    }
                    None => slot.ready.wait(&mut state),
                }
            }
            std::mem::replace(&mut *state, CallState::Cancelled)
        };
        self.calls.lock().remove(id);
        match outcome {
            CallState::Resolved(value) => Ok(value),
            CallState::Pending => Err(EngineError::Timeout { id: id.to_string() }),
            CallState::Cancelled => Err(EngineError::Disconnected),
        }
    }

    /// Fails every waiting call with `Disconnected` and forgets ignored ids.
    pub(crate) fn cancel_all(&self) {
        let slots: Vec<Arc<Slot>> = self.calls.lock().drain().map(|(_, slot)| slot).collect();
        for slot in slots {
            let mut state = slot.state.lock();
            if matches!(*state, CallState::Pending) {
                *state = CallState::Cancelled;
            }
            slot.ready.notify_all();
        }
        self.ignored.lock().clear();
    }
}

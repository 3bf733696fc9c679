//! Hooks run once for every new connection.
//!
//! Applications use a hook to register their local groups on each socket
//! before the socket processes its first message. The registry is an explicit
//! object owned by whoever accepts connections, not process-wide state.

use crate::socket::Socket;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Handle returned by [`ConnectionHooks::add`], used to remove the hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

type Hook = Arc<dyn Fn(&Arc<Socket>) + Send + Sync>;

/// An ordered set of new-connection hooks.
#[derive(Default)]
pub struct ConnectionHooks {
    next_id: AtomicU64,
    hooks: RwLock<Vec<(HookId, Hook)>>,
}

impl ConnectionHooks {
    /// Creates an empty hook set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a hook; it runs for every connection accepted afterwards.
    pub fn add(&self, hook: impl Fn(&Arc<Socket>) + Send + Sync + 'static) -> HookId {
        let id = HookId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.hooks.write().push((id, Arc::new(hook)));
        id
    }

    /// Removes a hook. Returns false if it was not present.
    pub fn remove(&self, id: HookId) -> bool {
        let mut hooks = self.hooks.write();
        let before = hooks.len();
        hooks.retain(|(hook_id, _)| *hook_id != id);
        hooks.len() != before
    }

    /// Returns the number of hooks.
    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    /// Returns true if no hook is registered.
    pub fn is_empty(&self) -> bool {
        self.hooks.read().is_empty()
    }

    /// Runs every hook once, in registration order.
    pub fn run(&self, socket: &Arc<Socket>) {
        // Hooks may add or remove hooks.
        let hooks: Vec<Hook> = self.hooks.read().iter().map(|(_, h)| Arc::clone(h)).collect();
        for hook in hooks {
            hook(socket);
        }
    }
}

impl std::fmt::Debug for ConnectionHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHooks")
            .field("len", &self.len())
            .finish()
    }
}

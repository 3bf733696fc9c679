//! Mirror side of a group: one bound socket and a subscription flag.

use crate::error::{EngineError, EngineResult};
use crate::socket::Socket;
use socksync_protocol::{Args, Envelope, GroupId, Subscribe, Unsubscribe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Subscription state of a remote group.
pub struct RemoteCore {
    id: GroupId,
    socket: Arc<Socket>,
    subscribable: bool,
    subscribed: AtomicBool,
}

impl RemoteCore {
    /// Creates a subscribable core bound to `socket`.
    pub fn new(id: GroupId, socket: &Arc<Socket>) -> Self {
        Self {
            id,
            socket: Arc::clone(socket),
            subscribable: true,
            subscribed: AtomicBool::new(false),
        }
    }

    /// Creates a core that never subscribes.
    pub fn unsubscribable(id: GroupId, socket: &Arc<Socket>) -> Self {
        Self {
            subscribable: false,
            ..Self::new(id, socket)
        }
    }

    /// Returns the group id.
    pub fn id(&self) -> &GroupId {
        &self.id
    }

    /// Returns the bound socket.
    pub fn socket(&self) -> &Arc<Socket> {
        &self.socket
    }

    /// Returns true if the group may subscribe.
    pub fn is_subscribable(&self) -> bool {
        self.subscribable
    }

    /// Returns true while subscribed.
    pub fn subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }

    /// Returns true if `socket` is the bound socket and the group is subscribed.
    pub fn is_subscribed(&self, socket: &Socket) -> bool {
        self.subscribed() && self.socket.id() == socket.id()
    }

    /// Returns true if messages to the peer are meaningful: subscribed, or
    /// connected for a group that cannot subscribe.
    pub fn is_live(&self) -> bool {
        if self.subscribable {
            self.subscribed()
        } else {
            self.socket.transport().is_connected()
        }
    }

    /// Sends `subscribe`. A no-op while already subscribed.
    pub fn subscribe(&self) -> EngineResult<()> {
        if !self.subscribable {
            return Err(EngineError::NotSubscribable(self.id.clone()));
        }
        if self.subscribed() {
            return Ok(());
        }
        self.send(&Subscribe {})?;
        self.subscribed.store(true, Ordering::SeqCst);
        self.socket.add_subscription(&self.id);
        debug!(socket = %self.socket.id(), group = %self.id, "subscribed");
        Ok(())
    }

    /// Sends `unsubscribe`. A no-op while not subscribed.
    pub fn unsubscribe(&self) -> EngineResult<()> {
        if !self.subscribable {
            return Err(EngineError::NotSubscribable(self.id.clone()));
        }
        if !self.subscribed() {
            return Ok(());
        }
        self.send(&Unsubscribe {})?;
        self.reset();
        debug!(socket = %self.socket.id(), group = %self.id, "unsubscribed");
        Ok(())
    }

    /// Marks the group unsubscribed without telling the peer.
    pub fn reset(&self) {
        self.subscribed.store(false, Ordering::SeqCst);
        self.socket.remove_subscription(&self.id);
    }

    /// Sends one message addressed to this group.
    pub fn send<A: Args>(&self, args: &A) -> EngineResult<()> {
        self.socket.send(&Envelope::from_args(&self.id, args)?)
    }

    /// Registers `group` on the bound socket and subscribes if asked.
    ///
    /// `prime` runs after a successful subscribe to fill the local cache.
    pub(crate) fn attach<G: crate::group::Group + 'static>(
        &self,
        group: Arc<G>,
        subscribe: bool,
        prime: impl FnOnce(&G) -> EngineResult<()>,
    ) -> EngineResult<Arc<G>> {
        self.socket.register_group(group.clone())?;
        if subscribe {
            if let Err(e) = self.subscribe().and_then(|()| prime(&group)) {
                self.socket.unregister_group(&self.id);
                return Err(e);
            }
        }
        Ok(group)
    }
}

impl std::fmt::Debug for RemoteCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCore")
            .field("id", &self.id)
            .field("socket", &self.socket.id())
            .field("subscribable", &self.subscribable)
            .field("subscribed", &self.subscribed())
            .finish()
    }
}

//! Authoritative side of a group: the subscriber set and ordered broadcast.

use crate::error::{EngineError, EngineResult};
use crate::group::{Dispatcher, Group};
use crate::socket::{Socket, SocketId};
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use socksync_protocol::{Envelope, GroupId, Subscribe, Unsubscribe};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A group owned by this side.
pub trait LocalGroup: Group {
    /// Returns the shared local machinery.
    fn local(&self) -> &LocalCore;

    /// Called after `socket` left the subscriber set.
    fn on_unsubscribed(&self, _socket: &Socket) {}

    /// Removes `socket` from the subscriber set and runs [`LocalGroup::on_unsubscribed`].
    fn drop_subscriber(&self, socket: &Socket) {
        if self.local().remove_subscriber(socket) {
            self.on_unsubscribed(socket);
        }
    }
}

/// Subscriber set and send sequencing of a local group.
///
/// Broadcasts happen while the sequencer is held so that the messages of
/// consecutive mutations reach each subscriber in mutation order. The
/// sequencer is reentrant: a transport that loops a send straight back into
/// dispatch on the same thread does not deadlock.
pub struct LocalCore {
    id: GroupId,
    subscribable: bool,
    subscribers: Mutex<BTreeMap<SocketId, Arc<Socket>>>,
    sequencer: ReentrantMutex<()>,
}

impl LocalCore {
    /// Creates a subscribable core.
    pub fn new(id: GroupId) -> Self {
        Self {
            id,
            subscribable: true,
            subscribers: Mutex::new(BTreeMap::new()),
            sequencer: ReentrantMutex::new(()),
        }
    }

    /// Creates a core that refuses subscriptions.
    pub fn unsubscribable(id: GroupId) -> Self {
        Self {
            subscribable: false,
            ..Self::new(id)
        }
    }

    /// Returns the group id.
    pub fn id(&self) -> &GroupId {
        &self.id
    }

    /// Returns true if peers may subscribe.
    pub fn is_subscribable(&self) -> bool {
        self.subscribable
    }

    /// Builds the receive table every local group starts with:
    /// `subscribe` (open to anyone) and `unsubscribe` (subscribers only).
    ///
    /// An unsubscribable core registers neither, so both are `INVALID_FUNC`.
    pub fn dispatcher<G: LocalGroup + 'static>(&self) -> Dispatcher<G> {
        if !self.subscribable {
            return Dispatcher::new();
        }
        Dispatcher::new()
            .register_receive::<Subscribe>(false, |group: &G, _, socket| {
                group.local().add_subscriber(socket)
            })
            .register_receive::<Unsubscribe>(true, |group: &G, _, socket| {
                group.drop_subscriber(socket);
                Ok(())
            })
    }

    /// Returns the current subscribers, ordered by socket id.
    pub fn subscribers(&self) -> Vec<Arc<Socket>> {
        self.subscribers.lock().values().cloned().collect()
    }

    /// Returns the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Returns true if `socket` is a subscriber.
    pub fn is_subscribed(&self, socket: &Socket) -> bool {
        self.subscribers.lock().contains_key(&socket.id())
    }

    /// Adds `socket` to the subscriber set. Subscribing twice is a no-op.
    pub fn add_subscriber(&self, socket: &Arc<Socket>) -> EngineResult<()> {
        if !self.subscribable {
            return Err(EngineError::NotSubscribable(self.id.clone()));
        }
        self.subscribers
            .lock()
            .insert(socket.id(), Arc::clone(socket));
        socket.add_subscriber_group(&self.id);
        debug!(socket = %socket.id(), group = %self.id, "subscriber added");
        Ok(())
    }

    /// Removes `socket` from the subscriber set. Returns false if it was absent.
    pub fn remove_subscriber(&self, socket: &Socket) -> bool {
        let removed = self.subscribers.lock().remove(&socket.id()).is_some();
        socket.remove_subscriber_group(&self.id);
        if removed {
            debug!(socket = %socket.id(), group = %self.id, "subscriber removed");
        }
        removed
    }

    /// Holds the send order of this group until the guard drops.
    pub fn sequence(&self) -> ReentrantMutexGuard<'_, ()> {
        self.sequencer.lock()
    }

    /// Sends one message per target.
    ///
    /// With `target` set only that socket is considered; otherwise every
    /// subscriber is. `build` returning `None` skips that target. Send
    /// failures are logged and do not stop the broadcast.
    pub fn send_func(
        &self,
        target: Option<&Arc<Socket>>,
        mut build: impl FnMut(&Arc<Socket>) -> Option<Envelope>,
    ) {
        let _order = self.sequence();
        let targets = match target {
            Some(socket) => vec![Arc::clone(socket)],
            None => self.subscribers(),
        };
        for socket in &targets {
            if let Some(envelope) = build(socket) {
                if let Err(e) = socket.send(&envelope) {
                    warn!(socket = %socket.id(), group = %self.id, func = %envelope.func, error = %e, "dropped send");
                }
            }
        }
    }

    /// Sends the same message to `target`, or to every subscriber.
    pub fn send_json(&self, envelope: &Envelope, target: Option<&Arc<Socket>>) {
        self.send_func(target, |_| Some(envelope.clone()));
    }
}

impl std::fmt::Debug for LocalCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCore")
            .field("id", &self.id)
            .field("subscribable", &self.subscribable)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

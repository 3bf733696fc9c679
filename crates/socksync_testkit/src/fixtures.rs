//! Group fixtures.
//!
//! One of each group kind with overlapping names, so tests also cover that
//! `(type, name)` is the key and not `name` alone.

use serde_json::Value;
use socksync_engine::{
    EngineResult, Group, GroupId, LocalFunction, LocalList, LocalVariable, RemoteFunction,
    RemoteList, RemoteVariable, Socket,
};
use std::sync::Arc;

/// A local group of any kind.
#[derive(Clone)]
pub enum LocalHandle {
    /// A local variable.
    Variable(Arc<LocalVariable>),
    /// A local list.
    List(Arc<LocalList>),
    /// A local function.
    Function(Arc<LocalFunction>),
}

impl LocalHandle {
    /// Returns the group id.
    pub fn id(&self) -> &GroupId {
        match self {
            LocalHandle::Variable(group) => group.id(),
            LocalHandle::List(group) => group.id(),
            LocalHandle::Function(group) => group.id(),
        }
    }

    /// Returns the group as a registrable trait object.
    pub fn group(&self) -> Arc<dyn Group> {
        match self {
            LocalHandle::Variable(group) => group.clone(),
            LocalHandle::List(group) => group.clone(),
            LocalHandle::Function(group) => group.clone(),
        }
    }

    /// Returns the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        match self {
            LocalHandle::Variable(group) => group.subscriber_count(),
            LocalHandle::List(group) => group.subscriber_count(),
            LocalHandle::Function(group) => group.subscriber_count(),
        }
    }

    /// Returns true if `socket` is a subscriber.
    pub fn is_subscribed(&self, socket: &Socket) -> bool {
        self.group().is_subscribed(socket)
    }
}

/// A remote group of any kind.
#[derive(Clone)]
pub enum RemoteHandle {
    /// A remote variable.
    Variable(Arc<RemoteVariable>),
    /// A remote list.
    List(Arc<RemoteList>),
    /// A remote function.
    Function(Arc<RemoteFunction>),
}

impl RemoteHandle {
    /// Returns the group id.
    pub fn id(&self) -> &GroupId {
        match self {
            RemoteHandle::Variable(group) => group.id(),
            RemoteHandle::List(group) => group.id(),
            RemoteHandle::Function(group) => group.id(),
        }
    }

    /// Subscribes to the peer's group.
    pub fn subscribe(&self) -> EngineResult<()> {
        match self {
            RemoteHandle::Variable(group) => group.subscribe(),
            RemoteHandle::List(group) => group.subscribe(),
            RemoteHandle::Function(group) => group.subscribe(),
        }
    }

    /// Unsubscribes from the peer's group.
    pub fn unsubscribe(&self) -> EngineResult<()> {
        match self {
            RemoteHandle::Variable(group) => group.unsubscribe(),
            RemoteHandle::List(group) => group.unsubscribe(),
            RemoteHandle::Function(group) => group.unsubscribe(),
        }
    }

    /// Returns true while subscribed.
    pub fn is_subscribed(&self) -> bool {
        match self {
            RemoteHandle::Variable(group) => group.is_subscribed(),
            RemoteHandle::List(group) => group.is_subscribed(),
            RemoteHandle::Function(group) => group.is_subscribed(),
        }
    }
}

/// Fresh local groups: variables `a` and `b`, lists `b` and `c`, functions `c` and `d`.
pub fn local_groups() -> Vec<LocalHandle> {
    vec![
        LocalHandle::Variable(LocalVariable::new("a", Value::Null)),
        LocalHandle::Variable(LocalVariable::new("b", Value::Null)),
        LocalHandle::List(LocalList::new("b", Vec::new())),
        LocalHandle::List(LocalList::new("c", Vec::new())),
        LocalHandle::Function(LocalFunction::new("c", |_| Ok(Value::Null))),
        LocalHandle::Function(LocalFunction::new("d", |_| Ok(Value::Null))),
    ]
}

/// Subscribed remote groups bound to `socket`, named like [`local_groups`].
pub fn remote_groups(socket: &Arc<Socket>) -> EngineResult<Vec<RemoteHandle>> {
    Ok(vec![
        RemoteHandle::Variable(RemoteVariable::new("a", socket, true)?),
        RemoteHandle::Variable(RemoteVariable::new("b", socket, true)?),
        RemoteHandle::List(RemoteList::new("b", socket, true)?),
        RemoteHandle::List(RemoteList::new("c", socket, true)?),
        RemoteHandle::Function(RemoteFunction::new("c", socket, true)?),
        RemoteHandle::Function(RemoteFunction::new("d", socket, true)?),
    ])
}

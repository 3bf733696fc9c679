//! Validation and dispatch of inbound group messages.

use crate::error::{EngineError, EngineResult};
use crate::group::Group;
use crate::socket::Socket;
use socksync_protocol::{Args, Envelope, ProtocolError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

type Handler<G> = Box<dyn Fn(&G, &Envelope, &Arc<Socket>) -> EngineResult<()> + Send + Sync>;

struct Receiver<G> {
    func: &'static str,
    requires_subscription: bool,
    required_fields: &'static [&'static str],
    handler: Handler<G>,
}

/// Table of receive handlers for one group kind.
///
/// Every inbound message goes through the same checks, in order:
/// 1. the function must be registered (`INVALID_FUNC`)
/// 2. gated functions need a subscribed sender (`INVALID_FUNC`)
/// 3. required fields must be present (`MISSING_FIELD`, first missing field)
/// 4. the handler runs; its error is reported to the sender (`BAD_INDEX`, `BAD_ID`, `OTHER`...)
///
/// A rejected message never reaches the handler, so it cannot change state.
pub struct Dispatcher<G> {
    receivers: HashMap<&'static str, Receiver<G>>,
}

impl<G: Group + 'static> Dispatcher<G> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            receivers: HashMap::new(),
        }
    }

    /// Declares that `A::FUNC` is legal for this group.
    ///
    /// Required fields come from `A::REQUIRED`; the payload is decoded into
    /// `A` only after every check passed.
    #[must_use]
    pub fn register_receive<A: Args + 'static>(
        mut self,
        requires_subscription: bool,
        handler: fn(&G, A, &Arc<Socket>) -> EngineResult<()>,
    ) -> Self {
        let receiver = Receiver {
            func: A::FUNC,
            requires_subscription,
            required_fields: A::REQUIRED,
            handler: Box::new(move |group, envelope, socket| {
                handler(group, envelope.args::<A>()?, socket)
            }),
        };
        self.receivers.insert(A::FUNC, receiver);
        self
    }

    /// Returns true if `func` has a receive handler.
    pub fn is_registered(&self, func: &str) -> bool {
        self.receivers.contains_key(func)
    }

    /// Dispatches one message, reporting any failure to the sender.
    pub fn handle_func(&self, group: &G, envelope: &Envelope, socket: &Arc<Socket>) {
        if let Err(e) = self.dispatch(group, envelope, socket) {
            socket.report(&e);
        }
    }

    fn dispatch(&self, group: &G, envelope: &Envelope, socket: &Arc<Socket>) -> EngineResult<()> {
        let receiver = self
            .receivers
            .get(envelope.func.as_str())
            .ok_or_else(|| EngineError::UnknownFunc {
                func: envelope.func.clone(),
                group: group.id().clone(),
            })?;

        if receiver.requires_subscription && !group.is_subscribed(socket) {
            return Err(EngineError::SubscriptionRequired {
                func: envelope.func.clone(),
                group: group.id().clone(),
            });
        }

        if let Some(field) = receiver
            .required_fields
            .iter()
            .copied()
            .find(|field| !envelope.payload.contains_key(*field))
        {
            return Err(ProtocolError::MissingField {
                func: receiver.func,
                field,
            }
            .into());
        }

        debug!(socket = %socket.id(), group = %group.id(), func = receiver.func, "dispatch");
        (receiver.handler)(group, envelope, socket)
    }
}

impl<G: Group + 'static> Default for Dispatcher<G> {
    fn default() -> Self {
        Self::new()
    }
}

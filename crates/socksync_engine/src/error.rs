//! Error types for the sync engine.

use socksync_protocol::{ErrorCode, GroupId, ProtocolError};
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while dispatching or synchronizing groups.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed or incomplete message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The group does not accept this function.
    #[error("{func} is not a valid function for {group}")]
    UnknownFunc {
        /// Requested function.
        func: String,
        /// Addressed group.
        group: GroupId,
    },

    /// The function is only accepted from subscribers.
    #[error("subscription to {group} is required for {func}")]
    SubscriptionRequired {
        /// Requested function.
        func: String,
        /// Addressed group.
        group: GroupId,
    },

    /// The group mirrors a remote function and cannot be called.
    #[error("{0} is not callable")]
    NotCallable(GroupId),

    /// No group with this type and name is registered.
    #[error("{0} does not exist")]
    UnknownGroup(GroupId),

    /// A group with this type and name is already registered.
    #[error("{0} is already registered")]
    DuplicateGroup(GroupId),

    /// The group forbids subscriptions.
    #[error("{0} is not subscribable")]
    NotSubscribable(GroupId),

    /// A list index is outside the addressed range.
    #[error("index {index} out of bounds for length {len}")]
    BadIndex {
        /// Requested index.
        index: usize,
        /// Length of the addressed range.
        len: usize,
    },

    /// A `return` named an id that is not pending.
    #[error("no pending call with id {0}")]
    BadId(String),

    /// A value could not be converted to or from JSON.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// An application callback failed.
    #[error("{0}")]
    Callback(String),

    /// A blocking call expired before its return arrived.
    #[error("call {id} timed out")]
    Timeout {
        /// Id of the abandoned call.
        id: String,
    },

    /// The socket disconnected while a call was pending.
    #[error("socket disconnected")]
    Disconnected,

    /// The transport refused to send.
    #[error("transport error: {0}")]
    Transport(String),
}

impl EngineError {
    /// Returns the wire error code reported to the peer.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            EngineError::Protocol(e) => e.error_code(),
            EngineError::UnknownFunc { .. }
            | EngineError::SubscriptionRequired { .. }
            | EngineError::NotCallable(_) => ErrorCode::InvalidFunc,
            EngineError::UnknownGroup(_) => ErrorCode::InvalidName,
            EngineError::BadIndex { .. } => ErrorCode::BadIndex,
            EngineError::BadId(_) => ErrorCode::BadId,
            EngineError::DuplicateGroup(_)
            | EngineError::NotSubscribable(_)
            | EngineError::InvalidValue(_)
            | EngineError::Callback(_)
            | EngineError::Timeout { .. }
            | EngineError::Disconnected
            | EngineError::Transport(_) => ErrorCode::Other,
        }
    }

    /// Returns true for a blocking call that gave up waiting.
    pub fn is_timeout(&self) -> bool {
        matches!(self, EngineError::Timeout { .. } | EngineError::Disconnected)
    }

    pub(crate) fn invalid_value(err: serde_json::Error) -> Self {
        EngineError::InvalidValue(err.to_string())
    }
}

//! # SockSync Protocol
//!
//! Wire types for the SockSync synchronization protocol.
//!
//! This crate provides:
//! - `GroupType` and `GroupId`, the routing key of every group
//! - `Envelope`, one JSON object per message (`{func, type, name, ...payload}`)
//! - Typed argument structs for every `func` (`VarSet`, `ListGet`, `Call`, ...)
//! - `ErrorCode`, the stable numeric error codes carried by `error` frames
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod envelope;
mod error;
mod messages;

pub use envelope::{Control, Envelope, GroupId, GroupType, Payload};
pub use error::{ErrorCode, ProtocolError, ProtocolResult};
pub use messages::{
    Args, Call, ErrorMessage, ListDelete, ListGet, ListInsert, ListSet, ListSetAll, ListSetCount,
    Return, Subscribe, Unsubscribe, VarGet, VarSet,
};

/// Function name of error frames.
pub const FUNC_ERROR: &str = "error";

/// Function name of the bulk unsubscribe control message.
pub const FUNC_UNSUBSCRIBE_ALL: &str = "unsubscribe_all";

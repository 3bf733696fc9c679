//! Call/return RPC.
//!
//! A [`LocalFunction`] runs its callable on a worker thread for every `call`
//! and answers the caller with `return {id, value}`. A [`RemoteFunction`]
//! sends `call` and either blocks until the matching `return` arrives or
//! fires and forgets.

mod local;
mod pending;
mod remote;

pub use local::LocalFunction;
pub use remote::RemoteFunction;

use serde_json::Value;

/// Error type application callables may return.
pub type FunctionError = Box<dyn std::error::Error + Send + Sync>;

/// Result of an application callable.
pub type FunctionResult = Result<Value, FunctionError>;

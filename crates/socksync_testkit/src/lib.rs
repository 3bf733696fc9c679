//! # SockSync Testkit
//!
//! Test utilities for SockSync.
//!
//! This crate provides:
//! - Group fixtures (one of each kind, local and remote)
//! - Frame assertion helpers over a recording transport
//! - Loopback socket pairs wiring two sockets back to back
//! - Property-based test generators using proptest
//! - One-shot tracing initialisation for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use socksync_testkit::prelude::*;
//!
//! #[test]
//! fn mirror_follows_owner() {
//!     let pair = SocketPair::new();
//!     let owner = LocalVariable::new("x", json!(1));
//!     pair.local.register_group(owner.clone()).unwrap();
//!     let mirror = RemoteVariable::<Value>::new("x", &pair.remote, true).unwrap();
//!     assert_eq!(mirror.value(), Some(json!(1)));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;

use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
    pub use crate::integration::*;
    pub use serde_json::{json, Value};
    pub use socksync_engine::{
        ConnectionHooks, EngineConfig, EngineError, ErrorCode, FunctionResult, Group, GroupId,
        LocalFunction, LocalList, LocalVariable, MemoryTransport, Payload, RemoteFunction,
        PageCursor, RemoteList, RemoteVariable, Socket,
    };
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;

static TRACING: Once = Once::new();

/// Installs a test-friendly tracing subscriber once per process.
///
/// Honours `RUST_LOG`; defaults to `warn`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

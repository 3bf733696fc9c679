//! # SockSync Server
//!
//! Reference transport for the SockSync engine.
//!
//! This crate provides:
//! - A tokio TCP listener, one task per connection
//! - Newline-delimited JSON framing (one message per line)
//! - A [`ConnectionHooks`] registry owned by the server, run for every
//!   accepted connection before its first line is read
//!
//! # Example
//!
//! ```rust,ignore
//! use socksync_engine::LocalVariable;
//! use socksync_server::{ServerConfig, SyncServer};
//! use std::sync::Arc;
//!
//! let server = Arc::new(SyncServer::bind(ServerConfig::default()).await?);
//! let counter = LocalVariable::new("counter", serde_json::json!(0));
//! server.hooks().add(move |socket| {
//!     let _ = socket.register_group(counter.clone());
//! });
//! server.run().await?;
//! ```
//!
//! [`ConnectionHooks`]: socksync_engine::ConnectionHooks

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::ChannelTransport;
pub use server::SyncServer;

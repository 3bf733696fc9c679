//! Server configuration.

use socksync_engine::EngineConfig;
use std::net::SocketAddr;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Longest accepted line, in bytes. Longer lines are answered with
    /// `INVALID_JSON` and skipped.
    pub max_message_size: usize,
    /// Outbound messages queued per connection before it is dropped as too
    /// slow a reader.
    pub max_queued_messages: usize,
    /// Configuration handed to every connection's socket.
    pub engine: EngineConfig,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            max_connections: 1000,
            max_message_size: 1024 * 1024,
            max_queued_messages: 1024,
            engine: EngineConfig::default(),
        }
    }

    /// Sets the maximum concurrent connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the longest accepted line.
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Sets the outbound queue length per connection.
    pub fn with_max_queued_messages(mut self, max: usize) -> Self {
        self.max_queued_messages = max;
        self
    }

    /// Sets the engine configuration.
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8765)))
    }
}

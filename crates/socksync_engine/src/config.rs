//! Engine configuration.

use std::time::Duration;

/// Configuration shared by every group bound to a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long a blocking remote call waits for its `return`.
    ///
    /// `None` waits until the return arrives or the socket disconnects.
    pub call_timeout: Option<Duration>,
    /// Page size a `RemoteList` requests when it primes its cache.
    pub default_page_size: usize,
    /// Largest page a `LocalList` serves unless configured otherwise.
    pub max_page_size: usize,
}

impl EngineConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the blocking call timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Makes blocking calls wait without a deadline.
    #[must_use]
    pub fn without_call_timeout(mut self) -> Self {
        self.call_timeout = None;
        self
    }

    /// Sets the page size remote lists request by default.
    #[must_use]
    pub fn with_default_page_size(mut self, size: usize) -> Self {
        self.default_page_size = size;
        self
    }

    /// Sets the default page size cap for local lists.
    #[must_use]
    pub fn with_max_page_size(mut self, size: usize) -> Self {
        self.max_page_size = size;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            call_timeout: Some(Duration::from_secs(30)),
            default_page_size: 100,
            max_page_size: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.call_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.default_page_size, 100);
        assert_eq!(config.max_page_size, 100);
    }

    #[test]
    fn config_builder() {
        let config = EngineConfig::new()
            .with_call_timeout(Duration::from_millis(250))
            .with_default_page_size(20)
            .with_max_page_size(50);

        assert_eq!(config.call_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.default_page_size, 20);
        assert_eq!(config.max_page_size, 50);
        assert_eq!(config.without_call_timeout().call_timeout, None);
    }
}

//! Session configuration.

use std::time::Duration;

use flowsync_core::DEFAULT_PLACEHOLDER_TITLE;

use crate::channel::ws::DEFAULT_OUTBOUND_CAPACITY;

/// The well-known session endpoint.
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8080/ws";

/// Presence coalescing window.
pub const DEFAULT_THROTTLE_WINDOW: Duration = Duration::from_millis(5);

/// Session engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// WebSocket endpoint of the session server
    pub server_url: String,
    /// Window within which remote cursor updates per connection are coalesced
    pub throttle_window: Duration,
    /// Frames the WebSocket writer may hold before sends are dropped
    pub outbound_capacity: usize,
    /// Transport events buffered ahead of the engine
    pub inbound_capacity: usize,
    /// Title given to nodes first seen without a payload
    pub placeholder_title: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            throttle_window: DEFAULT_THROTTLE_WINDOW,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            inbound_capacity: 1024,
            placeholder_title: DEFAULT_PLACEHOLDER_TITLE.to_string(),
        }
    }
}

impl SessionConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self::default().with_server_url(server_url)
    }

    pub fn with_server_url(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = server_url.into();
        self
    }

    pub fn with_throttle_window(mut self, window: Duration) -> Self {
        self.throttle_window = window;
        self
    }

    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    pub fn with_inbound_capacity(mut self, capacity: usize) -> Self {
        self.inbound_capacity = capacity.max(1);
        self
    }

    pub fn with_placeholder_title(mut self, title: impl Into<String>) -> Self {
        self.placeholder_title = title.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.server_url, "ws://localhost:8080/ws");
        assert_eq!(config.throttle_window, Duration::from_millis(5));
        assert_eq!(config.outbound_capacity, 256);
        assert_eq!(config.inbound_capacity, 1024);
        assert_eq!(config.placeholder_title, "git clone");
    }

    #[test]
    fn test_builder() {
        let config = SessionConfig::new("ws://example:9000/ws")
            .with_throttle_window(Duration::from_millis(16))
            .with_outbound_capacity(0)
            .with_inbound_capacity(8)
            .with_placeholder_title("untitled");

        assert_eq!(config.server_url, "ws://example:9000/ws");
        assert_eq!(config.throttle_window, Duration::from_millis(16));
        assert_eq!(config.outbound_capacity, 1);
        assert_eq!(config.inbound_capacity, 8);
        assert_eq!(config.placeholder_title, "untitled");
    }
}

//! # Router Configuration
//!
//! Options are fixed when a router is created. Build them with
//! [`RouterConfig::builder`]; the defaults suit an endpoint that registers a
//! well-known name and waits on requests for as long as the connection lives.

use std::time::Duration;

/// How the router introduces itself to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Registration {
    /// Claim the host's name with `__listen__`.
    #[default]
    Listen,
    /// Claim the host's name with the older `__register__` spelling.
    Register,
    /// Ask the relay for a generated name and pin the channel to `remote`.
    ///
    /// The endpoint does not learn its generated name, so inbound envelopes
    /// are accepted whatever their `to`.
    Connect(String),
}

/// Configuration for a [`Router`](crate::router::Router).
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub request_timeout: Option<Duration>,
    pub registration: Registration,
    pub log_envelopes: bool,
}

impl RouterConfig {
    pub fn builder() -> RouterConfigBuilder {
        RouterConfigBuilder::new()
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            registration: Registration::Listen,
            log_envelopes: true,
        }
    }
}

/// Fluent builder for [`RouterConfig`].
#[derive(Debug, Clone, Default)]
pub struct RouterConfigBuilder {
    config: RouterConfig,
}

impl RouterConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails a request with `Timeout` if no response arrives within `timeout`.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    pub fn registration(mut self, registration: Registration) -> Self {
        self.config.registration = registration;
        self
    }

    /// Shorthand for `registration(Registration::Connect(remote))`.
    pub fn connect_to(self, remote: impl Into<String>) -> Self {
        self.registration(Registration::Connect(remote.into()))
    }

    /// Emits a `debug` event for every envelope sent and received.
    pub fn log_envelopes(mut self, enabled: bool) -> Self {
        self.config.log_envelopes = enabled;
        self
    }

    pub fn build(self) -> RouterConfig {
        self.config
    }
}

//! Relay options.

/// Configuration for a [`Relay`](crate::Relay).
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Whether `__connect__` is honoured. When false, only named endpoints may join.
    pub allow_anonymous: bool,
}

impl RelayConfig {
    pub fn builder() -> RelayConfigBuilder {
        RelayConfigBuilder::default()
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { allow_anonymous: true }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RelayConfigBuilder {
    config: RelayConfig,
}

impl RelayConfigBuilder {
    pub fn allow_anonymous(mut self, allow: bool) -> Self {
        self.config.allow_anonymous = allow;
        self
    }

    pub fn build(self) -> RelayConfig {
        self.config
    }
}

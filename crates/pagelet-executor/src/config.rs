//! Engine configuration.

use pagelet_core::{ConfigError, Environment};
use pagelet_streaming::FlushPolicy;
use serde::{Deserialize, Serialize};

/// Settings shared by every response an [`Engine`](crate::Engine) serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Environment tag handed to error views; gates verbose failure logs.
    #[serde(default = "Environment::from_env")]
    pub env: Environment,
    /// Free instances retained per pagelet kind.
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,
    #[serde(default)]
    pub flush: FlushPolicy,
}

fn default_pool_capacity() -> usize {
    16
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        if config.pool_capacity == 0 {
            tracing::debug!("pool_capacity is 0, instances will not be reused");
        }
        Ok(config)
    }

    pub fn with_env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    pub fn with_flush(mut self, flush: FlushPolicy) -> Self {
        self.flush = flush;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            env: Environment::from_env(),
            pool_capacity: default_pool_capacity(),
            flush: FlushPolicy::default(),
        }
    }
}

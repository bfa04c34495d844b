//! Runtime configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while loading a [`RuntimeConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The input was not valid JSON for this structure.
    #[error("invalid runtime config: {0}")]
    Json(#[from] serde_json::Error),

    /// A field holds a value the runtime cannot work with.
    #[error("invalid value for `{field}`: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// Tunables of the per-thread runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Re-queues of one watcher within a single flush before it is
    /// considered an infinite loop.
    pub max_update_count: u32,

    /// Delay before an async component shows its loading component when the
    /// factory does not specify one.
    pub async_loading_delay_ms: u64,

    /// Do not forward diagnostics to the warn handler.
    pub silent: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_update_count: 100,
            async_loading_delay_ms: 200,
            silent: false,
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a JSON document. Missing fields take their
    /// defaults.
    pub fn from_json(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Check field values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_update_count == 0 {
            return Err(ConfigError::Invalid {
                field: "max_update_count",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

//! Runtime configuration.
//!
//! Applied per thread with [`Runtime::configure`](crate::reactive::Runtime::configure),
//! or parsed from JSON:
//!
//! ```json
//! { "default_shape": "unstable", "release_idle": false }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::DepsShape;

/// Errors from parsing or validating a [`RuntimeConfig`]
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The JSON did not describe a configuration
    #[error("invalid runtime configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// `fixed` would freeze the dependencies of every dynamic computation
    #[error("`fixed` cannot be the default dependency shape")]
    FixedDefaultShape,
}

/// Per-thread runtime settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Shape of computations created without `fixed_deps`.
    pub default_shape: DepsShape,
    /// Drop the dependencies of computations nobody observes or watches at
    /// the end of each pass.
    pub release_idle: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_shape: DepsShape::Speculative,
            release_idle: true,
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_shape == DepsShape::Fixed {
            return Err(ConfigError::FixedDefaultShape);
        }
        Ok(())
    }
}

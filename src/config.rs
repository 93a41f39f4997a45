use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::session::CaptureConfig;

/// Environment variable prefix, e.g. `LOQA_CAPTURE__CAPTURE__STOP_TIMEOUT_MS=500`
pub const ENV_PREFIX: &str = "LOQA_CAPTURE";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub capture: CaptureConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "loqa-capture".to_string(),
        }
    }
}

impl Config {
    /// Load from an optional config file layered with environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid capture configuration")
    }
}

//! Changer configuration file: loading and validation.
//!
//! One TOML file with a `[shared]` table and a `[changer]` table. The
//! changer table may be omitted entirely; every field has a default.

use std::path::Path;

use atc_common::changer::config::ChangerConfig;
use atc_common::config::{ConfigError, ConfigLoader, SharedConfig};
use serde::Deserialize;
use tracing::debug;

/// Complete validated configuration, ready for runtime use.
#[derive(Debug, Clone, Deserialize)]
pub struct AtcConfig {
    pub shared: SharedConfig,
    #[serde(default)]
    pub changer: ChangerConfig,
}

impl AtcConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.changer
            .validate()
            .map_err(ConfigError::ValidationError)
    }
}

/// Load and validate the configuration file at `path`.
pub fn load_config(path: &Path) -> Result<AtcConfig, ConfigError> {
    let config = AtcConfig::load(path)?;
    config.validate()?;
    debug!(path = %path.display(), pockets = config.changer.pockets, "configuration loaded");
    Ok(config)
}

/// Load config from a TOML string (for testing).
pub fn load_config_from_str(toml: &str) -> Result<AtcConfig, ConfigError> {
    let config = AtcConfig::from_toml(toml)?;
    config.validate()?;
    Ok(config)
}

//! Configuration loading and validation

mod types;
mod validation;

pub use types::{Config, GatewayConfig, InterfaceConfig, LogSection, ResolvedConfig};
pub use validation::{validate, ValidationResult};

use crate::{Error, Result};
use std::path::Path;

/// Load a configuration file
pub fn load(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("read {}: {}", path.display(), e)))?;
    load_str(&content)
}

/// Parse configuration from a TOML string
pub fn load_str(content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| Error::Config(format!("parse: {}", e)))
}

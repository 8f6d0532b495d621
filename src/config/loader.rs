//! Configuration loading from files (std only).

use std::fs;
use std::path::Path;

use crate::error::{ConfigError, Error, Result};
use crate::profile::bounded;

use super::SessionConfig;

/// Load configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
///
/// # Example
///
/// ```rust,ignore
/// use optosigma_shot::load_config;
///
/// let config = load_config("stages.toml")?;
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SessionConfig> {
    let content = fs::read_to_string(path.as_ref()).map_err(|e| {
        Error::Config(ConfigError::IoError(bounded(e.to_string().as_str())))
    })?;

    parse_config(&content)
}

/// Parse configuration from a TOML string.
///
/// # Errors
///
/// Returns an error if the TOML is invalid or fails validation.
pub fn parse_config(content: &str) -> Result<SessionConfig> {
    let config: SessionConfig = toml::from_str(content)
        .map_err(|e| Error::Config(ConfigError::ParseError(bounded(e.message()))))?;

    // Validate the configuration
    super::validation::validate_config(&config)?;

    Ok(config)
}

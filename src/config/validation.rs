//! Configuration validation.

use crate::error::{ConfigError, Error, Result};

use super::SessionConfig;

/// Validate a session configuration.
///
/// Checks:
/// - The controller profile resolves and is valid
/// - Every stage profile resolves and is valid
/// - There are no more stages than controller axes
/// - The baud rate, if given, is supported by the controller
/// - Serial timings are usable
pub fn validate_config(config: &SessionConfig) -> Result<()> {
    let controller = config.controller.resolve()?;

    if config.stages.len() > controller.axes() {
        return Err(Error::Config(ConfigError::TooManyAxes {
            limit: controller.axis_count,
        }));
    }

    for stage in config.stages.iter() {
        stage.resolve()?;
    }

    if let Some(baud) = config.serial.baud_rate {
        if !controller.supports_baud_rate(baud) {
            return Err(Error::Config(ConfigError::UnsupportedBaudRate(baud)));
        }
    }

    config.serial.validate()?;

    Ok(())
}

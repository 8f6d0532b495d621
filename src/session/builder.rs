//! Builder pattern for Session.

use embedded_hal::delay::DelayNs;
use heapless::Vec;

use crate::config::{validate_config, SessionConfig};
use crate::error::{ConfigError, Error, Result};
use crate::profile::{ControllerProfile, StageProfile};
use crate::transport::Connector;
use crate::MAX_AXES;

use super::driver::Session;

/// Builder for creating Session instances.
pub struct SessionBuilder<C, D>
where
    C: Connector,
    D: DelayNs,
{
    controller: Option<ControllerProfile>,
    stages: Vec<StageProfile, MAX_AXES>,
    connector: Option<C>,
    delay: Option<D>,
    overflow: bool,
}

impl<C, D> Default for SessionBuilder<C, D>
where
    C: Connector,
    D: DelayNs,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<C, D> SessionBuilder<C, D>
where
    C: Connector,
    D: DelayNs,
{
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            controller: None,
            stages: Vec::new(),
            connector: None,
            delay: None,
            overflow: false,
        }
    }

    /// Set the controller profile.
    pub fn controller(mut self, profile: impl Into<ControllerProfile>) -> Self {
        self.controller = Some(profile.into());
        self
    }

    /// Append a stage on the next axis.
    pub fn stage(mut self, profile: impl Into<StageProfile>) -> Self {
        if self.stages.push(profile.into()).is_err() {
            self.overflow = true;
        }
        self
    }

    /// Set the port connector.
    pub fn connector(mut self, connector: C) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Set the delay provider.
    pub fn delay(mut self, delay: D) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Configure controller and stages from a SessionConfig.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails validation.
    pub fn from_config(mut self, config: &SessionConfig) -> Result<Self> {
        validate_config(config)?;
        self.controller = Some(config.controller.clone());
        self.stages = config.stages.clone();
        Ok(self)
    }

    /// Build the Session.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is missing, a profile is
    /// invalid, or there are more stages than controller axes.
    pub fn build(self) -> Result<Session<C, D>> {
        let controller = self.controller.ok_or_else(|| missing("controller is required"))?;
        let connector = self.connector.ok_or_else(|| missing("connector is required"))?;
        let delay = self.delay.ok_or_else(|| missing("delay is required"))?;

        let mut session = Session::new(controller, connector, delay)?;
        if self.overflow {
            return Err(Error::Config(ConfigError::TooManyAxes {
                limit: session.controller().axis_count,
            }));
        }
        for stage in self.stages {
            session.append_stage(stage)?;
        }
        Ok(session)
    }
}

fn missing(what: &str) -> Error {
    Error::Config(ConfigError::ParseError(crate::profile::bounded(what)))
}

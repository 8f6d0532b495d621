//! Serial connection settings supplied at connect time.

use core::time::Duration;

use heapless::String;
use serde::Deserialize;

use crate::error::ConfigError;

/// Port name and timing for one connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SerialSettings {
    /// Port name, e.g. `/dev/ttyUSB0` or `COM3` (max 64 chars).
    pub port: String<64>,

    /// Baud rate. `None` uses the controller's default.
    #[serde(default)]
    pub baud_rate: Option<u32>,

    /// How long to wait for each reply.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u32,

    /// Pause between status polls while a drive is in progress.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u32,

    /// Upper bound on waiting for a drive to complete.
    #[serde(default = "default_motion_timeout_ms")]
    pub motion_timeout_ms: u32,
}

fn default_response_timeout_ms() -> u32 {
    1000
}

fn default_poll_interval_ms() -> u32 {
    100
}

fn default_motion_timeout_ms() -> u32 {
    60_000
}

impl SerialSettings {
    /// Settings for a port with default timing and baud rate.
    pub fn new(port: &str) -> Self {
        Self {
            port: crate::profile::bounded(port),
            baud_rate: None,
            response_timeout_ms: default_response_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            motion_timeout_ms: default_motion_timeout_ms(),
        }
    }

    /// Set the baud rate.
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = Some(baud);
        self
    }

    /// Set the reply timeout in milliseconds.
    pub fn response_timeout_ms(mut self, ms: u32) -> Self {
        self.response_timeout_ms = ms;
        self
    }

    /// Set the poll interval in milliseconds.
    pub fn poll_interval_ms(mut self, ms: u32) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set the motion timeout in milliseconds.
    pub fn motion_timeout_ms(mut self, ms: u32) -> Self {
        self.motion_timeout_ms = ms;
        self
    }

    /// Reply timeout as a duration.
    #[inline]
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.response_timeout_ms))
    }

    /// Check that timings are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.response_timeout_ms == 0
            || self.poll_interval_ms == 0
            || self.motion_timeout_ms < self.poll_interval_ms
        {
            return Err(ConfigError::InvalidTiming);
        }
        Ok(())
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self::new("")
    }
}

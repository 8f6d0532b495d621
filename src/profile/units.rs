//! Unit types for stage positions and controller speeds.
//!
//! Provides type-safe representations of pulse counts, the physical units a
//! caller may move in, and the S/F/R speed triple understood by the
//! controller.

use core::ops::{Add, Sub};

use serde::Deserialize;

use crate::error::{ConfigError, EncodingError};

/// Position or travel in controller pulses.
///
/// Uses i64 so that any controller position register value fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(transparent)]
pub struct Pulses(pub i64);

impl Pulses {
    /// Create a new Pulses value.
    #[inline]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the raw value.
    #[inline]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Get absolute value as u64.
    #[inline]
    pub fn abs(self) -> u64 {
        self.0.unsigned_abs()
    }

    /// Convert to a physical amount using pulses per unit.
    #[inline]
    pub fn to_physical(self, pulses_per_unit: f64) -> f64 {
        self.0 as f64 / pulses_per_unit
    }

    /// Create from a physical amount, rounding to the nearest pulse.
    ///
    /// # Errors
    ///
    /// Returns `EncodingError::InvalidAmount` if the amount is not finite or
    /// does not fit the pulse range.
    pub fn from_physical(amount: f64, pulses_per_unit: f64) -> Result<Self, EncodingError> {
        let raw = libm::round(amount * pulses_per_unit);
        if !raw.is_finite() || raw > MAX_PULSES as f64 || raw < -(MAX_PULSES as f64) {
            return Err(EncodingError::InvalidAmount);
        }
        Ok(Self(raw as i64))
    }
}

/// Largest position magnitude the controller position register holds.
pub const MAX_PULSES: i64 = 999_999_999;

impl Add for Pulses {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Pulses {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

/// Physical quantity kind measured by a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Translation stage, measured in millimeters.
    Linear,
    /// Rotation stage, measured in degrees.
    Rotation,
    /// Goniometer stage, measured in degrees.
    Gonio,
}

impl StageKind {
    /// Whether positions are angles.
    #[inline]
    pub fn is_angular(self) -> bool {
        !matches!(self, StageKind::Linear)
    }
}

/// Unit of a motion amount passed to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Unit {
    /// Raw controller pulses.
    #[default]
    Pulses,
    /// Millimeters (linear stages).
    Millimeters,
    /// Micrometers (linear stages).
    Micrometers,
    /// Degrees (rotation and gonio stages).
    Degrees,
    /// Millidegrees (rotation and gonio stages).
    Millidegrees,
}

impl Unit {
    /// Convert an amount in this unit to pulses for a stage.
    ///
    /// `pulses_per_unit` is pulses per millimeter or per degree.
    ///
    /// # Errors
    ///
    /// `UnitMismatch` if the unit does not belong to the stage kind,
    /// `InvalidAmount` if the result is not a valid pulse count.
    pub fn to_pulses(
        self,
        amount: f64,
        kind: StageKind,
        pulses_per_unit: f64,
        axis: usize,
    ) -> Result<Pulses, EncodingError> {
        let scale = match (self, kind.is_angular()) {
            (Unit::Pulses, _) => return Pulses::from_physical(amount, 1.0),
            (Unit::Millimeters, false) | (Unit::Degrees, true) => 1.0,
            (Unit::Micrometers, false) | (Unit::Millidegrees, true) => 0.001,
            _ => return Err(EncodingError::UnitMismatch { axis }),
        };
        Pulses::from_physical(amount * scale, pulses_per_unit)
    }
}

/// Drive speed triple: start speed S, maximum speed F (pulses/s), and
/// acceleration/deceleration time R (ms).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Speed {
    /// Start (slowest) speed in pulses per second.
    pub start: u32,
    /// Maximum (fastest) speed in pulses per second.
    pub max: u32,
    /// Acceleration and deceleration time in milliseconds.
    pub accel_ms: u32,
}

impl Speed {
    /// Create a new speed triple.
    #[inline]
    pub const fn new(start: u32, max: u32, accel_ms: u32) -> Self {
        Self { start, max, accel_ms }
    }

    /// Clamp to the controller's ranges.
    ///
    /// The start speed never exceeds the maximum speed, and is raised to at
    /// least 64 pulses/s when the maximum speed is 8000 pulses/s or more.
    pub fn clamped(self, ranges: &SpeedRanges) -> Self {
        let max = self.max.clamp(ranges.max.0, ranges.max.1);
        let mut start = self.start.min(max).clamp(ranges.start.0, ranges.start.1);
        if max >= 8000 && start < 64 {
            start = 64;
        }
        let accel_ms = self.accel_ms.clamp(ranges.accel_ms.0, ranges.accel_ms.1);
        Self { start, max, accel_ms }
    }
}

/// Inclusive ranges accepted for each speed parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpeedRanges {
    /// Range of the start speed S.
    pub start: (u32, u32),
    /// Range of the maximum speed F.
    pub max: (u32, u32),
    /// Range of the acceleration time R.
    pub accel_ms: (u32, u32),
}

impl SpeedRanges {
    /// Ranges of the SHOT controller family.
    pub const SHOT: Self = Self {
        start: (1, 500_000),
        max: (1, 500_000),
        accel_ms: (0, 1000),
    };

    /// Check that every range is ordered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ordered = |r: (u32, u32)| r.0 <= r.1;
        if ordered(self.start) && ordered(self.max) && ordered(self.accel_ms) && self.max.1 > 0 {
            Ok(())
        } else {
            Err(ConfigError::InvalidSpeedRange)
        }
    }
}

impl Default for SpeedRanges {
    fn default() -> Self {
        Self::SHOT
    }
}

/// Named speed presets used as a stage's default speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "snake_case")]
pub enum SpeedTier {
    /// Gentle speed for small, light stages.
    Low,
    /// Controller factory default speed.
    #[default]
    Medium,
    /// Fast traverse for long-stroke stages.
    High,
}

impl SpeedTier {
    /// Speed triple for this tier.
    pub const fn speed(self) -> Speed {
        match self {
            SpeedTier::Low => Speed::new(100, 1000, 100),
            SpeedTier::Medium => Speed::new(1000, 10_000, 100),
            SpeedTier::High => Speed::new(2000, 40_000, 200),
        }
    }
}

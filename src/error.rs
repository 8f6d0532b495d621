//! Error types for optosigma-shot.
//!
//! Provides unified error handling across configuration, transport, encoding,
//! and the controller exchange itself.

use core::fmt;

use crate::session::MotionState;

/// Result type alias using the library's Error type.
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for all session operations.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Invalid profile, configuration, or lifecycle misuse
    Config(ConfigError),
    /// Serial port failure
    Transport(TransportError),
    /// Request rejected locally before any byte was written
    Encoding(EncodingError),
    /// Controller answered with its NACK token
    Rejected {
        /// Axis the command addressed (`None` for controller-wide commands)
        axis: Option<usize>,
        /// Reason code carried by the NACK (0 when the dialect sends none)
        code: u16,
    },
    /// No response, or motion did not finish, within the configured bound
    Timeout {
        /// Axis left faulted (`None` for controller-wide commands)
        axis: Option<usize>,
        /// Which bound expired
        kind: TimeoutKind,
    },
    /// Axis already has an exchange or a motion in flight
    Busy {
        /// Axis index
        axis: usize,
        /// State the axis was found in
        state: MotionState,
    },
    /// Axis lost track of the controller and must be cleared first
    Faulted {
        /// Axis index
        axis: usize,
    },
    /// Reply could not be decoded in the bound dialect
    Malformed {
        /// Axis left faulted (`None` for controller-wide commands)
        axis: Option<usize>,
    },
}

/// Which timeout bound expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimeoutKind {
    /// Per-read response timeout
    Response,
    /// Overall motion-completion timeout
    Motion,
}

/// Configuration-related errors.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Failed to parse TOML configuration
    ParseError(heapless::String<128>),
    /// Unknown controller or stage model name
    UnknownModel(heapless::String<32>),
    /// Axis count outside 1..=MAX_AXES
    InvalidAxisCount(u8),
    /// Every axis of the controller is already bound
    TooManyAxes {
        /// Axis count of the controller
        limit: u8,
    },
    /// Resolution must be > 0
    InvalidResolution(f64),
    /// Travel limits: min must be < max
    InvalidTravel {
        /// Minimum travel in pulses
        min: i64,
        /// Maximum travel in pulses
        max: i64,
    },
    /// Baud rate not supported by the controller
    UnsupportedBaudRate(u32),
    /// Grammar token or terminator is empty
    EmptyToken,
    /// Speed range is inverted or empty
    InvalidSpeedRange,
    /// Poll interval or a timeout is zero, or the motion timeout is shorter
    /// than one poll interval
    InvalidTiming,
    /// Stages cannot be appended while connected
    AlreadyConnected,
    /// Operation requires a connected session
    NotConnected,
    /// File I/O error (std only)
    #[cfg(feature = "std")]
    IoError(heapless::String<128>),
}

/// Serial transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// Port could not be opened
    Open,
    /// Write failed or was short
    Write,
    /// Read failed for a reason other than timeout
    Read,
    /// No terminator received within the read timeout
    Timeout,
    /// Response did not fit the receive buffer
    Overflow,
}

/// Errors raised while building a frame, before anything is transmitted.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodingError {
    /// Axis index not below the controller's axis count
    AxisOutOfRange {
        /// Requested axis index
        axis: usize,
        /// Axis count of the controller
        axis_count: u8,
    },
    /// Axis index valid for the controller but no stage is attached to it
    AxisNotAttached(usize),
    /// Target position outside the stage travel
    TravelLimit {
        /// Axis index
        axis: usize,
        /// Requested target in pulses
        target: i64,
        /// Minimum travel in pulses
        min: i64,
        /// Maximum travel in pulses
        max: i64,
    },
    /// Physical unit does not match the stage kind
    UnitMismatch {
        /// Axis index
        axis: usize,
    },
    /// Amount is not finite or does not fit a pulse count
    InvalidAmount,
    /// Micro-step division not offered by the controller
    UnsupportedDivision(u16),
    /// Same axis given twice in one multi-axis request
    DuplicateAxis(usize),
    /// Multi-axis request without any axis
    EmptyRequest,
    /// Controller profile lacks the command
    Unsupported(&'static str),
    /// Frame exceeds the frame buffer
    FrameOverflow,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Transport(e) => write!(f, "Transport error: {}", e),
            Error::Encoding(e) => write!(f, "Encoding error: {}", e),
            Error::Rejected { axis: Some(axis), code } => {
                write!(f, "Controller rejected command for axis {} (code {})", axis, code)
            }
            Error::Rejected { axis: None, code } => {
                write!(f, "Controller rejected command (code {})", code)
            }
            Error::Timeout { axis, kind } => {
                let what = match kind {
                    TimeoutKind::Response => "no response from controller",
                    TimeoutKind::Motion => "motion did not complete",
                };
                match axis {
                    Some(axis) => write!(f, "Communication timeout on axis {}: {}", axis, what),
                    None => write!(f, "Communication timeout: {}", what),
                }
            }
            Error::Busy { axis, state } => {
                write!(f, "Axis {} is busy ({})", axis, state.name())
            }
            Error::Faulted { axis } => {
                write!(f, "Axis {} is faulted and must be cleared", axis)
            }
            Error::Malformed { axis: Some(axis) } => {
                write!(f, "Malformed controller response for axis {}", axis)
            }
            Error::Malformed { axis: None } => write!(f, "Malformed controller response"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            ConfigError::UnknownModel(name) => write!(f, "Unknown model '{}'", name),
            ConfigError::InvalidAxisCount(n) => {
                write!(f, "Invalid axis count: {}. Must be 1-{}", n, crate::MAX_AXES)
            }
            ConfigError::TooManyAxes { limit } => {
                write!(f, "Controller supports only {} axes", limit)
            }
            ConfigError::InvalidResolution(v) => {
                write!(f, "Invalid resolution: {}. Must be > 0", v)
            }
            ConfigError::InvalidTravel { min, max } => {
                write!(f, "Invalid travel: min ({}) must be < max ({})", min, max)
            }
            ConfigError::UnsupportedBaudRate(b) => write!(f, "Unsupported baud rate: {}", b),
            ConfigError::EmptyToken => write!(f, "Grammar tokens must not be empty"),
            ConfigError::InvalidSpeedRange => write!(f, "Invalid speed range"),
            ConfigError::InvalidTiming => write!(f, "Invalid serial timing settings"),
            ConfigError::AlreadyConnected => write!(f, "Session is already connected"),
            ConfigError::NotConnected => write!(f, "Session is not connected"),
            #[cfg(feature = "std")]
            ConfigError::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Open => write!(f, "failed to open port"),
            TransportError::Write => write!(f, "failed to write frame"),
            TransportError::Read => write!(f, "failed to read response"),
            TransportError::Timeout => write!(f, "read timed out"),
            TransportError::Overflow => write!(f, "response exceeds receive buffer"),
        }
    }
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodingError::AxisOutOfRange { axis, axis_count } => {
                write!(f, "Axis {} out of range for a {}-axis controller", axis, axis_count)
            }
            EncodingError::AxisNotAttached(axis) => write!(f, "No stage attached to axis {}", axis),
            EncodingError::TravelLimit { axis, target, min, max } => write!(
                f,
                "Target {} on axis {} exceeds travel [{}, {}]",
                target, axis, min, max
            ),
            EncodingError::UnitMismatch { axis } => {
                write!(f, "Unit does not match the stage on axis {}", axis)
            }
            EncodingError::InvalidAmount => write!(f, "Amount is not a valid pulse count"),
            EncodingError::UnsupportedDivision(division) => {
                write!(f, "Division {} not supported", division)
            }
            EncodingError::DuplicateAxis(axis) => write!(f, "Axis {} given more than once", axis),
            EncodingError::EmptyRequest => write!(f, "No axis in request"),
            EncodingError::Unsupported(cmd) => {
                write!(f, "Command '{}' not supported by this controller", cmd)
            }
            EncodingError::FrameOverflow => write!(f, "Frame too long"),
        }
    }
}

// Conversion impls
impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}

impl From<EncodingError> for Error {
    fn from(e: EncodingError) -> Self {
        Error::Encoding(e)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

#[cfg(feature = "std")]
impl std::error::Error for TransportError {}

#[cfg(feature = "std")]
impl std::error::Error for EncodingError {}

//! Command codec for the SHOT controller dialect.
//!
//! Pure translation between logical operations and wire bytes. Nothing here
//! touches a port: every encoder returns frames, every decoder takes a byte
//! slice, so the protocol can be tested against literal fixtures.
//!
//! Request frames look like `M:1+P45000\r\n`: a command letter, `:`, an axis
//! selector (1-based, or the all-axes letter), and command arguments.
//! Responses are `OK`, `NG`, the busy/ready token, or a status line
//! `pos1,...,posN,ack1,ack2,ack3`.

use core::fmt::{self, Write};

use heapless::{String, Vec};

use crate::error::EncodingError;
use crate::profile::{ControllerSpec, Pulses, StageSpec};

mod request;
mod response;

pub use request::{Direction, Excitation, Request};
pub use response::{AxisFlags, ResponseOutcome, StatusReport};

/// Capacity of one frame in bytes, terminator included.
pub const FRAME_CAPACITY: usize = 128;

/// Maximum frames produced for one logical operation.
pub const MAX_FRAMES: usize = 3;

/// One terminated ASCII frame.
pub type Frame = String<FRAME_CAPACITY>;

/// Ordered frames making up one logical operation.
///
/// Each frame is acknowledged separately by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    frames: Vec<Frame, MAX_FRAMES>,
}

impl Command {
    fn push(&mut self, frame: Frame) -> Result<(), EncodingError> {
        self.frames.push(frame).map_err(|_| EncodingError::FrameOverflow)
    }

    /// Frames in transmission order.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Check if the command has no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Target of a command addressing one axis or all axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Selector {
    /// One axis, 0-based.
    Axis(usize),
    /// Every axis of the controller.
    All,
}

/// Travel window used for the pre-flight bound check of a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Travel {
    /// Cached position of the axis.
    pub position: Pulses,
    /// Lowest allowed position.
    pub min: Pulses,
    /// Highest allowed position.
    pub max: Pulses,
}

impl Travel {
    /// Travel window of a stage at a position.
    pub fn new(position: Pulses, stage: &StageSpec) -> Self {
        Self {
            position,
            min: stage.min_travel,
            max: stage.max_travel,
        }
    }

    /// Check an absolute target against the window.
    pub fn check(&self, axis: usize, target: Pulses) -> Result<Pulses, EncodingError> {
        if target < self.min || target > self.max {
            Err(EncodingError::TravelLimit {
                axis,
                target: target.0,
                min: self.min.0,
                max: self.max.0,
            })
        } else {
            Ok(target)
        }
    }

    /// Check a relative move and return the resulting target.
    pub fn check_delta(&self, axis: usize, delta: Pulses) -> Result<Pulses, EncodingError> {
        let target = self
            .position
            .0
            .checked_add(delta.0)
            .ok_or(EncodingError::InvalidAmount)?;
        self.check(axis, Pulses(target))
    }
}

/// Stateless encoder/decoder bound to one controller profile.
#[derive(Debug, Clone, Copy)]
pub struct Codec<'a> {
    spec: &'a ControllerSpec,
}

impl<'a> Codec<'a> {
    /// Create a codec for a controller.
    pub fn new(spec: &'a ControllerSpec) -> Self {
        Self { spec }
    }

    /// The controller profile this codec speaks for.
    pub fn spec(&self) -> &'a ControllerSpec {
        self.spec
    }

    /// Format one frame and append the terminator.
    fn frame(&self, args: fmt::Arguments<'_>) -> Result<Frame, EncodingError> {
        let mut frame = Frame::new();
        frame
            .write_fmt(args)
            .and_then(|_| frame.write_str(&self.spec.grammar.terminator))
            .map_err(|_| EncodingError::FrameOverflow)?;
        Ok(frame)
    }

    /// Validate an axis index.
    fn check_axis(&self, axis: usize) -> Result<usize, EncodingError> {
        if axis < self.spec.axes() {
            Ok(axis)
        } else {
            Err(EncodingError::AxisOutOfRange {
                axis,
                axis_count: self.spec.axis_count,
            })
        }
    }

    /// Render a selector as it appears on the wire.
    fn selector(&self, selector: Selector) -> Result<SelectorToken, EncodingError> {
        match selector {
            Selector::Axis(axis) => Ok(SelectorToken::Axis(self.check_axis(axis)? + 1)),
            Selector::All => Ok(SelectorToken::All(self.spec.grammar.all_axes)),
        }
    }
}

/// Wire form of a selector.
#[derive(Clone, Copy)]
enum SelectorToken {
    Axis(usize),
    All(char),
}

impl fmt::Display for SelectorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorToken::Axis(n) => write!(f, "{}", n),
            SelectorToken::All(c) => write!(f, "{}", c),
        }
    }
}

/// Signed pulse field, `+P100` / `-P100`.
struct SignedPulses(i64);

impl fmt::Display for SignedPulses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { '-' } else { '+' };
        write!(f, "{}P{}", sign, self.0.unsigned_abs())
    }
}

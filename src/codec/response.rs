//! Response decoding, and response rendering for simulated controllers.

use core::fmt::Write;

use heapless::Vec;

use super::{Codec, Frame};
use crate::error::EncodingError;
use crate::profile::{Pulses, SUPPORTED_DIVISIONS};
use crate::MAX_AXES;

/// Per-axis flag set, bit `n` for axis `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AxisFlags(pub u8);

impl AxisFlags {
    /// No axis set.
    pub const NONE: Self = Self(0);

    /// Flags with axes `0..count` set.
    pub fn all(count: usize) -> Self {
        if count >= 8 {
            Self(u8::MAX)
        } else {
            Self((1u8 << count) - 1)
        }
    }

    /// Check if an axis is set.
    #[inline]
    pub fn is_set(self, axis: usize) -> bool {
        axis < 8 && self.0 & (1 << axis) != 0
    }

    /// Flags with one axis set.
    pub fn single(axis: usize) -> Self {
        let mut flags = Self::NONE;
        flags.insert(axis);
        flags
    }

    /// Set an axis.
    #[inline]
    pub fn insert(&mut self, axis: usize) {
        if axis < 8 {
            self.0 |= 1 << axis;
        }
    }

    /// Check if any axis is set.
    #[inline]
    pub fn any(self) -> bool {
        self.0 != 0
    }

    /// The axis, if exactly one is set.
    pub fn only(self) -> Option<usize> {
        (self.0.count_ones() == 1).then(|| self.0.trailing_zeros() as usize)
    }
}

impl FromIterator<usize> for AxisFlags {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut flags = Self::NONE;
        for axis in iter {
            flags.insert(axis);
        }
        flags
    }
}

/// Decoded status or ready reply.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusReport {
    /// Positions of axes `0..n`. Empty for a ready-query reply.
    pub positions: Vec<Pulses, MAX_AXES>,
    /// Axes reported moving.
    ///
    /// SHOT controllers report one controller-wide flag, so either every axis
    /// is set or none is.
    pub busy: AxisFlags,
    /// Whether the last command was accepted.
    pub accepted: bool,
    /// Whether a limit sensor stopped the last motion.
    pub limit_stop: bool,
}

impl StatusReport {
    /// Reported position of an axis, if the reply carried one.
    pub fn position(&self, axis: usize) -> Option<Pulses> {
        self.positions.get(axis).copied()
    }
}

/// Typed outcome of one response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResponseOutcome {
    /// Command accepted.
    Ack,
    /// Command rejected with a reason code (0 if the controller sent none).
    Nack(u16),
    /// Status or busy/ready reply.
    Status(StatusReport),
    /// Anything the dialect does not define.
    Malformed,
}

/// Second acknowledgement field when no limit sensor tripped.
const ACK_NORMAL: &str = "K";
/// First acknowledgement field after a rejected command.
const ACK_ERROR: &str = "X";
/// Width of a padded position field, sign included.
const POSITION_WIDTH: usize = 10;

impl<'a> Codec<'a> {
    /// Decode one response frame.
    ///
    /// The frame must end with the grammar terminator. Never panics; anything
    /// unexpected decodes as [`ResponseOutcome::Malformed`].
    pub fn decode_response(&self, bytes: &[u8]) -> ResponseOutcome {
        self.try_decode_response(bytes)
            .unwrap_or(ResponseOutcome::Malformed)
    }

    fn try_decode_response(&self, bytes: &[u8]) -> Option<ResponseOutcome> {
        let grammar = &self.spec.grammar;
        let text = core::str::from_utf8(bytes).ok()?;
        let text = text.strip_suffix(grammar.terminator.as_str())?.trim();

        if text == grammar.ack.as_str() {
            return Some(ResponseOutcome::Ack);
        }
        if let Some(rest) = text.strip_prefix(grammar.nack.as_str()) {
            return match rest {
                "" => Some(ResponseOutcome::Nack(0)),
                _ => {
                    let code = rest.strip_prefix(',')?.trim().parse().ok()?;
                    Some(ResponseOutcome::Nack(code))
                }
            };
        }
        if text == grammar.busy.as_str() || text == grammar.ready.as_str() {
            return Some(ResponseOutcome::Status(StatusReport {
                positions: Vec::new(),
                busy: self.busy_flags(text == grammar.busy.as_str()),
                accepted: true,
                limit_stop: false,
            }));
        }

        self.decode_status(text).map(ResponseOutcome::Status)
    }

    /// Decode `pos1,...,posN,ack1,ack2,ack3`.
    fn decode_status(&self, text: &str) -> Option<StatusReport> {
        let grammar = &self.spec.grammar;
        let mut fields: Vec<&str, { MAX_AXES + 3 }> = Vec::new();
        for field in text.split(',') {
            fields.push(field.trim()).ok()?;
        }
        if fields.len() < 4 {
            return None;
        }
        let (axes, acks) = fields.split_at(fields.len() - 3);
        if axes.len() > self.spec.axes() {
            return None;
        }

        let mut positions = Vec::new();
        for field in axes {
            positions.push(parse_position(field)?).ok()?;
        }

        let accepted = match acks[0] {
            ACK_ERROR => false,
            ACK_NORMAL => true,
            _ => return None,
        };
        if acks[1].is_empty() {
            return None;
        }
        let limit_stop = acks[1] != ACK_NORMAL;
        let busy = if acks[2] == grammar.busy.as_str() {
            true
        } else if acks[2] == grammar.ready.as_str() {
            false
        } else {
            return None;
        };

        Some(StatusReport {
            positions,
            busy: self.busy_flags(busy),
            accepted,
            limit_stop,
        })
    }

    /// Decode the division query reply, one comma-separated value per axis.
    ///
    /// Returns `None` unless every field is a supported division and there
    /// are no more fields than controller axes.
    pub fn decode_divisions(&self, bytes: &[u8]) -> Option<Vec<u16, MAX_AXES>> {
        let text = core::str::from_utf8(bytes).ok()?;
        let text = text.strip_suffix(self.spec.grammar.terminator.as_str())?.trim();
        let mut divisions = Vec::new();
        for field in text.split(',') {
            let division: u16 = field.trim().parse().ok()?;
            if !SUPPORTED_DIVISIONS.contains(&division) {
                return None;
            }
            divisions.push(division).ok()?;
        }
        if divisions.len() > self.spec.axes() {
            return None;
        }
        Some(divisions)
    }

    fn busy_flags(&self, busy: bool) -> AxisFlags {
        if busy {
            AxisFlags::all(self.spec.axes())
        } else {
            AxisFlags::NONE
        }
    }

    /// Render the acknowledgement reply.
    pub fn encode_ack(&self) -> Result<Frame, EncodingError> {
        self.frame(format_args!("{}", self.spec.grammar.ack))
    }

    /// Render a rejection reply, with an optional reason code.
    pub fn encode_nack(&self, code: Option<u16>) -> Result<Frame, EncodingError> {
        match code {
            Some(code) => self.frame(format_args!("{},{}", self.spec.grammar.nack, code)),
            None => self.frame(format_args!("{}", self.spec.grammar.nack)),
        }
    }

    /// Render the busy/ready reply.
    pub fn encode_ready(&self, busy: bool) -> Result<Frame, EncodingError> {
        let grammar = &self.spec.grammar;
        let token = if busy { &grammar.busy } else { &grammar.ready };
        self.frame(format_args!("{}", token))
    }

    /// Render the division query reply.
    pub fn encode_divisions(&self, divisions: &[u16]) -> Result<Frame, EncodingError> {
        let mut body = Frame::new();
        for (i, division) in divisions.iter().enumerate() {
            let sep = if i == 0 { "" } else { "," };
            write!(body, "{}{}", sep, division).map_err(|_| EncodingError::FrameOverflow)?;
        }
        self.frame(format_args!("{}", body))
    }

    /// Render a status reply with space-padded positions.
    pub fn encode_status(
        &self,
        positions: &[Pulses],
        busy: bool,
        limit_stop: bool,
    ) -> Result<Frame, EncodingError> {
        let grammar = &self.spec.grammar;
        let mut body = Frame::new();
        for position in positions {
            let sign = if position.0 < 0 { '-' } else { ' ' };
            write!(
                body,
                "{}{:>width$},",
                sign,
                position.abs(),
                width = POSITION_WIDTH - 1
            )
            .map_err(|_| EncodingError::FrameOverflow)?;
        }
        self.frame(format_args!(
            "{}{},{},{}",
            body,
            ACK_NORMAL,
            if limit_stop { "L" } else { ACK_NORMAL },
            if busy { &grammar.busy } else { &grammar.ready }
        ))
    }
}

/// Parse a position field such as `-     1000` or `+P1000`.
fn parse_position(field: &str) -> Option<Pulses> {
    let (negative, digits) = match field.as_bytes().first()? {
        b'-' => (true, &field[1..]),
        b'+' => (false, &field[1..]),
        _ => (false, field),
    };
    let digits = digits.strip_prefix('P').unwrap_or(digits).trim_start();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: i64 = digits.parse().ok()?;
    Some(Pulses(if negative { -value } else { value }))
}

//! Request frame encoding and parsing.

use heapless::Vec;

use super::{Codec, Command, Frame, Selector, SignedPulses, Travel};
use crate::error::EncodingError;
use crate::profile::{Pulses, Speed, SUPPORTED_DIVISIONS};
use crate::MAX_AXES;

/// Jog direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Toward increasing positions.
    Positive,
    /// Toward decreasing positions.
    Negative,
}

impl Direction {
    /// Get the sign multiplier (+1 or -1).
    #[inline]
    pub fn sign(self) -> i64 {
        match self {
            Direction::Positive => 1,
            Direction::Negative => -1,
        }
    }

    fn symbol(self) -> char {
        match self {
            Direction::Positive => '+',
            Direction::Negative => '-',
        }
    }
}

/// Motor excitation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Excitation {
    /// Motor current off; the stage can be moved by hand.
    Free,
    /// Motor current on; the stage holds position.
    Hold,
}

impl Excitation {
    fn digit(self) -> u8 {
        match self {
            Excitation::Free => 0,
            Excitation::Hold => 1,
        }
    }
}

/// Logical request recovered from a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Relative move of one axis, pending `Go`.
    Move {
        /// Axis index, 0-based.
        axis: usize,
        /// Signed travel.
        delta: Pulses,
    },
    /// Absolute move of one axis, pending `Go`.
    MoveTo {
        /// Axis index, 0-based.
        axis: usize,
        /// Absolute target.
        target: Pulses,
    },
    /// Relative move of axes `0..n`, pending `Go`.
    MoveAll(Vec<Pulses, MAX_AXES>),
    /// Absolute move of axes `0..n`, pending `Go`.
    MoveAllTo(Vec<Pulses, MAX_AXES>),
    /// Start the pending drive.
    Go,
    /// Return to the mechanical origin.
    Home(Selector),
    /// Decelerate and stop.
    Stop(Selector),
    /// Stop every axis immediately.
    EmergencyStop,
    /// Continuous drive, pending `Go`.
    Jog {
        /// Axis index, 0-based.
        axis: usize,
        /// Drive direction.
        direction: Direction,
    },
    /// Set drive speed.
    SetSpeed {
        /// Axis index, 0-based.
        axis: usize,
        /// Speed triple.
        speed: Speed,
    },
    /// Set origin-return speed.
    SetHomeSpeed {
        /// Axis index, 0-based.
        axis: usize,
        /// Speed triple.
        speed: Speed,
    },
    /// Declare the current position as electrical zero.
    SetOrigin(Selector),
    /// Switch motor excitation.
    SetExcitation(Selector, Excitation),
    /// Set the micro-step division of one axis.
    SetDivision {
        /// Axis index, 0-based.
        axis: usize,
        /// Division, one of the supported values.
        division: u16,
    },
    /// Query the micro-step division of every axis.
    DivisionQuery,
    /// Full status query.
    StatusQuery,
    /// Busy/ready query.
    ReadyQuery,
}

impl Request {
    /// Whether the controller answers this request with data rather than
    /// the ACK/NACK token.
    pub fn is_query(&self) -> bool {
        matches!(self, Self::StatusQuery | Self::ReadyQuery | Self::DivisionQuery)
    }
}

impl<'a> Codec<'a> {
    fn single(&self, frame: Frame) -> Result<Command, EncodingError> {
        let mut command = Command::default();
        command.push(frame)?;
        Ok(command)
    }

    fn speed_frame(&self, letter: char, axis: usize, speed: Speed) -> Result<Frame, EncodingError> {
        let speed = speed.clamped(&self.spec.speed_ranges);
        self.frame(format_args!(
            "{}:{}S{}F{}R{}",
            letter,
            self.check_axis(axis)? + 1,
            speed.start,
            speed.max,
            speed.accel_ms
        ))
    }

    /// Encode a relative move of one axis.
    ///
    /// Frames: optional `D:` speed frame, `M:<axis><sign>P<n>`, `G:`.
    ///
    /// # Errors
    ///
    /// Returns an error if the axis is out of range or the target leaves the
    /// travel window.
    pub fn encode_move(
        &self,
        axis: usize,
        delta: Pulses,
        travel: &Travel,
        speed: Option<Speed>,
    ) -> Result<Command, EncodingError> {
        self.check_axis(axis)?;
        travel.check_delta(axis, delta)?;
        self.drive('M', axis, delta, speed)
    }

    /// Encode an absolute move of one axis.
    ///
    /// # Errors
    ///
    /// Returns an error if the axis is out of range or the target leaves the
    /// travel window.
    pub fn encode_move_to(
        &self,
        axis: usize,
        target: Pulses,
        travel: &Travel,
        speed: Option<Speed>,
    ) -> Result<Command, EncodingError> {
        self.check_axis(axis)?;
        travel.check(axis, target)?;
        self.drive('A', axis, target, speed)
    }

    fn drive(
        &self,
        letter: char,
        axis: usize,
        amount: Pulses,
        speed: Option<Speed>,
    ) -> Result<Command, EncodingError> {
        let mut command = Command::default();
        if let Some(speed) = speed {
            command.push(self.speed_frame('D', axis, speed)?)?;
        }
        command.push(self.frame(format_args!("{}:{}{}", letter, axis + 1, SignedPulses(amount.0)))?)?;
        command.push(self.frame(format_args!("G:"))?)?;
        Ok(command)
    }

    /// Encode a relative move starting axes `0..deltas.len()` together.
    ///
    /// # Errors
    ///
    /// `Unsupported` if the controller has no combined frame, otherwise as
    /// [`Codec::encode_move`] for every axis.
    pub fn encode_combined_move(
        &self,
        deltas: &[(Pulses, Travel)],
    ) -> Result<Command, EncodingError> {
        for (axis, (delta, travel)) in deltas.iter().enumerate() {
            travel.check_delta(axis, *delta)?;
        }
        self.combined('M', deltas.iter().map(|(d, _)| *d))
    }

    /// Encode an absolute move starting axes `0..targets.len()` together.
    ///
    /// # Errors
    ///
    /// As [`Codec::encode_combined_move`].
    pub fn encode_combined_move_to(
        &self,
        targets: &[(Pulses, Travel)],
    ) -> Result<Command, EncodingError> {
        for (axis, (target, travel)) in targets.iter().enumerate() {
            travel.check(axis, *target)?;
        }
        self.combined('A', targets.iter().map(|(t, _)| *t))
    }

    fn combined(
        &self,
        letter: char,
        amounts: impl ExactSizeIterator<Item = Pulses>,
    ) -> Result<Command, EncodingError> {
        if !self.spec.combined_moves {
            return Err(EncodingError::Unsupported("combined move"));
        }
        let count = amounts.len();
        if count == 0 {
            return Err(EncodingError::EmptyRequest);
        }
        if count > self.spec.axes() {
            return Err(EncodingError::AxisOutOfRange {
                axis: count - 1,
                axis_count: self.spec.axis_count,
            });
        }
        let mut body = Frame::new();
        for amount in amounts {
            core::fmt::Write::write_fmt(&mut body, format_args!("{}", SignedPulses(amount.0)))
                .map_err(|_| EncodingError::FrameOverflow)?;
        }
        let mut command = Command::default();
        command.push(self.frame(format_args!("{}:{}{}", letter, self.spec.grammar.all_axes, body))?)?;
        command.push(self.frame(format_args!("G:"))?)?;
        Ok(command)
    }

    /// Encode a return to the mechanical origin.
    pub fn encode_home(&self, target: Selector) -> Result<Command, EncodingError> {
        let sel = self.selector(target)?;
        self.single(self.frame(format_args!("H:{}", sel))?)
    }

    /// Encode a decelerating stop.
    pub fn encode_stop(&self, target: Selector) -> Result<Command, EncodingError> {
        let sel = self.selector(target)?;
        self.single(self.frame(format_args!("L:{}", sel))?)
    }

    /// Encode an immediate stop of every axis.
    pub fn encode_emergency_stop(&self) -> Result<Command, EncodingError> {
        self.single(self.frame(format_args!("L:E"))?)
    }

    /// Encode the full status query.
    pub fn encode_status_query(&self) -> Result<Command, EncodingError> {
        self.single(self.frame(format_args!("{}", self.spec.grammar.status_query))?)
    }

    /// Encode the busy/ready query.
    pub fn encode_ready_query(&self) -> Result<Command, EncodingError> {
        self.single(self.frame(format_args!("{}", self.spec.grammar.ready_query))?)
    }

    /// Encode a continuous drive of one axis.
    pub fn encode_jog(&self, axis: usize, direction: Direction) -> Result<Command, EncodingError> {
        let axis = self.check_axis(axis)?;
        let mut command = Command::default();
        command.push(self.frame(format_args!("J:{}{}", axis + 1, direction.symbol()))?)?;
        command.push(self.frame(format_args!("G:"))?)?;
        Ok(command)
    }

    /// Encode a drive speed change, clamped to the controller ranges.
    pub fn encode_set_speed(&self, axis: usize, speed: Speed) -> Result<Command, EncodingError> {
        self.single(self.speed_frame('D', axis, speed)?)
    }

    /// Encode an origin-return speed change.
    ///
    /// # Errors
    ///
    /// `Unsupported` unless the controller has the home-speed command.
    pub fn encode_set_home_speed(&self, axis: usize, speed: Speed) -> Result<Command, EncodingError> {
        if !self.spec.home_speed {
            return Err(EncodingError::Unsupported("home speed"));
        }
        self.single(self.speed_frame('V', axis, speed)?)
    }

    /// Encode setting the electrical origin at the current position.
    pub fn encode_set_origin(&self, target: Selector) -> Result<Command, EncodingError> {
        let sel = self.selector(target)?;
        self.single(self.frame(format_args!("R:{}", sel))?)
    }

    /// Encode an excitation change.
    pub fn encode_excitation(
        &self,
        target: Selector,
        mode: Excitation,
    ) -> Result<Command, EncodingError> {
        let sel = self.selector(target)?;
        self.single(self.frame(format_args!("C:{}{}", sel, mode.digit()))?)
    }

    /// Encode a micro-step division change, `S:<axis><division>`.
    ///
    /// # Errors
    ///
    /// `UnsupportedDivision` unless the division is one the controller offers.
    pub fn encode_set_division(&self, axis: usize, division: u16) -> Result<Command, EncodingError> {
        let axis = self.check_axis(axis)?;
        if !SUPPORTED_DIVISIONS.contains(&division) {
            return Err(EncodingError::UnsupportedDivision(division));
        }
        self.single(self.frame(format_args!("S:{}{}", axis + 1, division))?)
    }

    /// Encode the division query, answered with one division per axis.
    pub fn encode_query_divisions(&self) -> Result<Command, EncodingError> {
        self.single(self.frame(format_args!("?:S{}", self.spec.grammar.all_axes))?)
    }

    /// Parse a request frame, with or without terminator.
    ///
    /// Returns `None` for anything this dialect would not send.
    pub fn decode_request(&self, bytes: &[u8]) -> Option<Request> {
        let text = core::str::from_utf8(bytes).ok()?;
        let text = text
            .strip_suffix(self.spec.grammar.terminator.as_str())
            .unwrap_or(text);

        if text == self.spec.grammar.status_query.as_str() {
            return Some(Request::StatusQuery);
        }
        if text == self.spec.grammar.ready_query.as_str() {
            return Some(Request::ReadyQuery);
        }

        let (letter, args) = text.split_once(':')?;
        let mut letters = letter.chars();
        let letter = letters.next()?;
        if letters.next().is_some() {
            return None;
        }

        match letter {
            'G' if args.is_empty() => Some(Request::Go),
            '?' => {
                let rest = args.strip_prefix('S')?.strip_prefix(self.spec.grammar.all_axes)?;
                rest.is_empty().then_some(Request::DivisionQuery)
            }
            'S' => {
                let (axis, rest) = self.parse_axis(args)?;
                let (division, rest) = parse_digits(rest)?;
                if !rest.is_empty() {
                    return None;
                }
                Some(Request::SetDivision {
                    axis,
                    division: u16::try_from(division).ok()?,
                })
            }
            'M' | 'A' => {
                if let Some(rest) = args.strip_prefix(self.spec.grammar.all_axes) {
                    let amounts = self.parse_pulse_list(rest)?;
                    Some(if letter == 'M' {
                        Request::MoveAll(amounts)
                    } else {
                        Request::MoveAllTo(amounts)
                    })
                } else {
                    let (axis, rest) = self.parse_axis(args)?;
                    let (amount, rest) = parse_signed_pulses(rest)?;
                    if !rest.is_empty() {
                        return None;
                    }
                    Some(if letter == 'M' {
                        Request::Move { axis, delta: amount }
                    } else {
                        Request::MoveTo { axis, target: amount }
                    })
                }
            }
            'H' => Some(Request::Home(self.parse_selector_only(args)?)),
            'L' if args == "E" => Some(Request::EmergencyStop),
            'L' => Some(Request::Stop(self.parse_selector_only(args)?)),
            'R' => Some(Request::SetOrigin(self.parse_selector_only(args)?)),
            'J' => {
                let (axis, rest) = self.parse_axis(args)?;
                let direction = match rest {
                    "+" => Direction::Positive,
                    "-" => Direction::Negative,
                    _ => return None,
                };
                Some(Request::Jog { axis, direction })
            }
            'D' | 'V' => {
                let (axis, rest) = self.parse_axis(args)?;
                let speed = parse_speed(rest)?;
                Some(if letter == 'D' {
                    Request::SetSpeed { axis, speed }
                } else {
                    Request::SetHomeSpeed { axis, speed }
                })
            }
            'C' => {
                let (selector, rest) = self.parse_selector(args)?;
                let mode = match rest {
                    "0" => Excitation::Free,
                    "1" => Excitation::Hold,
                    _ => return None,
                };
                Some(Request::SetExcitation(selector, mode))
            }
            _ => None,
        }
    }

    /// Parse a 1-based axis digit into a 0-based index.
    fn parse_axis<'t>(&self, args: &'t str) -> Option<(usize, &'t str)> {
        let digit = args.chars().next()?.to_digit(10)? as usize;
        if digit == 0 || digit > self.spec.axes() {
            return None;
        }
        Some((digit - 1, &args[1..]))
    }

    fn parse_selector<'t>(&self, args: &'t str) -> Option<(Selector, &'t str)> {
        match args.strip_prefix(self.spec.grammar.all_axes) {
            Some(rest) => Some((Selector::All, rest)),
            None => self
                .parse_axis(args)
                .map(|(axis, rest)| (Selector::Axis(axis), rest)),
        }
    }

    fn parse_selector_only(&self, args: &str) -> Option<Selector> {
        match self.parse_selector(args)? {
            (selector, "") => Some(selector),
            _ => None,
        }
    }

    fn parse_pulse_list(&self, mut rest: &str) -> Option<Vec<Pulses, MAX_AXES>> {
        let mut amounts = Vec::new();
        while !rest.is_empty() {
            let (amount, tail) = parse_signed_pulses(rest)?;
            amounts.push(amount).ok()?;
            rest = tail;
        }
        if amounts.is_empty() || amounts.len() > self.spec.axes() {
            return None;
        }
        Some(amounts)
    }
}

/// Parse `+P123` / `-P123`, returning the value and the remaining input.
fn parse_signed_pulses(s: &str) -> Option<(Pulses, &str)> {
    let sign = match s.chars().next()? {
        '+' => 1,
        '-' => -1,
        _ => return None,
    };
    let s = s[1..].strip_prefix('P')?;
    let (value, rest) = parse_digits(s)?;
    Some((Pulses(sign * i64::try_from(value).ok()?), rest))
}

/// Parse `S<n>F<n>R<n>`.
fn parse_speed(s: &str) -> Option<Speed> {
    let (start, s) = parse_digits(s.strip_prefix('S')?)?;
    let (max, s) = parse_digits(s.strip_prefix('F')?)?;
    let (accel_ms, s) = parse_digits(s.strip_prefix('R')?)?;
    if !s.is_empty() {
        return None;
    }
    Some(Speed::new(
        u32::try_from(start).ok()?,
        u32::try_from(max).ok()?,
        u32::try_from(accel_ms).ok()?,
    ))
}

/// Parse a run of decimal digits.
fn parse_digits(s: &str) -> Option<(u64, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    let value = s[..end].parse().ok()?;
    Some((value, &s[end..]))
}

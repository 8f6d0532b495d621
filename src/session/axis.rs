//! Axis bindings: one stage on one controller channel.

use log::{debug, warn};

use crate::codec::Travel;
use crate::error::{EncodingError, Error};
use crate::profile::{Pulses, Speed, StageSpec, Unit, DEFAULT_DIVISION};

use super::state::MotionState;

/// A stage bound to a controller axis.
///
/// The cached position is authoritative locally but may be stale until a
/// status query refreshes it.
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    index: usize,
    stage: StageSpec,
    position: Pulses,
    state: MotionState,
    applied_speed: Option<Speed>,
    /// Micro-step division the controller runs this axis at.
    division: u16,
    /// Position expected once the current drive completes.
    expected: Option<Pulses>,
}

impl Axis {
    pub(crate) fn new(index: usize, stage: StageSpec) -> Self {
        Self {
            index,
            stage,
            position: Pulses::default(),
            state: MotionState::Idle,
            applied_speed: None,
            division: DEFAULT_DIVISION,
            expected: None,
        }
    }

    /// Axis index, 0-based.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Bound stage.
    #[inline]
    pub fn stage(&self) -> &StageSpec {
        &self.stage
    }

    /// Cached position in pulses.
    #[inline]
    pub fn position(&self) -> Pulses {
        self.position
    }

    /// Cached position in millimeters or degrees.
    #[inline]
    pub fn position_physical(&self) -> f64 {
        self.position.to_physical(self.stage.pulses_per_unit_at(self.division))
    }

    /// Current motion state.
    #[inline]
    pub fn state(&self) -> MotionState {
        self.state
    }

    /// Last speed acknowledged by the controller for this axis.
    #[inline]
    pub fn applied_speed(&self) -> Option<Speed> {
        self.applied_speed
    }

    /// Micro-step division last read from or set on the controller.
    #[inline]
    pub fn division(&self) -> u16 {
        self.division
    }

    /// Convert an amount to pulses using the stage resolution at the
    /// current division.
    pub fn to_pulses(&self, amount: f64, unit: Unit) -> Result<Pulses, EncodingError> {
        let ppu = self.stage.pulses_per_unit_at(self.division);
        unit.to_pulses(amount, self.stage.kind, ppu, self.index)
    }

    /// Travel window at the cached position.
    pub fn travel(&self) -> Travel {
        let (min, max) = self.stage.travel_at(self.division);
        Travel {
            position: self.position,
            min,
            max,
        }
    }

    /// Fail unless the axis can take a new command.
    pub(crate) fn ensure_ready(&self) -> Result<(), Error> {
        match self.state {
            MotionState::Faulted => Err(Error::Faulted { axis: self.index }),
            state if state.is_in_flight() => Err(Error::Busy {
                axis: self.index,
                state,
            }),
            _ => Ok(()),
        }
    }

    pub(crate) fn set_state(&mut self, next: MotionState) {
        if !self.state.can_transition_to(next) {
            warn!(
                "Axis {}: unexpected transition {} -> {}",
                self.index, self.state, next
            );
        }
        debug!("Axis {}: {} -> {}", self.index, self.state, next);
        self.state = next;
    }

    pub(crate) fn set_position(&mut self, position: Pulses) {
        self.position = position;
    }

    pub(crate) fn set_applied_speed(&mut self, speed: Speed) {
        self.applied_speed = Some(speed);
    }

    pub(crate) fn set_division(&mut self, division: u16) {
        if division != self.division {
            debug!("Axis {}: division {} -> {}", self.index, self.division, division);
        }
        self.division = division;
    }

    pub(crate) fn set_expected(&mut self, expected: Option<Pulses>) {
        self.expected = expected;
    }

    /// End a drive: take the reported position, else the expected target.
    pub(crate) fn finish(&mut self, reported: Option<Pulses>) {
        if let Some(position) = reported.or(self.expected.take()) {
            self.position = position;
        }
        self.expected = None;
        self.set_state(MotionState::Idle);
    }

    pub(crate) fn fault(&mut self) {
        self.expected = None;
        if self.state != MotionState::Faulted {
            self.set_state(MotionState::Faulted);
        }
    }
}

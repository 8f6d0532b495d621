//! Per-axis motion state.
//!
//! ```text
//! Idle -> CommandSent -> Acked -> Moving -> Idle
//!                     \-> Nacked -> Idle
//!                     \-> Faulted (until cleared)
//! Faulted -> Moving (stop acknowledged, awaiting the status refresh)
//! ```

/// Motion state of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotionState {
    /// At rest and ready for commands.
    #[default]
    Idle,
    /// Frames written, acknowledgement not yet read.
    CommandSent,
    /// Every frame acknowledged.
    Acked,
    /// Controller is driving the axis.
    Moving,
    /// Controller rejected the command. Transient; the axis returns to Idle.
    Nacked,
    /// Contact lost mid-exchange. Commands fail until the fault is cleared.
    Faulted,
}

impl MotionState {
    /// State name for display/debugging.
    pub const fn name(self) -> &'static str {
        match self {
            MotionState::Idle => "Idle",
            MotionState::CommandSent => "CommandSent",
            MotionState::Acked => "Acked",
            MotionState::Moving => "Moving",
            MotionState::Nacked => "Nacked",
            MotionState::Faulted => "Faulted",
        }
    }

    /// Whether an exchange or a drive is in progress.
    #[inline]
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            MotionState::CommandSent | MotionState::Acked | MotionState::Moving
        )
    }

    /// Check if a transition is part of the state machine.
    pub fn can_transition_to(self, next: MotionState) -> bool {
        use MotionState::*;
        matches!(
            (self, next),
            (Idle, CommandSent)
                | (CommandSent, Acked)
                | (CommandSent, Nacked)
                | (Acked, Moving)
                | (Acked, Idle)
                | (Moving, Idle)
                | (Nacked, Idle)
                | (Idle, Moving)
                | (CommandSent, Faulted)
                | (Acked, Faulted)
                | (Moving, Faulted)
                | (Idle, Faulted)
                | (Faulted, Idle)
                | (Faulted, Moving)
        )
    }
}

impl core::fmt::Display for MotionState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

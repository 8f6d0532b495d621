//! Session driver.
//!
//! Generic over the transport connector and an embedded-hal 1.0 delay used
//! between status polls.

use core::time::Duration;

use embedded_hal::delay::DelayNs;
use heapless::Vec;
use log::{debug, info, warn};

use crate::codec::{
    AxisFlags, Codec, Command, Direction, Excitation, Frame, ResponseOutcome, Selector,
    StatusReport, Travel, FRAME_CAPACITY,
};
use crate::config::SerialSettings;
use crate::error::{ConfigError, EncodingError, Error, Result, TimeoutKind, TransportError};
use crate::profile::{ControllerProfile, ControllerSpec, Pulses, Speed, StageProfile, Unit};
use crate::transport::{Connector, Port};
use crate::MAX_AXES;

use super::axis::Axis;
use super::state::MotionState;

/// Timing taken from the serial settings at connect.
#[derive(Debug, Clone, Copy)]
struct Timing {
    response_timeout: Duration,
    poll_interval_ms: u32,
    motion_timeout_ms: u32,
}

impl From<&SerialSettings> for Timing {
    fn from(settings: &SerialSettings) -> Self {
        Self {
            response_timeout: settings.response_timeout(),
            poll_interval_ms: settings.poll_interval_ms,
            motion_timeout_ms: settings.motion_timeout_ms,
        }
    }
}

/// One controller, its axes, and (while connected) the open port.
///
/// Generic over:
/// - `C`: port connector (must implement [`Connector`])
/// - `D`: delay provider for status polling (must implement `DelayNs`)
///
/// Every operation blocks until the controller has answered. Motion
/// operations additionally poll the controller status until the drive ends,
/// bounded by the motion timeout; `start_move` and `jog` return as soon as
/// the drive is acknowledged.
pub struct Session<C, D>
where
    C: Connector,
    D: DelayNs,
{
    /// Resolved controller profile.
    controller: ControllerSpec,

    /// Axes in attachment order; index equals position.
    axes: Vec<Axis, MAX_AXES>,

    /// Opens the port at connect.
    connector: C,

    /// Delay between status polls.
    delay: D,

    /// Open port, present only while connected.
    port: Option<C::Port>,

    /// Timing from the last connect.
    timing: Timing,

    /// Whether the micro-step divisions were read since the last connect.
    divisions_loaded: bool,
}

impl<C, D> Session<C, D>
where
    C: Connector,
    D: DelayNs,
{
    /// Create a disconnected session for a controller.
    ///
    /// # Errors
    ///
    /// Returns an error if a custom controller profile is invalid.
    pub fn new(controller: impl Into<ControllerProfile>, connector: C, delay: D) -> Result<Self> {
        let controller = controller.into().resolve()?;
        debug!(
            "Session for {} ({} axes)",
            controller.name, controller.axis_count
        );
        Ok(Self {
            controller,
            axes: Vec::new(),
            connector,
            delay,
            port: None,
            timing: Timing::from(&SerialSettings::default()),
            divisions_loaded: false,
        })
    }

    /// Get the controller profile.
    #[inline]
    pub fn controller(&self) -> &ControllerSpec {
        &self.controller
    }

    /// Get the attached axes in index order.
    #[inline]
    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    /// Get an axis by index.
    #[inline]
    pub fn axis(&self, index: usize) -> Option<&Axis> {
        self.axes.get(index)
    }

    /// Cached position of an axis.
    #[inline]
    pub fn position(&self, index: usize) -> Option<Pulses> {
        self.axis(index).map(Axis::position)
    }

    /// Motion state of an axis.
    #[inline]
    pub fn state(&self, index: usize) -> Option<MotionState> {
        self.axis(index).map(Axis::state)
    }

    /// Check if the port is open.
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    /// Bind a stage to the next free axis and return its index.
    ///
    /// # Errors
    ///
    /// `AlreadyConnected` while connected, `TooManyAxes` when every axis of
    /// the controller is bound, or a validation error for a custom stage.
    pub fn append_stage(&mut self, profile: impl Into<StageProfile>) -> Result<usize> {
        if self.is_connected() {
            return Err(ConfigError::AlreadyConnected.into());
        }
        let limit = self.controller.axis_count;
        if self.axes.len() >= self.controller.axes() {
            return Err(ConfigError::TooManyAxes { limit }.into());
        }
        let stage = profile.into().resolve()?;
        let index = self.axes.len();
        info!("Axis {}: attached {}", index, stage.name);
        self.axes
            .push(Axis::new(index, stage))
            .map_err(|_| Error::Config(ConfigError::TooManyAxes { limit }))?;
        Ok(index)
    }

    /// Open the port.
    ///
    /// Uses the settings' baud rate, or the controller's default.
    ///
    /// # Errors
    ///
    /// `AlreadyConnected`, `UnsupportedBaudRate`, `InvalidTiming`, or a
    /// transport error if the port cannot be opened.
    pub fn connect(&mut self, settings: &SerialSettings) -> Result<()> {
        if self.is_connected() {
            return Err(ConfigError::AlreadyConnected.into());
        }
        settings.validate()?;
        let baud = settings.baud_rate.unwrap_or(self.controller.baud_rate);
        if !self.controller.supports_baud_rate(baud) {
            return Err(ConfigError::UnsupportedBaudRate(baud).into());
        }

        let port = self.connector.open(&settings.port, baud)?;
        self.port = Some(port);
        self.timing = Timing::from(settings);
        self.divisions_loaded = false;
        info!(
            "Connected to {} on {} at {} baud",
            self.controller.name, settings.port, baud
        );
        Ok(())
    }

    /// Close the port. Safe to call when not connected.
    ///
    /// Axes with an exchange or drive in progress are left Faulted since
    /// their outcome is unknown.
    pub fn disconnect(&mut self) {
        if let Some(mut port) = self.port.take() {
            port.close();
            for axis in self.axes.iter_mut().filter(|a| a.state().is_in_flight()) {
                axis.fault();
            }
            info!("Disconnected from {}", self.controller.name);
        }
    }

    /// Move an axis by a relative amount and wait for the drive to end.
    ///
    /// Returns the axis position after the move.
    pub fn move_axis(&mut self, axis: usize, amount: f64, unit: Unit) -> Result<Pulses> {
        self.start_move(axis, amount, unit)?;
        self.wait_for(AxisFlags::single(axis))?;
        Ok(self.axes[axis].position())
    }

    /// Move an axis to an absolute position and wait for the drive to end.
    pub fn move_axis_to(&mut self, axis: usize, target: f64, unit: Unit) -> Result<Pulses> {
        self.ensure_connected()?;
        self.axis_ref(axis)?.ensure_ready()?;
        let pulses = self.convert(axis, target, unit)?;
        self.drive_axis(axis, pulses, true)?;
        self.wait_for(AxisFlags::single(axis))?;
        Ok(self.axes[axis].position())
    }

    /// Start a relative move and return once the controller acknowledged it.
    ///
    /// The axis stays Moving until [`Session::wait_for_idle`], a status query,
    /// or a stop observes the end of the drive.
    ///
    /// # Errors
    ///
    /// - `Busy` / `Faulted` if the axis cannot take a command (nothing is sent)
    /// - `Encoding` if the target leaves the stage travel (nothing is sent)
    /// - any error of [`Session::query_divisions`], which runs before the
    ///   first physical-unit move after connect
    /// - `Rejected` if the controller answers with its NACK token
    /// - `Timeout` / `Malformed` if the reply is missing or undecodable
    pub fn start_move(&mut self, axis: usize, amount: f64, unit: Unit) -> Result<()> {
        self.ensure_connected()?;
        self.axis_ref(axis)?.ensure_ready()?;
        let delta = self.convert(axis, amount, unit)?;
        self.drive_axis(axis, delta, false)
    }

    /// Move several axes by relative amounts and wait for every drive to end.
    ///
    /// Every request is validated before any command is sent. Controllers with a
    /// combined frame start all axes together; otherwise the axes are moved
    /// one after another in ascending index order, each to completion.
    pub fn move_axes(&mut self, moves: &[(usize, f64)], unit: Unit) -> Result<()> {
        self.ensure_connected()?;
        if moves.is_empty() {
            return Err(EncodingError::EmptyRequest.into());
        }

        let mut seen = AxisFlags::NONE;
        let mut deltas: Vec<(usize, Pulses), MAX_AXES> = Vec::new();
        for &(index, amount) in moves {
            let axis = self.axis_ref(index)?;
            if seen.is_set(index) {
                return Err(EncodingError::DuplicateAxis(index).into());
            }
            axis.ensure_ready()?;
            seen.insert(index);
            let delta = self.convert(index, amount, unit)?;
            self.axes[index].travel().check_delta(index, delta)?;
            deltas
                .push((index, delta))
                .map_err(|_| Error::Encoding(EncodingError::DuplicateAxis(index)))?;
        }
        deltas.sort_unstable_by_key(|&(index, _)| index);

        let highest = deltas.last().map_or(0, |&(index, _)| index);
        let combined = self.controller.combined_moves
            && self.axes[..=highest].iter().all(|a| a.ensure_ready().is_ok());

        if combined {
            info!("Combined move of {} axes", deltas.len());
            self.move_combined(&deltas, highest)
        } else {
            for &(index, delta) in deltas.iter() {
                info!("Axis {}: sequential move", index);
                self.drive_axis(index, delta, false)?;
                self.wait_for(AxisFlags::single(index))?;
            }
            Ok(())
        }
    }

    fn move_combined(&mut self, deltas: &[(usize, Pulses)], highest: usize) -> Result<()> {
        for &(index, _) in deltas {
            self.ensure_speed(index)?;
        }

        let mut plan: Vec<(Pulses, Travel), MAX_AXES> = Vec::new();
        let mut drives: Vec<(usize, Option<Pulses>), MAX_AXES> = Vec::new();
        for axis in self.axes[..=highest].iter() {
            let delta = deltas
                .iter()
                .find(|&&(index, _)| index == axis.index())
                .map_or(Pulses(0), |&(_, delta)| delta);
            let travel = axis.travel();
            plan.push((delta, travel))
                .map_err(|_| Error::Encoding(EncodingError::FrameOverflow))?;
            drives
                .push((axis.index(), Some(travel.position + delta)))
                .map_err(|_| Error::Encoding(EncodingError::FrameOverflow))?;
        }

        let command = Codec::new(&self.controller).encode_combined_move(&plan)?;
        self.start_drive(&drives, None, &command)?;
        self.wait_for(drives.iter().map(|&(index, _)| index).collect())
    }

    /// Return an axis to its mechanical origin and wait for the drive to end.
    pub fn home(&mut self, axis: usize) -> Result<()> {
        self.ensure_connected()?;
        self.axis_ref(axis)?.ensure_ready()?;
        let command = Codec::new(&self.controller).encode_home(Selector::Axis(axis))?;
        info!("Axis {}: home", axis);
        self.start_drive(&[(axis, Some(Pulses(0)))], Some(axis), &command)?;
        self.wait_for(AxisFlags::single(axis))
    }

    /// Return every attached axis to its mechanical origin.
    pub fn home_all(&mut self) -> Result<()> {
        self.ensure_connected()?;
        let mask = self.selection(Selector::All)?;
        for axis in self.axes.iter() {
            axis.ensure_ready()?;
        }
        let command = Codec::new(&self.controller).encode_home(Selector::All)?;
        info!("Home all axes");
        let drives: Vec<(usize, Option<Pulses>), MAX_AXES> =
            self.axes.iter().map(|a| (a.index(), Some(Pulses(0)))).collect();
        self.start_drive(&drives, None, &command)?;
        self.wait_for(mask)
    }

    /// Start a continuous drive. The axis stays Moving until stopped.
    pub fn jog(&mut self, axis: usize, direction: Direction) -> Result<()> {
        self.ensure_connected()?;
        self.axis_ref(axis)?.ensure_ready()?;
        self.ensure_speed(axis)?;
        let command = Codec::new(&self.controller).encode_jog(axis, direction)?;
        info!("Axis {}: jog {:?}", axis, direction);
        self.start_drive(&[(axis, None)], Some(axis), &command)
    }

    /// Decelerate and stop one axis or all axes.
    ///
    /// Always transmitted, whatever state the session believes the axes are
    /// in. After the acknowledgement the positions are refreshed once the
    /// controller reports ready, which also returns Faulted axes to Idle.
    pub fn stop(&mut self, target: Selector) -> Result<()> {
        self.ensure_connected()?;
        let mask = self.selection(target)?;
        let command = Codec::new(&self.controller).encode_stop(target)?;
        info!("Stop {:?}", target);
        self.halt(mask, &command)
    }

    /// Stop every axis immediately.
    pub fn abort(&mut self) -> Result<()> {
        self.ensure_connected()?;
        let mask = AxisFlags::all(self.axes.len());
        let command = Codec::new(&self.controller).encode_emergency_stop()?;
        warn!("Emergency stop");
        self.halt(mask, &command)
    }

    /// Wait until every Moving axis has ended its drive.
    pub fn wait_for_idle(&mut self) -> Result<()> {
        let mask = self
            .axes
            .iter()
            .filter(|a| a.state() == MotionState::Moving)
            .map(Axis::index)
            .collect();
        self.wait_for(mask)
    }

    /// Set the drive speed of an axis, clamped to the controller ranges.
    pub fn set_speed(&mut self, axis: usize, speed: Speed) -> Result<()> {
        self.ensure_connected()?;
        self.axis_ref(axis)?.ensure_ready()?;
        let speed = speed.clamped(&self.controller.speed_ranges);
        let command = Codec::new(&self.controller).encode_set_speed(axis, speed)?;
        self.configure(AxisFlags::single(axis), &command)?;
        self.axes[axis].set_applied_speed(speed);
        info!("Axis {}: speed {:?}", axis, speed);
        Ok(())
    }

    /// Read the micro-step division of every controller axis.
    ///
    /// The divisions of attached axes are cached and used for unit
    /// conversion and travel limits. Moves in physical units run this once
    /// per connection if it has not been called.
    pub fn query_divisions(&mut self) -> Result<Vec<u16, MAX_AXES>> {
        self.ensure_connected()?;
        let codec = Codec::new(&self.controller);
        let command = codec.encode_query_divisions()?;
        let frame = command
            .frames()
            .next()
            .ok_or(Error::Encoding(EncodingError::EmptyRequest))?;

        let mut buf = [0u8; FRAME_CAPACITY];
        let len = self.transact(frame, None, &mut buf)?;
        let reply = &buf[..len];
        let codec = Codec::new(&self.controller);
        let Some(divisions) = codec.decode_divisions(reply) else {
            return Err(match codec.decode_response(reply) {
                ResponseOutcome::Nack(code) => Error::Rejected { axis: None, code },
                _ => {
                    self.discard_input();
                    Error::Malformed { axis: None }
                }
            });
        };

        for (axis, &division) in self.axes.iter_mut().zip(divisions.iter()) {
            axis.set_division(division);
        }
        self.divisions_loaded = true;
        debug!("Divisions {:?}", divisions.as_slice());
        Ok(divisions)
    }

    /// Set the micro-step division of an axis.
    ///
    /// Cached positions stay in pulses; their physical meaning changes with
    /// the division.
    pub fn set_division(&mut self, axis: usize, division: u16) -> Result<()> {
        self.ensure_connected()?;
        self.axis_ref(axis)?.ensure_ready()?;
        let command = Codec::new(&self.controller).encode_set_division(axis, division)?;
        self.configure(AxisFlags::single(axis), &command)?;
        self.axes[axis].set_division(division);
        info!("Axis {}: division {}", axis, division);
        Ok(())
    }

    /// Set the origin-return speed of an axis.
    pub fn set_home_speed(&mut self, axis: usize, speed: Speed) -> Result<()> {
        self.ensure_connected()?;
        self.axis_ref(axis)?.ensure_ready()?;
        let command = Codec::new(&self.controller).encode_set_home_speed(axis, speed)?;
        self.configure(AxisFlags::single(axis), &command)
    }

    /// Declare the current position of the selected axes as zero.
    pub fn set_origin(&mut self, target: Selector) -> Result<()> {
        self.ensure_connected()?;
        let mask = self.ready_selection(target)?;
        let command = Codec::new(&self.controller).encode_set_origin(target)?;
        self.configure(mask, &command)?;
        for axis in self.axes.iter_mut().filter(|a| mask.is_set(a.index())) {
            axis.set_position(Pulses(0));
        }
        Ok(())
    }

    /// Switch motor excitation of the selected axes.
    pub fn set_excitation(&mut self, target: Selector, mode: Excitation) -> Result<()> {
        self.ensure_connected()?;
        let mask = self.ready_selection(target)?;
        let command = Codec::new(&self.controller).encode_excitation(target, mode)?;
        self.configure(mask, &command)
    }

    /// Refresh the cached position of an Idle axis from the controller.
    pub fn query_position(&mut self, axis: usize) -> Result<Pulses> {
        self.ensure_connected()?;
        self.axis_ref(axis)?.ensure_ready()?;
        let mask = AxisFlags::single(axis);
        let position = self
            .request_status(false, Some(axis))
            .and_then(|report| report.position(axis).ok_or(Error::Malformed { axis: Some(axis) }))
            .map_err(|e| self.fail(mask, e))?;
        self.axes[axis].set_position(position);
        Ok(position)
    }

    /// Query the full controller status.
    ///
    /// Axes whose drive has ended are returned to Idle, and cached positions
    /// of Idle axes are refreshed.
    pub fn status(&mut self) -> Result<StatusReport> {
        self.ensure_connected()?;
        let report = self.request_status(false, None)?;
        self.apply_report(&report);
        for axis in self.axes.iter_mut() {
            if axis.state() == MotionState::Idle {
                if let Some(position) = report.position(axis.index()) {
                    axis.set_position(position);
                }
            }
        }
        Ok(report)
    }

    /// Ask whether any axis is moving.
    pub fn is_busy(&mut self) -> Result<bool> {
        self.ensure_connected()?;
        let report = self.request_status(true, None)?;
        self.apply_report(&report);
        Ok(report.busy.any())
    }

    /// Return a Faulted axis to Idle once the controller answers again and
    /// reports it at rest. No-op for axes that are not Faulted.
    pub fn clear_fault(&mut self, axis: usize) -> Result<()> {
        self.ensure_connected()?;
        if self.axis_ref(axis)?.state() != MotionState::Faulted {
            return Ok(());
        }
        self.discard_input();
        let report = self.request_status(false, Some(axis))?;
        if report.busy.is_set(axis) {
            return Err(Error::Busy {
                axis,
                state: MotionState::Faulted,
            });
        }
        let entry = &mut self.axes[axis];
        if let Some(position) = report.position(axis) {
            entry.set_position(position);
        }
        entry.set_state(MotionState::Idle);
        info!("Axis {}: fault cleared", axis);
        Ok(())
    }

    // ----- internals -----

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ConfigError::NotConnected.into())
        }
    }

    fn axis_ref(&self, index: usize) -> Result<&Axis> {
        if index >= self.controller.axes() {
            return Err(EncodingError::AxisOutOfRange {
                axis: index,
                axis_count: self.controller.axis_count,
            }
            .into());
        }
        self.axes
            .get(index)
            .ok_or(Error::Encoding(EncodingError::AxisNotAttached(index)))
    }

    fn selection(&self, target: Selector) -> Result<AxisFlags> {
        match target {
            Selector::Axis(index) => self.axis_ref(index).map(|_| AxisFlags::single(index)),
            Selector::All if self.axes.is_empty() => Err(EncodingError::EmptyRequest.into()),
            Selector::All => Ok(AxisFlags::all(self.axes.len())),
        }
    }

    fn ready_selection(&self, target: Selector) -> Result<AxisFlags> {
        let mask = self.selection(target)?;
        for axis in self.axes.iter().filter(|a| mask.is_set(a.index())) {
            axis.ensure_ready()?;
        }
        Ok(mask)
    }

    /// Convert an amount to pulses, reading the divisions first when a
    /// physical unit is used for the first time since connect.
    fn convert(&mut self, index: usize, amount: f64, unit: Unit) -> Result<Pulses> {
        let pulses = self.axes[index].to_pulses(amount, unit)?;
        if unit == Unit::Pulses || self.divisions_loaded {
            return Ok(pulses);
        }
        self.query_divisions()?;
        Ok(self.axes[index].to_pulses(amount, unit)?)
    }

    /// Send the stage default speed before the first drive of an axis.
    fn ensure_speed(&mut self, axis: usize) -> Result<()> {
        if self.axes[axis].applied_speed().is_some() {
            return Ok(());
        }
        let speed = self.axes[axis].stage().default_speed.speed();
        self.set_speed(axis, speed)
    }

    /// Validate and start a single-axis drive, relative or absolute.
    fn drive_axis(&mut self, index: usize, amount: Pulses, absolute: bool) -> Result<()> {
        let axis = self.axis_ref(index)?;
        axis.ensure_ready()?;
        let travel = axis.travel();
        let speed = match axis.applied_speed() {
            Some(_) => None,
            None => Some(axis.stage().default_speed.speed().clamped(&self.controller.speed_ranges)),
        };

        let codec = Codec::new(&self.controller);
        let (command, target) = if absolute {
            (codec.encode_move_to(index, amount, &travel, speed)?, amount)
        } else {
            (codec.encode_move(index, amount, &travel, speed)?, travel.position + amount)
        };

        info!("Axis {}: move to {} pulses", index, target.0);
        self.start_drive(&[(index, Some(target))], Some(index), &command)?;
        if let Some(speed) = speed {
            self.axes[index].set_applied_speed(speed);
        }
        Ok(())
    }

    /// Send a drive command and move the axes to Moving on acknowledgement.
    fn start_drive(
        &mut self,
        drives: &[(usize, Option<Pulses>)],
        label: Option<usize>,
        command: &Command,
    ) -> Result<()> {
        let mask: AxisFlags = drives.iter().map(|&(index, _)| index).collect();
        for axis in self.axes.iter_mut().filter(|a| mask.is_set(a.index())) {
            axis.set_state(MotionState::CommandSent);
        }

        if let Err(e) = self.send_command(command, label) {
            return Err(self.fail(mask, e));
        }

        for &(index, expected) in drives {
            if let Some(axis) = self.axes.get_mut(index) {
                axis.set_state(MotionState::Acked);
                axis.set_expected(expected);
                axis.set_state(MotionState::Moving);
            }
        }
        Ok(())
    }

    /// Send a command that does not start a drive.
    fn configure(&mut self, mask: AxisFlags, command: &Command) -> Result<()> {
        self.send_command(command, mask.only())
            .map_err(|e| self.fail(mask, e))
    }

    /// Stop command shared by `stop` and `abort`.
    fn halt(&mut self, mask: AxisFlags, command: &Command) -> Result<()> {
        if let Err(e) = self.send_command(command, mask.only()) {
            return Err(self.fail(mask, e));
        }
        for axis in self.axes.iter_mut().filter(|a| mask.is_set(a.index())) {
            if matches!(axis.state(), MotionState::Idle | MotionState::Faulted) {
                axis.set_expected(None);
                axis.set_state(MotionState::Moving);
            }
        }
        self.wait_for(mask)
    }

    /// Apply the state machine outcome of a failed exchange.
    ///
    /// A rejection returns in-flight axes to Idle through Nacked; anything
    /// else leaves the axes Faulted.
    fn fail(&mut self, mask: AxisFlags, error: Error) -> Error {
        let rejected = matches!(error, Error::Rejected { .. });
        for axis in self.axes.iter_mut().filter(|a| mask.is_set(a.index())) {
            if rejected {
                if axis.state() == MotionState::CommandSent {
                    axis.set_state(MotionState::Nacked);
                    axis.set_state(MotionState::Idle);
                }
            } else {
                axis.fault();
            }
        }
        warn!("{}", error);
        error
    }

    /// Fault the axes whatever the error. Used once a drive was started and
    /// its end can no longer be observed.
    fn abandon(&mut self, mask: AxisFlags, error: Error) -> Error {
        for axis in self.axes.iter_mut().filter(|a| mask.is_set(a.index())) {
            axis.fault();
        }
        warn!("{}", error);
        error
    }

    /// Poll until no axis in `mask` is Moving, bounded by the motion timeout.
    fn wait_for(&mut self, mask: AxisFlags) -> Result<()> {
        let label = mask.only();
        let mut waited_ms: u32 = 0;
        loop {
            if !self.is_moving(mask) {
                return Ok(());
            }

            let report = match self.request_status(false, label) {
                Ok(report) => report,
                Err(e) => {
                    let moving = self.moving_in(mask);
                    return Err(self.abandon(moving, e));
                }
            };
            self.apply_report(&report);

            if !self.is_moving(mask) {
                return Ok(());
            }
            if waited_ms >= self.timing.motion_timeout_ms {
                let moving = self.moving_in(mask);
                return Err(self.abandon(
                    moving,
                    Error::Timeout {
                        axis: label,
                        kind: TimeoutKind::Motion,
                    },
                ));
            }

            self.delay.delay_ms(self.timing.poll_interval_ms);
            waited_ms = waited_ms.saturating_add(self.timing.poll_interval_ms);
        }
    }

    fn moving_in(&self, mask: AxisFlags) -> AxisFlags {
        self.axes
            .iter()
            .filter(|a| mask.is_set(a.index()) && a.state() == MotionState::Moving)
            .map(Axis::index)
            .collect()
    }

    fn is_moving(&self, mask: AxisFlags) -> bool {
        self.moving_in(mask).any()
    }

    /// End the drive of every Moving axis the report shows at rest.
    fn apply_report(&mut self, report: &StatusReport) {
        for axis in self.axes.iter_mut() {
            let index = axis.index();
            if axis.state() == MotionState::Moving && !report.busy.is_set(index) {
                axis.finish(report.position(index));
                debug!("Axis {}: at {} pulses", index, axis.position().0);
            }
        }
    }

    /// Send the status or ready query and decode the reply.
    fn request_status(&mut self, ready_only: bool, label: Option<usize>) -> Result<StatusReport> {
        let codec = Codec::new(&self.controller);
        let command = if ready_only {
            codec.encode_ready_query()?
        } else {
            codec.encode_status_query()?
        };
        let frame = command
            .frames()
            .next()
            .ok_or(Error::Encoding(EncodingError::EmptyRequest))?;
        match self.exchange(frame, label)? {
            ResponseOutcome::Status(report) => Ok(report),
            ResponseOutcome::Nack(code) => Err(Error::Rejected { axis: label, code }),
            _ => Err(Error::Malformed { axis: label }),
        }
    }

    /// Send every frame of a command, each expecting the ACK token unless
    /// the controller does not answer commands.
    fn send_command(&mut self, command: &Command, label: Option<usize>) -> Result<()> {
        if !self.controller.grammar.command_replies {
            for frame in command.frames() {
                self.write_frame(frame)?;
            }
            return Ok(());
        }
        for frame in command.frames() {
            match self.exchange(frame, label)? {
                ResponseOutcome::Ack => {}
                ResponseOutcome::Nack(code) => return Err(Error::Rejected { axis: label, code }),
                other => {
                    debug!("Expected ACK, got {:?}", other);
                    return Err(Error::Malformed { axis: label });
                }
            }
        }
        Ok(())
    }

    /// Write one frame and decode one reply.
    fn exchange(&mut self, frame: &Frame, label: Option<usize>) -> Result<ResponseOutcome> {
        let mut buf = [0u8; FRAME_CAPACITY];
        let len = self.transact(frame, label, &mut buf)?;
        let outcome = Codec::new(&self.controller).decode_response(&buf[..len]);
        if matches!(outcome, ResponseOutcome::Malformed) {
            self.discard_input();
        }
        Ok(outcome)
    }

    /// Write one frame and read the raw reply into `buf`.
    ///
    /// Input left over after a timeout is discarded so that a late reply
    /// cannot answer the next request.
    fn transact(&mut self, frame: &Frame, label: Option<usize>, buf: &mut [u8]) -> Result<usize> {
        self.write_frame(frame)?;
        let timeout = self.timing.response_timeout;
        let terminator = self.controller.grammar.terminator.as_bytes();
        let port = self
            .port
            .as_mut()
            .ok_or(Error::Config(ConfigError::NotConnected))?;

        match port.read_until(terminator, buf, timeout) {
            Ok(len) => {
                let reply = buf.get(..len).unwrap_or_default();
                debug!("<- {:?}", core::str::from_utf8(reply).unwrap_or("<non-ascii>"));
                Ok(len)
            }
            Err(TransportError::Timeout) => {
                port.discard_input();
                Err(Error::Timeout {
                    axis: label,
                    kind: TimeoutKind::Response,
                })
            }
            Err(other) => Err(Error::Transport(other)),
        }
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let port = self
            .port
            .as_mut()
            .ok_or(Error::Config(ConfigError::NotConnected))?;
        debug!("-> {:?}", frame.as_str());
        port.write(frame.as_bytes())?;
        Ok(())
    }

    fn discard_input(&mut self) {
        if let Some(port) = self.port.as_mut() {
            port.discard_input();
        }
    }
}

impl<C, D> Drop for Session<C, D>
where
    C: Connector,
    D: DelayNs,
{
    fn drop(&mut self) {
        if let Some(mut port) = self.port.take() {
            port.close();
        }
    }
}

impl<C, D> core::fmt::Debug for Session<C, D>
where
    C: Connector,
    D: DelayNs,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("controller", &self.controller.name)
            .field("axes", &self.axes)
            .field("connected", &self.is_connected())
            .finish()
    }
}

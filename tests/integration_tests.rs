//! Integration tests for optosigma-shot.
//!
//! These tests drive a full session against the simulated controller, from
//! stage attachment through motion, faults, and recovery.

mod unit;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use embedded_hal_mock::eh1::delay::NoopDelay;
use optosigma_shot::codec::Selector;
use optosigma_shot::error::{ConfigError, EncodingError, TimeoutKind, TransportError};
use optosigma_shot::transport::{Connector, Port, SimConnector, Simulator};
use optosigma_shot::{
    ControllerModel, Direction, Error, Excitation, MotionState, Pulses, SerialSettings, Session,
    Speed, StageModel, Unit,
};

type SimSession = Session<SimConnector, NoopDelay>;

// =============================================================================
// Helpers
// =============================================================================

fn disconnected(model: ControllerModel, stages: &[StageModel]) -> (Simulator, SimSession) {
    let sim = Simulator::for_model(model);
    let mut session = Session::new(model, sim.connector(), NoopDelay::new()).unwrap();
    for stage in stages {
        session.append_stage(*stage).unwrap();
    }
    (sim, session)
}

fn connected(model: ControllerModel, stages: &[StageModel]) -> (Simulator, SimSession) {
    let (sim, mut session) = disconnected(model, stages);
    session.connect(&SerialSettings::new("sim")).unwrap();
    (sim, session)
}

fn frames_starting_with(sim: &Simulator, prefix: &str) -> Vec<String> {
    sim.frames().into_iter().filter(|f| f.starts_with(prefix)).collect()
}

/// Reply to one written frame.
#[derive(Debug, Clone, Copy)]
enum Reply {
    /// Received within the response timeout.
    Now(&'static str),
    /// Received just after the reader gave up.
    Late(&'static str),
}

/// Line whose replies are scripted in advance, one per written frame.
#[derive(Debug, Clone, Default)]
struct ScriptedLine {
    script: Rc<RefCell<Script>>,
}

#[derive(Debug, Default)]
struct Script {
    replies: VecDeque<Reply>,
    late: Option<&'static str>,
    rx: Vec<u8>,
    written: Vec<String>,
}

impl ScriptedLine {
    fn new(replies: &[Reply]) -> Self {
        let line = Self::default();
        line.script.borrow_mut().replies.extend(replies.iter().copied());
        line
    }

    fn written(&self) -> Vec<String> {
        self.script.borrow().written.clone()
    }
}

impl Connector for ScriptedLine {
    type Port = ScriptedLine;

    fn open(&mut self, _port: &str, _baud_rate: u32) -> Result<ScriptedLine, TransportError> {
        Ok(self.clone())
    }
}

impl Port for ScriptedLine {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut script = self.script.borrow_mut();
        script.written.push(String::from_utf8_lossy(bytes).into_owned());
        match script.replies.pop_front() {
            Some(Reply::Now(reply)) => script.rx.extend_from_slice(reply.as_bytes()),
            Some(Reply::Late(reply)) => script.late = Some(reply),
            None => {}
        }
        Ok(())
    }

    fn read_until(
        &mut self,
        terminator: &[u8],
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        let mut script = self.script.borrow_mut();
        let end = script
            .rx
            .windows(terminator.len())
            .position(|w| w == terminator)
            .map(|i| i + terminator.len());
        let Some(end) = end else {
            if let Some(reply) = script.late.take() {
                script.rx.extend_from_slice(reply.as_bytes());
            }
            return Err(TransportError::Timeout);
        };
        let line: Vec<u8> = script.rx.drain(..end).collect();
        buf.get_mut(..end)
            .ok_or(TransportError::Overflow)?
            .copy_from_slice(&line);
        Ok(end)
    }

    fn discard_input(&mut self) {
        self.script.borrow_mut().rx.clear();
    }
}

// =============================================================================
// Connection lifecycle
// =============================================================================

#[test]
fn test_append_stage_assigns_sequential_indices() {
    let sim = Simulator::for_model(ControllerModel::Shot304Gs);
    let mut session =
        Session::new(ControllerModel::Shot304Gs, sim.connector(), NoopDelay::new()).unwrap();

    for expected in 0..4 {
        assert_eq!(session.append_stage(StageModel::Hst100), Ok(expected));
    }
    assert_eq!(
        session.append_stage(StageModel::Hst100),
        Err(Error::Config(ConfigError::TooManyAxes { limit: 4 }))
    );
    assert_eq!(session.axes().len(), 4);
    assert_eq!(session.axis(3).unwrap().index(), 3);
}

#[test]
fn test_append_after_connect_fails() {
    let (_sim, mut session) = connected(ControllerModel::Shot702, &[StageModel::Sgsp26_100]);
    assert_eq!(
        session.append_stage(StageModel::Sgsp26_100),
        Err(Error::Config(ConfigError::AlreadyConnected))
    );
}

#[test]
fn test_operations_require_connection() {
    let (sim, mut session) = disconnected(ControllerModel::Shot302Gs, &[StageModel::Hst100]);
    assert_eq!(
        session.move_axis(0, 10.0, Unit::Pulses),
        Err(Error::Config(ConfigError::NotConnected))
    );
    assert_eq!(session.home(0), Err(Error::Config(ConfigError::NotConnected)));
    assert!(sim.frames().is_empty());
}

#[test]
fn test_connect_lifecycle() {
    let (sim, mut session) = disconnected(ControllerModel::Shot302Gs, &[StageModel::Hst100]);

    session.connect(&SerialSettings::new("sim")).unwrap();
    assert!(session.is_connected());
    assert!(sim.is_open());
    assert_eq!(
        session.connect(&SerialSettings::new("sim")),
        Err(Error::Config(ConfigError::AlreadyConnected))
    );

    session.disconnect();
    session.disconnect();
    assert!(!session.is_connected());
    assert!(!sim.is_open());

    // Reconnect after disconnect
    session.connect(&SerialSettings::new("sim")).unwrap();
    drop(session);
    assert!(!sim.is_open());
}

#[test]
fn test_connect_failures() {
    let (sim, mut session) = disconnected(ControllerModel::Shot702, &[]);

    sim.fail_open(true);
    assert_eq!(
        session.connect(&SerialSettings::new("sim")),
        Err(Error::Transport(TransportError::Open))
    );
    assert!(!session.is_connected());

    sim.fail_open(false);
    assert_eq!(
        session.connect(&SerialSettings::new("sim").baud_rate(9600)),
        Err(Error::Config(ConfigError::UnsupportedBaudRate(9600)))
    );
    assert!(session.connect(&SerialSettings::new("sim").baud_rate(38400)).is_ok());
}

// =============================================================================
// Motion
// =============================================================================

#[test]
fn test_move_updates_position_from_status() {
    let (sim, mut session) = connected(ControllerModel::Shot302Gs, &[StageModel::Sgsp120Yaw]);

    let position = session.move_axis(0, 45000.0, Unit::Pulses).unwrap();

    assert_eq!(position, Pulses(45000));
    assert_eq!(session.position(0), Some(Pulses(45000)));
    assert_eq!(session.state(0), Some(MotionState::Idle));
    assert_eq!(sim.position(0), Pulses(45000));

    let frames = sim.frames();
    assert_eq!(
        &frames[..3],
        ["D:1S1000F10000R100\r\n", "M:1+P45000\r\n", "G:\r\n"]
    );
    assert!(frames[3..].iter().all(|f| f == "Q:\r\n"));
}

#[test]
fn test_default_speed_sent_once() {
    let (sim, mut session) = connected(ControllerModel::Shot302Gs, &[StageModel::Sgsp46_800]);

    session.move_axis(0, 100.0, Unit::Pulses).unwrap();
    session.move_axis(0, 100.0, Unit::Pulses).unwrap();

    let speeds = frames_starting_with(&sim, "D:");
    assert_eq!(speeds, ["D:1S2000F40000R200\r\n"]);
    assert_eq!(
        session.axis(0).unwrap().applied_speed(),
        Some(Speed::new(2000, 40000, 200))
    );
    assert_eq!(session.position(0), Some(Pulses(200)));
}

#[test]
fn test_physical_units() {
    let (sim, mut session) = connected(ControllerModel::Shot302Gs, &[StageModel::Sgsp46_800]);

    // 10 um per pulse
    assert_eq!(session.move_axis(0, 2.5, Unit::Millimeters), Ok(Pulses(250)));
    assert_eq!(session.move_axis(0, -50.0, Unit::Micrometers), Ok(Pulses(245)));
    assert!((session.axis(0).unwrap().position_physical() - 2.45).abs() < 1e-9);
    assert_eq!(frames_starting_with(&sim, "?:"), ["?:SW\r\n"]);

    sim.clear_frames();
    assert_eq!(
        session.move_axis(0, 1.0, Unit::Degrees),
        Err(Error::Encoding(EncodingError::UnitMismatch { axis: 0 }))
    );
    assert!(sim.frames().is_empty());
}

#[test]
fn test_divisions_read_before_first_physical_move() {
    let (sim, mut session) = connected(ControllerModel::Shot302Gs, &[StageModel::Sgsp46_800]);
    sim.set_division(0, 20);

    session.move_axis(0, 100.0, Unit::Pulses).unwrap();
    assert!(frames_starting_with(&sim, "?:").is_empty());

    // 1 um per pulse at division 20
    assert_eq!(session.move_axis(0, 1.0, Unit::Millimeters), Ok(Pulses(1100)));
    assert_eq!(session.move_axis_to(0, 2.0, Unit::Millimeters), Ok(Pulses(2000)));
    assert_eq!(session.axis(0).unwrap().division(), 20);
    assert!((session.axis(0).unwrap().position_physical() - 2.0).abs() < 1e-9);
    assert_eq!(frames_starting_with(&sim, "?:"), ["?:SW\r\n"]);

    // Read again after reconnecting
    session.disconnect();
    session.connect(&SerialSettings::new("sim")).unwrap();
    session.move_axis(0, -1.0, Unit::Millimeters).unwrap();
    assert_eq!(frames_starting_with(&sim, "?:").len(), 2);
}

#[test]
fn test_set_division() {
    let (sim, mut session) = connected(ControllerModel::Shot302Gs, &[StageModel::Sgsp46_800]);

    session.set_division(0, 4).unwrap();

    assert_eq!(sim.division(0), 4);
    assert_eq!(session.axis(0).unwrap().division(), 4);
    assert_eq!(session.axis(0).unwrap().travel().max, Pulses(80_000));
    assert_eq!(
        session.set_division(0, 3),
        Err(Error::Encoding(EncodingError::UnsupportedDivision(3)))
    );
    assert_eq!(frames_starting_with(&sim, "S:"), ["S:14\r\n"]);

    assert_eq!(session.query_divisions().unwrap().as_slice(), &[4, 2]);
}

#[test]
fn test_move_to_absolute() {
    let (sim, mut session) = connected(ControllerModel::Shot304Gs, &[StageModel::Hst100]);

    session.move_axis(0, 1000.0, Unit::Pulses).unwrap();
    let position = session.move_axis_to(0, -500.0, Unit::Pulses).unwrap();

    assert_eq!(position, Pulses(-500));
    assert_eq!(frames_starting_with(&sim, "A:"), ["A:1-P500\r\n"]);
}

#[test]
fn test_travel_limit_rejected_locally() {
    // 500 pulses/mm, +-50 mm
    let (sim, mut session) = connected(ControllerModel::Shot302Gs, &[StageModel::Sgsp26_100]);

    let result = session.move_axis(0, 30000.0, Unit::Pulses);

    assert_eq!(
        result,
        Err(Error::Encoding(EncodingError::TravelLimit {
            axis: 0,
            target: 30000,
            min: -25000,
            max: 25000,
        }))
    );
    assert_eq!(session.position(0), Some(Pulses(0)));
    assert_eq!(session.state(0), Some(MotionState::Idle));
    assert!(sim.frames().is_empty());
}

#[test]
fn test_axis_index_checks() {
    let (_sim, mut session) = connected(ControllerModel::Shot302Gs, &[StageModel::Hst50]);

    assert_eq!(
        session.move_axis(5, 1.0, Unit::Pulses),
        Err(Error::Encoding(EncodingError::AxisOutOfRange { axis: 5, axis_count: 2 }))
    );
    assert_eq!(
        session.move_axis(1, 1.0, Unit::Pulses),
        Err(Error::Encoding(EncodingError::AxisNotAttached(1)))
    );
}

#[test]
fn test_home_resets_position() {
    let (sim, mut session) = connected(ControllerModel::Shot702, &[StageModel::Sgsp26_50]);

    session.move_axis(0, 1200.0, Unit::Pulses).unwrap();
    session.home(0).unwrap();

    assert_eq!(session.position(0), Some(Pulses(0)));
    assert_eq!(session.state(0), Some(MotionState::Idle));
    assert_eq!(frames_starting_with(&sim, "H:"), ["H:1\r\n"]);
}

#[test]
fn test_home_all() {
    let (sim, mut session) = connected(
        ControllerModel::Shot302Gs,
        &[StageModel::Hst100, StageModel::Sgsp60Yaw],
    );

    session.move_axes(&[(0, 10.0), (1, 20.0)], Unit::Pulses).unwrap();
    session.home_all().unwrap();

    assert_eq!(session.position(0), Some(Pulses(0)));
    assert_eq!(session.position(1), Some(Pulses(0)));
    assert_eq!(frames_starting_with(&sim, "H:"), ["H:W\r\n"]);
}

// =============================================================================
// Controller replies
// =============================================================================

#[test]
fn test_nack_returns_axis_to_idle() {
    let (sim, mut session) = connected(ControllerModel::Shot302Gs, &[StageModel::Hst100]);
    sim.reject_next(Some(7));

    let result = session.move_axis(0, 100.0, Unit::Pulses);

    assert_eq!(result, Err(Error::Rejected { axis: Some(0), code: 7 }));
    assert_eq!(session.state(0), Some(MotionState::Idle));
    assert_eq!(session.position(0), Some(Pulses(0)));

    // The axis takes commands again
    assert_eq!(session.move_axis(0, 100.0, Unit::Pulses), Ok(Pulses(100)));
}

#[test]
fn test_silence_faults_axis_until_cleared() {
    let (sim, mut session) = connected(ControllerModel::Shot302Gs, &[StageModel::Sgsp120Yaw]);
    sim.go_silent();

    let result = session.move_axis(0, 45000.0, Unit::Pulses);

    assert_eq!(
        result,
        Err(Error::Timeout { axis: Some(0), kind: TimeoutKind::Response })
    );
    assert_eq!(session.state(0), Some(MotionState::Faulted));

    let sent = sim.frames().len();
    assert_eq!(
        session.move_axis(0, 1.0, Unit::Pulses),
        Err(Error::Faulted { axis: 0 })
    );
    assert_eq!(sim.frames().len(), sent);

    // Clearing needs the controller to answer
    assert!(session.clear_fault(0).is_err());
    assert_eq!(session.state(0), Some(MotionState::Faulted));

    sim.resume();
    session.clear_fault(0).unwrap();
    assert_eq!(session.state(0), Some(MotionState::Idle));
    assert_eq!(session.move_axis(0, 45000.0, Unit::Pulses), Ok(Pulses(45000)));
}

#[test]
fn test_garbage_reply_faults_axis() {
    let (sim, mut session) = connected(ControllerModel::Shot702, &[StageModel::Hst50]);
    sim.reply_garbage_next();

    assert_eq!(
        session.move_axis(0, 10.0, Unit::Pulses),
        Err(Error::Malformed { axis: Some(0) })
    );
    assert_eq!(session.state(0), Some(MotionState::Faulted));

    session.clear_fault(0).unwrap();
    assert_eq!(session.state(0), Some(MotionState::Idle));
}

#[test]
fn test_late_reply_is_not_taken_for_the_next_one() {
    let line = ScriptedLine::new(&[
        Reply::Now("OK\r\n"),
        Reply::Late("OK\r\n"),
        Reply::Now("         0,         0,K,K,R\r\n"),
    ]);
    let mut session =
        Session::new(ControllerModel::Shot302Gs, line.clone(), NoopDelay::new()).unwrap();
    session.append_stage(StageModel::Hst100).unwrap();
    session.connect(&SerialSettings::new("line")).unwrap();

    assert_eq!(
        session.move_axis(0, 100.0, Unit::Pulses),
        Err(Error::Timeout { axis: Some(0), kind: TimeoutKind::Response })
    );
    assert_eq!(session.state(0), Some(MotionState::Faulted));

    session.clear_fault(0).unwrap();

    assert_eq!(session.state(0), Some(MotionState::Idle));
    assert_eq!(session.position(0), Some(Pulses(0)));
    let written = line.written();
    assert!(written[0].starts_with("D:1"));
    assert_eq!(&written[1..], ["M:1+P100\r\n", "Q:\r\n"]);
}

#[test]
fn test_rejected_status_poll_faults_moving_axis() {
    let (sim, mut session) = connected(ControllerModel::Shot302Gs, &[StageModel::Hst100]);

    session.start_move(0, 100.0, Unit::Pulses).unwrap();
    sim.reject_next(Some(4));

    assert_eq!(
        session.wait_for_idle(),
        Err(Error::Rejected { axis: Some(0), code: 4 })
    );
    assert_eq!(session.state(0), Some(MotionState::Faulted));

    // Still driving on the first poll, at rest on the second
    assert_eq!(
        session.clear_fault(0),
        Err(Error::Busy { axis: 0, state: MotionState::Faulted })
    );
    session.clear_fault(0).unwrap();
    assert_eq!(session.state(0), Some(MotionState::Idle));
    assert_eq!(session.position(0), Some(Pulses(100)));
}

#[test]
fn test_controller_without_command_replies() {
    let mut spec = ControllerModel::Shot302Gs.spec();
    spec.grammar.command_replies = false;
    let sim = Simulator::new(spec.clone());
    let mut session = Session::new(spec, sim.connector(), NoopDelay::new()).unwrap();
    session.append_stage(StageModel::Hst100).unwrap();
    session.connect(&SerialSettings::new("sim")).unwrap();

    assert_eq!(session.move_axis(0, 300.0, Unit::Pulses), Ok(Pulses(300)));
    assert_eq!(sim.position(0), Pulses(300));

    session.set_origin(Selector::Axis(0)).unwrap();
    assert_eq!(session.query_position(0), Ok(Pulses(0)));
    assert_eq!(session.state(0), Some(MotionState::Idle));
}

#[test]
fn test_motion_timeout() {
    let (sim, mut session) = disconnected(ControllerModel::Shot302Gs, &[StageModel::Hst100]);
    session
        .connect(
            &SerialSettings::new("sim")
                .poll_interval_ms(100)
                .motion_timeout_ms(500),
        )
        .unwrap();
    sim.set_motion_polls(1000);

    assert_eq!(
        session.move_axis(0, 100.0, Unit::Pulses),
        Err(Error::Timeout { axis: Some(0), kind: TimeoutKind::Motion })
    );
    assert_eq!(session.state(0), Some(MotionState::Faulted));
    // No implicit stop on timeout
    assert!(frames_starting_with(&sim, "L:").is_empty());
    assert!(sim.is_busy());
}

// =============================================================================
// Busy axes and non-blocking motion
// =============================================================================

#[test]
fn test_move_on_moving_axis_is_busy() {
    let (sim, mut session) = connected(ControllerModel::Shot302Gs, &[StageModel::Hst100]);

    session.start_move(0, 100.0, Unit::Pulses).unwrap();
    assert_eq!(session.state(0), Some(MotionState::Moving));
    let sent = sim.frames().len();

    assert_eq!(
        session.move_axis(0, 50.0, Unit::Pulses),
        Err(Error::Busy { axis: 0, state: MotionState::Moving })
    );
    assert_eq!(
        session.query_position(0),
        Err(Error::Busy { axis: 0, state: MotionState::Moving })
    );
    assert_eq!(sim.frames().len(), sent);

    session.wait_for_idle().unwrap();
    assert_eq!(session.state(0), Some(MotionState::Idle));
    assert_eq!(session.position(0), Some(Pulses(100)));
}

#[test]
fn test_is_busy_polls_ready_token() {
    let (sim, mut session) = connected(ControllerModel::Shot304Gs, &[StageModel::Hst100]);
    sim.set_motion_polls(2);

    session.start_move(0, 100.0, Unit::Pulses).unwrap();
    assert_eq!(session.is_busy(), Ok(true));
    assert_eq!(session.is_busy(), Ok(true));
    assert_eq!(session.is_busy(), Ok(false));
    assert_eq!(session.state(0), Some(MotionState::Idle));
    assert_eq!(session.position(0), Some(Pulses(100)));
    assert!(frames_starting_with(&sim, "!:").len() == 3);
}

// =============================================================================
// Multi-axis moves
// =============================================================================

#[test]
fn test_combined_move_uses_one_frame() {
    let (sim, mut session) = connected(
        ControllerModel::Shot302Gs,
        &[StageModel::Hst100, StageModel::Hst100],
    );

    session.move_axes(&[(1, 200.0), (0, -100.0)], Unit::Pulses).unwrap();

    assert_eq!(frames_starting_with(&sim, "M:"), ["M:W-P100+P200\r\n"]);
    assert_eq!(session.position(0), Some(Pulses(-100)));
    assert_eq!(session.position(1), Some(Pulses(200)));
    assert_eq!(sim.position(1), Pulses(200));
}

#[test]
fn test_sequential_moves_in_ascending_order() {
    let mut spec = ControllerModel::Shot302Gs.spec();
    spec.combined_moves = false;
    let sim = Simulator::new(spec.clone());
    let mut session = Session::new(spec, sim.connector(), NoopDelay::new()).unwrap();
    session.append_stage(StageModel::Hst100).unwrap();
    session.append_stage(StageModel::Hst100).unwrap();
    session.connect(&SerialSettings::new("sim")).unwrap();

    session.move_axes(&[(1, 200.0), (0, 100.0)], Unit::Pulses).unwrap();

    let frames = sim.frames();
    let first = frames.iter().position(|f| f == "M:1+P100\r\n").unwrap();
    let second = frames.iter().position(|f| f == "M:2+P200\r\n").unwrap();
    assert!(first < second);
    // Axis 0 finished before axis 1 was commanded
    assert!(frames[first..second].iter().any(|f| f == "Q:\r\n"));
    assert_eq!(session.position(0), Some(Pulses(100)));
    assert_eq!(session.position(1), Some(Pulses(200)));
}

#[test]
fn test_multi_axis_validation_before_sending() {
    let (sim, mut session) = connected(
        ControllerModel::Shot302Gs,
        &[StageModel::Sgsp26_100, StageModel::Sgsp26_100],
    );

    assert_eq!(
        session.move_axes(&[(0, 1.0), (0, 2.0)], Unit::Pulses),
        Err(Error::Encoding(EncodingError::DuplicateAxis(0)))
    );
    assert_eq!(
        session.move_axes(&[(0, 1.0), (1, 99_999.0)], Unit::Pulses),
        Err(Error::Encoding(EncodingError::TravelLimit {
            axis: 1,
            target: 99_999,
            min: -25_000,
            max: 25_000,
        }))
    );
    assert_eq!(
        session.move_axes(&[], Unit::Pulses),
        Err(Error::Encoding(EncodingError::EmptyRequest))
    );
    assert!(sim.frames().is_empty());
}

// =============================================================================
// Stop and abort
// =============================================================================

#[test]
fn test_stop_jog_refreshes_position() {
    let (sim, mut session) = connected(ControllerModel::Shot302Gs, &[StageModel::Sgsp60Yaw]);

    session.jog(0, Direction::Negative).unwrap();
    assert_eq!(session.state(0), Some(MotionState::Moving));
    assert_eq!(session.is_busy(), Ok(true));
    assert_eq!(session.is_busy(), Ok(true));

    session.stop(Selector::Axis(0)).unwrap();

    assert_eq!(session.state(0), Some(MotionState::Idle));
    assert_eq!(session.position(0), Some(sim.position(0)));
    assert_eq!(sim.position(0), Pulses(-200));
    assert_eq!(frames_starting_with(&sim, "J:"), ["J:1-\r\n"]);
    assert_eq!(frames_starting_with(&sim, "L:"), ["L:1\r\n"]);
}

#[test]
fn test_stop_on_idle_axis_is_still_sent() {
    let (sim, mut session) = connected(ControllerModel::Shot304Gs, &[StageModel::Hst50]);

    session.stop(Selector::All).unwrap();

    assert_eq!(frames_starting_with(&sim, "L:"), ["L:W\r\n"]);
    assert_eq!(session.state(0), Some(MotionState::Idle));
}

#[test]
fn test_stop_then_home_clears_fault() {
    let (sim, mut session) = connected(ControllerModel::Shot302Gs, &[StageModel::Hst100]);
    sim.go_silent();
    assert!(session.move_axis(0, 10.0, Unit::Pulses).is_err());
    assert_eq!(session.state(0), Some(MotionState::Faulted));
    sim.resume();
    sim.set_position(0, Pulses(700));

    session.stop(Selector::Axis(0)).unwrap();

    assert_eq!(session.state(0), Some(MotionState::Idle));
    assert_eq!(session.position(0), Some(Pulses(700)));

    session.home(0).unwrap();

    assert_eq!(session.state(0), Some(MotionState::Idle));
    assert_eq!(session.position(0), Some(Pulses(0)));
    assert_eq!(frames_starting_with(&sim, "H:"), ["H:1\r\n"]);
}

#[test]
fn test_abort_interrupts_move() {
    let (sim, mut session) = connected(ControllerModel::Shot702, &[StageModel::Sgsp120Yaw]);

    session.start_move(0, 1000.0, Unit::Pulses).unwrap();
    session.abort().unwrap();

    assert_eq!(frames_starting_with(&sim, "L:"), ["L:E\r\n"]);
    assert_eq!(session.state(0), Some(MotionState::Idle));
    assert_eq!(session.position(0), Some(Pulses(500)));
    assert!(!sim.is_busy());
}

// =============================================================================
// Settings commands
// =============================================================================

#[test]
fn test_set_speed_is_clamped() {
    let (sim, mut session) = connected(ControllerModel::Shot302Gs, &[StageModel::Hst100]);

    session.set_speed(0, Speed::new(10, 9000, 5000)).unwrap();

    let clamped = Speed::new(64, 9000, 1000);
    assert_eq!(sim.speed(0), Some(clamped));
    assert_eq!(session.axis(0).unwrap().applied_speed(), Some(clamped));

    sim.clear_frames();
    session.move_axis(0, 10.0, Unit::Pulses).unwrap();
    assert!(frames_starting_with(&sim, "D:").is_empty());
}

#[test]
fn test_home_speed_needs_capable_controller() {
    let (_sim, mut session) = connected(ControllerModel::Shot302Gs, &[StageModel::Hst100]);
    assert_eq!(
        session.set_home_speed(0, Speed::new(100, 1000, 100)),
        Err(Error::Encoding(EncodingError::Unsupported("home speed")))
    );

    let (sim, mut session) = connected(ControllerModel::Shot702, &[StageModel::Hst100]);
    session.set_home_speed(0, Speed::new(100, 1000, 100)).unwrap();
    assert_eq!(sim.home_speed(0), Some(Speed::new(100, 1000, 100)));
}

#[test]
fn test_set_origin_zeroes_position() {
    let (sim, mut session) = connected(ControllerModel::Shot302Gs, &[StageModel::Hst100]);

    session.move_axis(0, 300.0, Unit::Pulses).unwrap();
    session.set_origin(Selector::Axis(0)).unwrap();

    assert_eq!(session.position(0), Some(Pulses(0)));
    assert_eq!(sim.position(0), Pulses(0));
    assert_eq!(frames_starting_with(&sim, "R:"), ["R:1\r\n"]);
}

#[test]
fn test_set_excitation() {
    let (sim, mut session) = connected(
        ControllerModel::Shot302Gs,
        &[StageModel::Hst100, StageModel::Hst100],
    );

    session.set_excitation(Selector::All, Excitation::Free).unwrap();
    assert!(!sim.is_excited(0));
    assert!(!sim.is_excited(1));

    session.set_excitation(Selector::Axis(1), Excitation::Hold).unwrap();
    assert!(sim.is_excited(1));
    assert_eq!(frames_starting_with(&sim, "C:"), ["C:W0\r\n", "C:21\r\n"]);
}

// =============================================================================
// Queries
// =============================================================================

#[test]
fn test_query_position_refreshes_cache() {
    let (sim, mut session) = connected(ControllerModel::Shot302Gs, &[StageModel::Hst100]);
    sim.set_position(0, Pulses(1234));

    assert_eq!(session.query_position(0), Ok(Pulses(1234)));
    assert_eq!(session.position(0), Some(Pulses(1234)));
    assert_eq!(session.state(0), Some(MotionState::Idle));
}

#[test]
fn test_status_report() {
    let (sim, mut session) = connected(
        ControllerModel::Shot302Gs,
        &[StageModel::Hst100, StageModel::Hst100],
    );
    sim.set_position(1, Pulses(-42));

    let report = session.status().unwrap();

    assert_eq!(report.positions.as_slice(), &[Pulses(0), Pulses(-42)]);
    assert!(!report.busy.any());
    assert!(report.accepted);
    assert_eq!(session.position(1), Some(Pulses(-42)));
}

//! In-memory SHOT controller.
//!
//! Parses request frames with the codec, keeps per-axis positions, and queues
//! the replies a real controller would send. Test hooks inject rejections,
//! silence, and garbage.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::string::String;
use std::vec::Vec;
use core::time::Duration;

use log::trace;

use super::{Connector, Port};
use crate::codec::{Codec, Direction, Excitation, Request, Selector};
use crate::error::TransportError;
use crate::profile::{ControllerModel, ControllerSpec, Pulses, Speed, DEFAULT_DIVISION, SUPPORTED_DIVISIONS};

/// Pulses a jogging axis travels per status query.
const JOG_STEP: i64 = 100;

/// Handle to a simulated controller.
///
/// Clones share the same controller, so a test can keep one handle for
/// inspection while the session owns the port.
#[derive(Debug, Clone)]
pub struct Simulator {
    state: Rc<RefCell<SimState>>,
}

#[derive(Debug)]
struct SimState {
    spec: ControllerSpec,
    positions: Vec<i64>,
    speeds: Vec<Option<Speed>>,
    home_speeds: Vec<Option<Speed>>,
    excited: Vec<bool>,
    divisions: Vec<u16>,
    pending: Option<Pending>,
    motion: Option<Motion>,
    motion_polls: u32,
    frames: Vec<String>,
    outbox: VecDeque<Vec<u8>>,
    reject_next: Option<Option<u16>>,
    garbage_next: bool,
    silent: bool,
    fail_open: bool,
    open: bool,
}

/// Drive loaded by `M:`/`A:`/`J:` and started by `G:`.
#[derive(Debug, Clone)]
enum Pending {
    Targets(Vec<(usize, i64)>),
    Jog(usize, Direction),
}

#[derive(Debug, Clone)]
struct Motion {
    kind: Pending,
    remaining: u32,
}

impl Simulator {
    /// Simulate a controller described by a spec.
    pub fn new(spec: ControllerSpec) -> Self {
        let axes = spec.axes();
        Self {
            state: Rc::new(RefCell::new(SimState {
                spec,
                positions: vec![0; axes],
                speeds: vec![None; axes],
                home_speeds: vec![None; axes],
                excited: vec![true; axes],
                divisions: vec![DEFAULT_DIVISION; axes],
                pending: None,
                motion: None,
                motion_polls: 1,
                frames: Vec::new(),
                outbox: VecDeque::new(),
                reject_next: None,
                garbage_next: false,
                silent: false,
                fail_open: false,
                open: false,
            })),
        }
    }

    /// Simulate a catalog controller.
    pub fn for_model(model: ControllerModel) -> Self {
        Self::new(model.spec())
    }

    /// Connector that opens ports onto this controller.
    pub fn connector(&self) -> SimConnector {
        SimConnector { sim: self.clone() }
    }

    /// Every request frame received so far, terminator included.
    pub fn frames(&self) -> Vec<String> {
        self.state.borrow().frames.clone()
    }

    /// Forget the received frames.
    pub fn clear_frames(&self) {
        self.state.borrow_mut().frames.clear();
    }

    /// Controller-side position of an axis.
    pub fn position(&self, axis: usize) -> Pulses {
        Pulses(self.state.borrow().positions[axis])
    }

    /// Overwrite the controller-side position of an axis.
    pub fn set_position(&self, axis: usize, position: Pulses) {
        self.state.borrow_mut().positions[axis] = position.0;
    }

    /// Number of status queries that report busy after a drive starts.
    pub fn set_motion_polls(&self, polls: u32) {
        self.state.borrow_mut().motion_polls = polls;
    }

    /// Answer the next request with the NACK token.
    pub fn reject_next(&self, code: Option<u16>) {
        self.state.borrow_mut().reject_next = Some(code);
    }

    /// Answer the next request with bytes outside the grammar.
    pub fn reply_garbage_next(&self) {
        self.state.borrow_mut().garbage_next = true;
    }

    /// Stop answering until [`Simulator::resume`].
    pub fn go_silent(&self) {
        self.state.borrow_mut().silent = true;
    }

    /// Answer requests again.
    pub fn resume(&self) {
        self.state.borrow_mut().silent = false;
    }

    /// Make the next open fail.
    pub fn fail_open(&self, fail: bool) {
        self.state.borrow_mut().fail_open = fail;
    }

    /// Whether a port is open on this controller.
    pub fn is_open(&self) -> bool {
        self.state.borrow().open
    }

    /// Whether a drive is in progress.
    pub fn is_busy(&self) -> bool {
        self.state.borrow().motion.is_some()
    }

    /// Last drive speed set on an axis.
    pub fn speed(&self, axis: usize) -> Option<Speed> {
        self.state.borrow().speeds[axis]
    }

    /// Last origin-return speed set on an axis.
    pub fn home_speed(&self, axis: usize) -> Option<Speed> {
        self.state.borrow().home_speeds[axis]
    }

    /// Whether the motor of an axis is excited.
    pub fn is_excited(&self, axis: usize) -> bool {
        self.state.borrow().excited[axis]
    }

    /// Micro-step division of an axis.
    pub fn division(&self, axis: usize) -> u16 {
        self.state.borrow().divisions[axis]
    }

    /// Change the micro-step division of an axis, as the front panel would.
    pub fn set_division(&self, axis: usize, division: u16) {
        self.state.borrow_mut().divisions[axis] = division;
    }
}

impl SimState {
    fn receive(&mut self, bytes: &[u8]) {
        self.frames
            .push(String::from_utf8_lossy(bytes).into_owned());
        if self.silent {
            return;
        }
        if self.garbage_next {
            self.garbage_next = false;
            self.outbox.push_back(b"?#\r\n".to_vec());
            return;
        }

        let spec = self.spec.clone();
        let codec = Codec::new(&spec);
        let reply = match self.reject_next.take() {
            Some(code) => codec.encode_nack(code),
            None => match codec.decode_request(bytes) {
                Some(request) => {
                    let query = request.is_query();
                    let reply = self.handle(&codec, request);
                    if !query && !spec.grammar.command_replies {
                        return;
                    }
                    reply
                }
                None => codec.encode_nack(None),
            },
        };
        if let Ok(frame) = reply {
            trace!("sim reply {:?}", frame.as_str());
            self.outbox.push_back(frame.as_bytes().to_vec());
        }
    }

    fn handle(
        &mut self,
        codec: &Codec<'_>,
        request: Request,
    ) -> Result<crate::codec::Frame, crate::error::EncodingError> {
        let busy = self.motion.is_some();
        match request {
            Request::StatusQuery => {
                let busy = self.advance();
                let positions: Vec<Pulses> = self.positions.iter().map(|p| Pulses(*p)).collect();
                codec.encode_status(&positions, busy, false)
            }
            Request::ReadyQuery => {
                let busy = self.advance();
                codec.encode_ready(busy)
            }
            Request::Stop(_) | Request::EmergencyStop => {
                self.halt();
                codec.encode_ack()
            }
            Request::DivisionQuery => codec.encode_divisions(&self.divisions),
            _ if busy => codec.encode_nack(None),
            Request::SetDivision { axis, division } => {
                if !SUPPORTED_DIVISIONS.contains(&division) {
                    return codec.encode_nack(None);
                }
                self.divisions[axis] = division;
                codec.encode_ack()
            }
            Request::Move { axis, delta } => {
                self.pending = Some(Pending::Targets(vec![(
                    axis,
                    self.positions[axis] + delta.0,
                )]));
                codec.encode_ack()
            }
            Request::MoveTo { axis, target } => {
                self.pending = Some(Pending::Targets(vec![(axis, target.0)]));
                codec.encode_ack()
            }
            Request::MoveAll(deltas) => {
                let targets = deltas
                    .iter()
                    .enumerate()
                    .map(|(axis, d)| (axis, self.positions[axis] + d.0))
                    .collect();
                self.pending = Some(Pending::Targets(targets));
                codec.encode_ack()
            }
            Request::MoveAllTo(targets) => {
                let targets = targets.iter().enumerate().map(|(axis, t)| (axis, t.0)).collect();
                self.pending = Some(Pending::Targets(targets));
                codec.encode_ack()
            }
            Request::Jog { axis, direction } => {
                self.pending = Some(Pending::Jog(axis, direction));
                codec.encode_ack()
            }
            Request::Go => match self.pending.take() {
                Some(kind) => {
                    self.start(kind);
                    codec.encode_ack()
                }
                None => codec.encode_nack(None),
            },
            Request::Home(selector) => {
                let targets = self.selected(selector).into_iter().map(|axis| (axis, 0)).collect();
                self.start(Pending::Targets(targets));
                codec.encode_ack()
            }
            Request::SetSpeed { axis, speed } => {
                self.speeds[axis] = Some(speed);
                codec.encode_ack()
            }
            Request::SetHomeSpeed { axis, speed } => {
                self.home_speeds[axis] = Some(speed);
                codec.encode_ack()
            }
            Request::SetOrigin(selector) => {
                for axis in self.selected(selector) {
                    self.positions[axis] = 0;
                }
                codec.encode_ack()
            }
            Request::SetExcitation(selector, mode) => {
                for axis in self.selected(selector) {
                    self.excited[axis] = mode == Excitation::Hold;
                }
                codec.encode_ack()
            }
        }
    }

    fn selected(&self, selector: Selector) -> Vec<usize> {
        match selector {
            Selector::Axis(axis) => vec![axis],
            Selector::All => (0..self.positions.len()).collect(),
        }
    }

    fn start(&mut self, kind: Pending) {
        self.motion = Some(Motion {
            remaining: match kind {
                Pending::Jog(..) => u32::MAX,
                Pending::Targets(_) => self.motion_polls,
            },
            kind,
        });
    }

    /// Step the drive by one poll and report whether it is still busy.
    fn advance(&mut self) -> bool {
        let Some(motion) = self.motion.as_mut() else {
            return false;
        };
        if let Pending::Jog(axis, direction) = motion.kind {
            self.positions[axis] += JOG_STEP * direction.sign();
            return true;
        }
        if motion.remaining > 0 {
            motion.remaining -= 1;
            return true;
        }
        if let Some(Motion { kind: Pending::Targets(targets), .. }) = self.motion.take() {
            for (axis, target) in targets {
                self.positions[axis] = target;
            }
        }
        false
    }

    /// Stop any drive. Interrupted moves end halfway to their targets.
    fn halt(&mut self) {
        self.pending = None;
        if let Some(Motion { kind: Pending::Targets(targets), .. }) = self.motion.take() {
            for (axis, target) in targets {
                let from = self.positions[axis];
                self.positions[axis] = from + (target - from) / 2;
            }
        }
    }
}

/// Opens [`SimPort`]s onto a [`Simulator`].
#[derive(Debug, Clone)]
pub struct SimConnector {
    sim: Simulator,
}

impl Connector for SimConnector {
    type Port = SimPort;

    fn open(&mut self, port: &str, baud_rate: u32) -> Result<SimPort, TransportError> {
        let mut state = self.sim.state.borrow_mut();
        if state.fail_open || state.open || !state.spec.supports_baud_rate(baud_rate) {
            return Err(TransportError::Open);
        }
        trace!("sim open {} at {}", port, baud_rate);
        state.open = true;
        state.outbox.clear();
        Ok(SimPort {
            sim: self.sim.clone(),
            closed: false,
        })
    }
}

/// Port onto a [`Simulator`].
#[derive(Debug)]
pub struct SimPort {
    sim: Simulator,
    closed: bool,
}

impl Port for SimPort {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Write);
        }
        self.sim.state.borrow_mut().receive(bytes);
        Ok(())
    }

    fn read_until(
        &mut self,
        terminator: &[u8],
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        if self.closed {
            return Err(TransportError::Read);
        }
        let reply = self
            .sim
            .state
            .borrow_mut()
            .outbox
            .pop_front()
            .ok_or(TransportError::Timeout)?;
        if !reply.ends_with(terminator) {
            return Err(TransportError::Timeout);
        }
        let dst = buf.get_mut(..reply.len()).ok_or(TransportError::Overflow)?;
        dst.copy_from_slice(&reply);
        Ok(reply.len())
    }

    fn discard_input(&mut self) {
        self.sim.state.borrow_mut().outbox.clear();
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.sim.state.borrow_mut().open = false;
        }
    }
}

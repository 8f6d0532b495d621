//! Transport seam between the session and a serial line.
//!
//! The session never touches a device directly. A [`Connector`] opens a
//! [`Port`] at connect time; the port writes request frames and reads
//! terminator-delimited replies.
//!
//! - `serial` (feature `serialport`): real RS-232C ports.
//! - `simulator` (feature `std`): an in-memory SHOT controller for tests and
//!   demos.

use core::time::Duration;

use crate::error::TransportError;

#[cfg(feature = "serialport")]
mod serial;
#[cfg(feature = "std")]
mod simulator;

#[cfg(feature = "serialport")]
pub use serial::{SerialConnector, SerialLine};
#[cfg(feature = "std")]
pub use simulator::{SimConnector, SimPort, Simulator};

/// `DelayNs` backed by `std::thread::sleep`.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

#[cfg(feature = "std")]
impl embedded_hal::delay::DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }
}

/// Opens ports by name.
pub trait Connector {
    /// Port type produced by this connector.
    type Port: Port;

    /// Open a port at a baud rate.
    ///
    /// # Errors
    ///
    /// `TransportError::Open` if the port does not exist or cannot be claimed.
    fn open(&mut self, port: &str, baud_rate: u32) -> Result<Self::Port, TransportError>;
}

/// An open serial line.
pub trait Port {
    /// Write every byte of a frame.
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Read into `buf` until the received bytes end with `terminator`.
    ///
    /// Returns the number of bytes read, terminator included.
    ///
    /// # Errors
    ///
    /// `Timeout` if no complete reply arrives within `timeout`, `Overflow` if
    /// the reply does not fit `buf`.
    fn read_until(
        &mut self,
        terminator: &[u8],
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    /// Drop any bytes received but not yet read.
    ///
    /// Called after a timeout or an undecodable reply so that a late answer
    /// is not taken as the reply to the next request.
    fn discard_input(&mut self) {}

    /// Release the line. Called once on disconnect or drop.
    fn close(&mut self) {}
}

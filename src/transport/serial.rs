//! RS-232C ports through the `serialport` crate.

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use log::{debug, warn};

use super::{Connector, Port};
use crate::error::TransportError;

/// Opens system serial ports with the SHOT line settings: 8 data bits, no
/// parity, 1 stop bit, RTS/CTS flow control.
#[derive(Debug, Clone, Copy)]
pub struct SerialConnector {
    hardware_flow_control: bool,
}

impl SerialConnector {
    /// Connector with hardware flow control enabled.
    pub fn new() -> Self {
        Self {
            hardware_flow_control: true,
        }
    }

    /// Disable RTS/CTS, for adapters that do not wire the handshake lines.
    pub fn without_flow_control(mut self) -> Self {
        self.hardware_flow_control = false;
        self
    }
}

impl Default for SerialConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for SerialConnector {
    type Port = SerialLine;

    fn open(&mut self, port: &str, baud_rate: u32) -> Result<SerialLine, TransportError> {
        let flow = if self.hardware_flow_control {
            serialport::FlowControl::Hardware
        } else {
            serialport::FlowControl::None
        };
        let inner = serialport::new(port, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(flow)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| {
                warn!("Failed to open serial port '{}' at {} baud: {}", port, baud_rate, e);
                TransportError::Open
            })?;
        debug!("Serial port '{}' opened at {} baud", port, baud_rate);
        Ok(SerialLine { inner: Some(inner) })
    }
}

/// An open system serial port.
pub struct SerialLine {
    inner: Option<Box<dyn serialport::SerialPort>>,
}

impl core::fmt::Debug for SerialLine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SerialLine")
            .field("name", &self.inner.as_ref().and_then(|p| p.name()))
            .finish()
    }
}

impl Port for SerialLine {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let port = self.inner.as_mut().ok_or(TransportError::Write)?;
        port.write_all(bytes)
            .and_then(|_| port.flush())
            .map_err(|e| {
                warn!("Serial write failed: {}", e);
                TransportError::Write
            })
    }

    fn read_until(
        &mut self,
        terminator: &[u8],
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        let port = self.inner.as_mut().ok_or(TransportError::Read)?;
        let deadline = Instant::now() + timeout;
        let mut len = 0;

        loop {
            if buf[..len].ends_with(terminator) && len > 0 {
                return Ok(len);
            }
            if len == buf.len() {
                return Err(TransportError::Overflow);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(TransportError::Timeout);
            }
            port.set_timeout(deadline - now).map_err(|_| TransportError::Read)?;

            match port.read(&mut buf[len..len + 1]) {
                Ok(0) => return Err(TransportError::Read),
                Ok(n) => len += n,
                Err(e) if e.kind() == ErrorKind::TimedOut => continue,
                Err(e) => {
                    warn!("Serial read failed: {}", e);
                    return Err(TransportError::Read);
                }
            }
        }
    }

    fn discard_input(&mut self) {
        if let Some(port) = self.inner.as_mut() {
            if let Err(e) = port.clear(serialport::ClearBuffer::Input) {
                warn!("Failed to clear serial input: {}", e);
            }
        }
    }

    fn close(&mut self) {
        if let Some(port) = self.inner.take() {
            debug!("Serial port '{}' closed", port.name().unwrap_or_default());
        }
    }
}

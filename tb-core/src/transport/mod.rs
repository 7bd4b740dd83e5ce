//! Byte transport abstraction
//!
//! The driver only needs five operations from the link to the controller.
//! `SerialTransport` provides them over a serial port (usually the FTDI
//! bridge built into the controller); `ScriptedTransport` provides them from
//! memory for tests and offline replay.

mod scripted;
mod serial;

use std::io;
use std::time::Duration;

use crate::constants::timing;

pub use scripted::ScriptedTransport;
pub use serial::SerialTransport;

/// Duplex byte stream to one controller
#[cfg_attr(test, mockall::automock)]
pub trait Transport {
    /// Number of received bytes waiting in the input buffer
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Fill `buf` completely, blocking up to the transport's read timeout
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Write all of `bytes`
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Drop everything currently in the input buffer
    fn discard_input_buffer(&mut self) -> io::Result<()>;

    /// Release the underlying handle. Calling it twice is harmless.
    fn close(&mut self);
}

/// Where and how to open a serial transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Port identifier, e.g. `/dev/ttyUSB0` or `COM3`
    pub port: String,
    /// Upper bound for a single blocking read
    pub read_timeout: Duration,
}

impl TransportConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            read_timeout: Duration::from_millis(timing::DEFAULT_READ_TIMEOUT_MS),
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn bytes_available(&mut self) -> io::Result<usize> {
        (**self).bytes_available()
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_exact(buf)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write(bytes)
    }

    fn discard_input_buffer(&mut self) -> io::Result<()> {
        (**self).discard_input_buffer()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

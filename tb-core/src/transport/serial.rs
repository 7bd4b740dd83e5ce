//! Serial port transport (19200 baud, 8N1)

use std::io::{self, Read, Write};

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::debug;

use super::{Transport, TransportConfig};
use crate::constants::serial;
use tb_error::{Result, TBalancerError};

pub struct SerialTransport {
    port_name: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Open `config.port` with the controller's fixed line settings
    pub fn open(config: &TransportConfig) -> Result<Self> {
        let port = serialport::new(config.port.as_str(), serial::BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.read_timeout)
            .open()
            .map_err(|e| TBalancerError::serial_open(config.port.as_str(), e.to_string()))?;

        debug!("Opened {} at {} baud", config.port, serial::BAUD_RATE);
        Ok(Self {
            port_name: config.port.clone(),
            port: Some(port),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn handle(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port is closed"))
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port_name", &self.port_name)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Transport for SerialTransport {
    fn bytes_available(&mut self) -> io::Result<usize> {
        let count = self.handle()?.bytes_to_read().map_err(io::Error::from)?;
        Ok(count as usize)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        Read::read_exact(self.handle()?, buf)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let port = self.handle()?;
        port.write_all(bytes)?;
        port.flush()
    }

    fn discard_input_buffer(&mut self) -> io::Result<()> {
        self.handle()?
            .clear(ClearBuffer::Input)
            .map_err(io::Error::from)
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("Closed {}", self.port_name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_port_fails_with_port_name() {
        let cfg = TransportConfig::new("/dev/tbalancer-test-does-not-exist");
        let err = SerialTransport::open(&cfg).unwrap_err();
        match err {
            TBalancerError::SerialOpen { port, .. } => {
                assert_eq!(port, "/dev/tbalancer-test-does-not-exist")
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

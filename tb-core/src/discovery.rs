//! Controller discovery
//!
//! The controller appears as an FTDI USB serial port. Discovery lists serial
//! ports with FTDI bridges first; probing sends one poll request and checks
//! that a frame with the right start flag and protocol revision comes back.

use std::time::{Duration, Instant};

use serde::Serialize;
use serialport::SerialPortType;
use tracing::{debug, info};

use crate::constants::{frame as layout, protocol, serial, timing};
use crate::frame::read_frame;
use crate::transport::{SerialTransport, Transport, TransportConfig};
use tb_error::{InvalidFrame, Result, TBalancerError};

/// USB identity of a serial port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsbIds {
    pub vid: u16,
    pub pid: u16,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

/// A serial port that might host a controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortCandidate {
    pub port: String,
    pub usb: Option<UsbIds>,
    pub likely_controller: bool,
}

impl PortCandidate {
    pub fn new(port: impl Into<String>, usb: Option<UsbIds>) -> Self {
        let likely_controller = usb
            .as_ref()
            .is_some_and(|ids| ids.vid == serial::FTDI_VENDOR_ID);
        Self {
            port: port.into(),
            usb,
            likely_controller,
        }
    }
}

/// All serial ports, likely controllers first, then by name
pub fn discover_ports() -> Result<Vec<PortCandidate>> {
    let ports = serialport::available_ports()
        .map_err(|e| TBalancerError::PortEnumeration(e.to_string()))?;

    let candidates = ports
        .into_iter()
        .map(|info| {
            let usb = match info.port_type {
                SerialPortType::UsbPort(usb) => Some(UsbIds {
                    vid: usb.vid,
                    pid: usb.pid,
                    serial_number: usb.serial_number,
                    manufacturer: usb.manufacturer,
                    product: usb.product,
                }),
                _ => None,
            };
            PortCandidate::new(info.port_name, usb)
        })
        .collect();

    Ok(sort_candidates(candidates))
}

fn sort_candidates(mut candidates: Vec<PortCandidate>) -> Vec<PortCandidate> {
    candidates.sort_by(|a, b| {
        b.likely_controller
            .cmp(&a.likely_controller)
            .then_with(|| a.port.cmp(&b.port))
    });
    candidates
}

/// Result of probing one port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Ready { protocol_version: u8 },
    WrongProtocolVersion { found: u8, expected: u8 },
    BadReply { marker: u8 },
    NoReply,
    TransportError { reason: String },
    OpenFailed { reason: String },
}

impl ProbeOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, ProbeOutcome::Ready { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            ProbeOutcome::Ready { protocol_version } => {
                format!("{} (protocol 0x{:02X})", protocol::DEVICE_NAME, protocol_version)
            }
            ProbeOutcome::WrongProtocolVersion { found, expected } => format!(
                "wrong protocol version 0x{:02X} (expected 0x{:02X})",
                found, expected
            ),
            ProbeOutcome::BadReply { marker } => format!("unexpected reply (first byte {})", marker),
            ProbeOutcome::NoReply => "no reply".to_string(),
            ProbeOutcome::TransportError { reason } => format!("transport error: {}", reason),
            ProbeOutcome::OpenFailed { reason } => format!("cannot open: {}", reason),
        }
    }
}

/// Send one poll request over an open transport and classify the reply
pub fn probe_transport<T: Transport + ?Sized>(
    transport: &mut T,
    expected_version: u8,
    timeout: Duration,
) -> ProbeOutcome {
    let transport_error = |e: std::io::Error| ProbeOutcome::TransportError {
        reason: e.to_string(),
    };

    if let Err(e) = transport.discard_input_buffer() {
        return transport_error(e);
    }
    if let Err(e) = transport.write(&[protocol::POLL_REQUEST]) {
        return transport_error(e);
    }

    let deadline = Instant::now() + timeout;
    loop {
        match transport.bytes_available() {
            Ok(n) if n >= layout::LEN => break,
            Ok(_) => {}
            Err(e) => return transport_error(e),
        }
        if Instant::now() >= deadline {
            return ProbeOutcome::NoReply;
        }
        std::thread::sleep(timing::PROBE_POLL_STEP);
    }

    match read_frame(transport, expected_version) {
        Ok(frame) => ProbeOutcome::Ready {
            protocol_version: frame.protocol_version(),
        },
        Err(e) => match e.reason() {
            InvalidFrame::BadMarker(marker) => ProbeOutcome::BadReply { marker: *marker },
            InvalidFrame::VersionMismatch { expected, found } => {
                ProbeOutcome::WrongProtocolVersion {
                    found: *found,
                    expected: *expected,
                }
            }
            InvalidFrame::Transport(reason) => ProbeOutcome::TransportError {
                reason: reason.clone(),
            },
        },
    }
}

/// Open `config.port`, probe it, and close it again
pub fn probe_port(config: &TransportConfig, expected_version: u8, timeout: Duration) -> ProbeOutcome {
    let mut transport = match SerialTransport::open(config) {
        Ok(t) => t,
        Err(e) => {
            return ProbeOutcome::OpenFailed {
                reason: e.to_string(),
            }
        }
    };
    let outcome = probe_transport(&mut transport, expected_version, timeout);
    transport.close();
    debug!("Probe of {}: {:?}", config.port, outcome);
    outcome
}

/// First candidate that answers with a valid frame
pub fn find_controller(
    candidates: &[PortCandidate],
    template: &TransportConfig,
    expected_version: u8,
    timeout: Duration,
) -> Option<String> {
    candidates.iter().find_map(|candidate| {
        let config = TransportConfig {
            port: candidate.port.clone(),
            ..template.clone()
        };
        probe_port(&config, expected_version, timeout)
            .is_ready()
            .then(|| {
                info!("Found controller on {}", candidate.port);
                candidate.port.clone()
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::protocol::DEFAULT_PROTOCOL_VERSION;
    use crate::frame::tests::blank_frame;
    use crate::transport::ScriptedTransport;

    const TIMEOUT: Duration = Duration::from_millis(30);

    fn ftdi() -> Option<UsbIds> {
        Some(UsbIds {
            vid: 0x0403,
            pid: 0x6001,
            serial_number: Some("A1B2".into()),
            manufacturer: Some("FTDI".into()),
            product: None,
        })
    }

    #[test]
    fn test_ftdi_ports_sort_first() {
        let sorted = sort_candidates(vec![
            PortCandidate::new("/dev/ttyS0", None),
            PortCandidate::new("/dev/ttyUSB1", ftdi()),
            PortCandidate::new("/dev/ttyACM0", None),
            PortCandidate::new("/dev/ttyUSB0", ftdi()),
        ]);
        let names: Vec<&str> = sorted.iter().map(|c| c.port.as_str()).collect();
        assert_eq!(names, ["/dev/ttyUSB0", "/dev/ttyUSB1", "/dev/ttyACM0", "/dev/ttyS0"]);
        assert!(sorted[0].likely_controller);
        assert!(!sorted[2].likely_controller);
    }

    #[test]
    fn test_probe_ready() {
        let mut t = ScriptedTransport::new();
        t.push_bytes(&[1, 2, 3]);
        t.queue_reply(blank_frame().to_vec());

        let outcome = probe_transport(&mut t, DEFAULT_PROTOCOL_VERSION, TIMEOUT);
        assert_eq!(outcome, ProbeOutcome::Ready { protocol_version: 0x2A });
        assert_eq!(t.discard_count(), 1);
        assert_eq!(t.poll_requests(), 1);
    }

    #[test]
    fn test_probe_wrong_version() {
        let mut t = ScriptedTransport::new();
        let mut bytes = blank_frame();
        bytes[274] = 0x30;
        t.queue_reply(bytes.to_vec());

        let outcome = probe_transport(&mut t, DEFAULT_PROTOCOL_VERSION, TIMEOUT);
        assert_eq!(
            outcome,
            ProbeOutcome::WrongProtocolVersion { found: 0x30, expected: 0x2A }
        );
        assert!(!outcome.is_ready());
        assert!(outcome.describe().contains("0x30"));
    }

    #[test]
    fn test_probe_bad_reply_and_silence() {
        let mut t = ScriptedTransport::new();
        let mut bytes = blank_frame();
        bytes[0] = 7;
        t.queue_reply(bytes.to_vec());
        assert_eq!(
            probe_transport(&mut t, DEFAULT_PROTOCOL_VERSION, TIMEOUT),
            ProbeOutcome::BadReply { marker: 7 }
        );

        let mut silent = ScriptedTransport::new();
        assert_eq!(
            probe_transport(&mut silent, DEFAULT_PROTOCOL_VERSION, TIMEOUT),
            ProbeOutcome::NoReply
        );
    }

    #[test]
    fn test_probe_write_failure() {
        let mut t = ScriptedTransport::new();
        t.fail_next_write();
        assert!(matches!(
            probe_transport(&mut t, DEFAULT_PROTOCOL_VERSION, TIMEOUT),
            ProbeOutcome::TransportError { .. }
        ));
    }

    #[test]
    fn test_probe_missing_port() {
        let cfg = TransportConfig::new("/dev/tbalancer-test-does-not-exist");
        assert!(matches!(
            probe_port(&cfg, DEFAULT_PROTOCOL_VERSION, TIMEOUT),
            ProbeOutcome::OpenFailed { .. }
        ));
    }
}

//! Telemetry frame reader and decoders
//!
//! The controller answers each poll request with a fixed 285-byte frame.
//! A frame is accepted only when byte 0 is the start flag and byte 274
//! matches the protocol revision the session expects. Decoding never
//! happens on an unvalidated buffer: the only way to get a `Frame` is
//! through `Frame::parse` or `read_frame`.
//!
//! # Layout
//!
//! | Offset    | Meaning                                          |
//! |-----------|--------------------------------------------------|
//! | 0         | start flag (100)                                 |
//! | 136       | fan mode bits (bit i: 0 = PWM, 1 = analog)       |
//! | 141..145  | analog duty % per fan                            |
//! | 148..156  | max RPM per fan, little-endian u16, x11.5        |
//! | 156..160  | PWM duty % per fan                               |
//! | 238..246  | digital temperatures, x0.5 °C, 0 = absent        |
//! | 260..264  | analog temperatures, x0.5 °C, 0 = absent         |
//! | 274       | protocol version                                 |

use std::fmt;

use tracing::{debug, warn};

use crate::constants::{channels, frame};
use crate::transport::Transport;
use tb_error::{FrameError, InvalidFrame};

/// Duty encoding selected per fan by the mode bitfield
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanMode {
    Pwm,
    Analog,
}

/// One validated telemetry frame
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: [u8; frame::LEN],
}

impl Frame {
    /// Validate a raw buffer against the start flag and `expected_version`
    pub fn parse(bytes: [u8; frame::LEN], expected_version: u8) -> Result<Self, FrameError> {
        let marker = bytes[frame::START_FLAG_OFFSET];
        if marker != frame::START_FLAG {
            return Err(InvalidFrame::BadMarker(marker).into());
        }
        let found = bytes[frame::PROTOCOL_VERSION_OFFSET];
        if found != expected_version {
            return Err(InvalidFrame::VersionMismatch {
                expected: expected_version,
                found,
            }
            .into());
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; frame::LEN] {
        &self.bytes
    }

    pub fn protocol_version(&self) -> u8 {
        self.bytes[frame::PROTOCOL_VERSION_OFFSET]
    }

    pub fn digital_temp_raw(&self, index: usize) -> u8 {
        assert!(index < channels::DIGITAL_TEMPERATURES, "digital channel {index} out of range");
        self.bytes[frame::DIGITAL_TEMP_OFFSET + index]
    }

    /// Digital temperature in °C, `None` when the probe is not connected
    pub fn digital_temp(&self, index: usize) -> Option<f32> {
        scale_temperature(self.digital_temp_raw(index))
    }

    pub fn analog_temp_raw(&self, index: usize) -> u8 {
        assert!(index < channels::ANALOG_TEMPERATURES, "analog channel {index} out of range");
        self.bytes[frame::ANALOG_TEMP_OFFSET + index]
    }

    /// Analog temperature in °C, `None` when the probe is not connected
    pub fn analog_temp(&self, index: usize) -> Option<f32> {
        scale_temperature(self.analog_temp_raw(index))
    }

    /// Raw max RPM word for a fan: `low | high << 8`
    pub fn fan_max_rpm_raw(&self, index: usize) -> u16 {
        assert!(index < channels::FANS, "fan {index} out of range");
        let low = self.bytes[frame::FAN_MAX_RPM_OFFSET + 2 * index];
        let high = self.bytes[frame::FAN_MAX_RPM_OFFSET + 2 * index + 1];
        u16::from_le_bytes([low, high])
    }

    pub fn fan_max_rpm(&self, index: usize) -> f32 {
        self.fan_max_rpm_raw(index) as f32 * frame::MAX_RPM_SCALE
    }

    /// True when bit `index` of the mode byte is set
    pub fn fan_mode_is_manual_analog(&self, index: usize) -> bool {
        assert!(index < channels::FANS, "fan {index} out of range");
        self.bytes[frame::FAN_MODE_OFFSET] & (1 << index) != 0
    }

    pub fn fan_mode(&self, index: usize) -> FanMode {
        if self.fan_mode_is_manual_analog(index) {
            FanMode::Analog
        } else {
            FanMode::Pwm
        }
    }

    /// Duty percent from the register selected by the fan's mode
    pub fn fan_duty(&self, index: usize) -> u8 {
        match self.fan_mode(index) {
            FanMode::Pwm => self.bytes[frame::FAN_PWM_DUTY_OFFSET + index],
            FanMode::Analog => self.bytes[frame::FAN_ANALOG_DUTY_OFFSET + index],
        }
    }

    /// Estimated fan speed in RPM using this frame's max RPM
    pub fn fan_value(&self, index: usize) -> f32 {
        self.fan_value_with_max_rpm(index, self.fan_max_rpm(index))
    }

    /// Estimated fan speed in RPM using a caller-supplied max RPM
    pub fn fan_value_with_max_rpm(&self, index: usize, max_rpm: f32) -> f32 {
        max_rpm * 0.01 * self.fan_duty(index) as f32
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("len", &self.bytes.len())
            .field("protocol_version", &format_args!("{:#04x}", self.protocol_version()))
            .finish()
    }
}

fn scale_temperature(raw: u8) -> Option<f32> {
    (raw > 0).then(|| raw as f32 * frame::TEMPERATURE_SCALE)
}

/// Read and validate one frame from `transport`.
///
/// The caller must already know that a full frame is buffered. On a bad
/// marker or version the input buffer is discarded so the next poll starts
/// on a frame boundary. The rejection reason is returned even if that
/// discard fails.
pub fn read_frame<T: Transport + ?Sized>(
    transport: &mut T,
    expected_version: u8,
) -> Result<Frame, FrameError> {
    let mut bytes = [0u8; frame::LEN];
    transport
        .read_exact(&mut bytes)
        .map_err(|e| InvalidFrame::Transport(e.to_string()))?;

    match Frame::parse(bytes, expected_version) {
        Ok(frame) => Ok(frame),
        Err(err) => {
            debug!("Rejected frame ({}), discarding input buffer", err);
            if let Err(e) = transport.discard_input_buffer() {
                warn!("Failed to discard input after rejected frame: {}", e);
            }
            Err(err)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::constants::protocol::DEFAULT_PROTOCOL_VERSION;
    use crate::transport::{MockTransport, ScriptedTransport};

    /// Empty but valid frame bytes
    pub(crate) fn blank_frame() -> [u8; frame::LEN] {
        let mut bytes = [0u8; frame::LEN];
        bytes[0] = frame::START_FLAG;
        bytes[frame::PROTOCOL_VERSION_OFFSET] = DEFAULT_PROTOCOL_VERSION;
        bytes
    }

    fn parse(bytes: [u8; frame::LEN]) -> Frame {
        Frame::parse(bytes, DEFAULT_PROTOCOL_VERSION).unwrap()
    }

    #[test]
    fn test_rejects_bad_marker() {
        for marker in [0u8, 99, 101, 255] {
            let mut bytes = blank_frame();
            bytes[0] = marker;
            assert_eq!(
                Frame::parse(bytes, DEFAULT_PROTOCOL_VERSION),
                Err(FrameError::Invalid(InvalidFrame::BadMarker(marker)))
            );
        }
    }

    #[test]
    fn test_rejects_version_mismatch() {
        let mut bytes = blank_frame();
        bytes[frame::PROTOCOL_VERSION_OFFSET] = 0x29;
        assert_eq!(
            Frame::parse(bytes, DEFAULT_PROTOCOL_VERSION),
            Err(FrameError::Invalid(InvalidFrame::VersionMismatch {
                expected: 0x2A,
                found: 0x29
            }))
        );
    }

    #[test]
    fn test_temperature_scaling() {
        let mut bytes = blank_frame();
        bytes[238] = 20;
        bytes[245] = 255;
        bytes[260] = 1;
        bytes[263] = 90;
        let f = parse(bytes);

        assert_eq!(f.digital_temp(0), Some(10.0));
        assert_eq!(f.digital_temp(7), Some(127.5));
        assert_eq!(f.analog_temp(0), Some(0.5));
        assert_eq!(f.analog_temp(3), Some(45.0));
    }

    #[test]
    fn test_zero_temperature_is_absent() {
        let f = parse(blank_frame());
        for i in 0..channels::DIGITAL_TEMPERATURES {
            assert_eq!(f.digital_temp(i), None);
            assert_eq!(f.digital_temp_raw(i), 0);
        }
        for i in 0..channels::ANALOG_TEMPERATURES {
            assert_eq!(f.analog_temp(i), None);
        }
    }

    #[test]
    fn test_fan_pwm_mode_example() {
        let mut bytes = blank_frame();
        bytes[148] = 0x64;
        bytes[149] = 0x00;
        bytes[156] = 50;
        let f = parse(bytes);

        assert_eq!(f.fan_mode(0), FanMode::Pwm);
        assert_eq!(f.fan_max_rpm(0), 1150.0);
        assert!((f.fan_value(0) - 575.0).abs() < 1e-3);
    }

    #[test]
    fn test_fan_analog_mode_uses_analog_duty() {
        let mut bytes = blank_frame();
        bytes[136] = 0b0000_0100;
        // fan 2: max word 0x0100 = 256
        bytes[152] = 0x00;
        bytes[153] = 0x01;
        bytes[141 + 2] = 80;
        bytes[156 + 2] = 10;
        let f = parse(bytes);

        assert!(f.fan_mode_is_manual_analog(2));
        assert!(!f.fan_mode_is_manual_analog(0));
        assert_eq!(f.fan_duty(2), 80);
        assert_eq!(f.fan_max_rpm_raw(2), 256);
        assert_eq!(f.fan_max_rpm(2), 2944.0);
        assert!((f.fan_value(2) - 2355.2).abs() < 1e-2);
    }

    #[test]
    fn test_read_frame_valid() {
        let mut transport = ScriptedTransport::new();
        let mut bytes = blank_frame();
        bytes[238] = 44;
        transport.push_bytes(&bytes);

        let f = read_frame(&mut transport, DEFAULT_PROTOCOL_VERSION).unwrap();
        assert_eq!(f.digital_temp(0), Some(22.0));
        assert_eq!(transport.discard_count(), 0);
    }

    #[test]
    fn test_read_frame_invalid_discards_input() {
        let mut transport = MockTransport::new();
        transport.expect_read_exact().times(1).returning(|buf| {
            buf.fill(0);
            Ok(())
        });
        transport
            .expect_discard_input_buffer()
            .times(1)
            .returning(|| Ok(()));

        let err = read_frame(&mut transport, DEFAULT_PROTOCOL_VERSION).unwrap_err();
        assert_eq!(err, FrameError::Invalid(InvalidFrame::BadMarker(0)));
    }

    #[test]
    fn test_read_frame_keeps_reason_when_discard_fails() {
        let mut transport = MockTransport::new();
        transport.expect_read_exact().times(1).returning(|buf| {
            buf.fill(0);
            buf[0] = frame::START_FLAG;
            buf[frame::PROTOCOL_VERSION_OFFSET] = 0x30;
            Ok(())
        });
        transport
            .expect_discard_input_buffer()
            .times(1)
            .returning(|| Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone")));

        let err = read_frame(&mut transport, DEFAULT_PROTOCOL_VERSION).unwrap_err();
        assert_eq!(
            err,
            FrameError::Invalid(InvalidFrame::VersionMismatch {
                expected: 0x2A,
                found: 0x30
            })
        );
        assert!(!err.is_transport());
    }

    #[test]
    fn test_read_frame_io_error_is_invalid() {
        let mut transport = MockTransport::new();
        transport.expect_read_exact().times(1).returning(|_| {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
        });
        transport.expect_discard_input_buffer().never();

        let err = read_frame(&mut transport, DEFAULT_PROTOCOL_VERSION).unwrap_err();
        assert!(err.is_transport());
    }
}

/*
 * Test helpers shared by the unit tests in this crate
 */

use std::io::Write;

use tb_core::constants::{frame as layout, protocol};
use tempfile::NamedTempFile;

/// Builds raw reply frames byte by byte
#[derive(Clone)]
pub struct FrameBuilder {
    bytes: Vec<u8>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        let mut bytes = vec![0u8; layout::LEN];
        bytes[layout::START_FLAG_OFFSET] = layout::START_FLAG;
        bytes[layout::PROTOCOL_VERSION_OFFSET] = protocol::DEFAULT_PROTOCOL_VERSION;
        Self { bytes }
    }

    pub fn digital(mut self, index: usize, raw: u8) -> Self {
        self.bytes[layout::DIGITAL_TEMP_OFFSET + index] = raw;
        self
    }

    pub fn analog(mut self, index: usize, raw: u8) -> Self {
        self.bytes[layout::ANALOG_TEMP_OFFSET + index] = raw;
        self
    }

    /// PWM-mode fan with a raw max-RPM word and duty percent
    pub fn fan(mut self, index: usize, max_raw: u16, duty: u8) -> Self {
        let [lo, hi] = max_raw.to_le_bytes();
        self.bytes[layout::FAN_MAX_RPM_OFFSET + 2 * index] = lo;
        self.bytes[layout::FAN_MAX_RPM_OFFSET + 2 * index + 1] = hi;
        self.bytes[layout::FAN_PWM_DUTY_OFFSET + index] = duty;
        self
    }

    pub fn version(mut self, version: u8) -> Self {
        self.bytes[layout::PROTOCOL_VERSION_OFFSET] = version;
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}

/// A temp file holding `contents`
pub fn temp_file_with(contents: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents).unwrap();
    file.flush().unwrap();
    file
}

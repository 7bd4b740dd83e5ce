//! Constants for the T-Balancer driver
//!
//! Wire-format offsets, serial line settings and timing defaults live here.
//! Other modules refer to these names instead of repeating magic numbers.

use std::time::Duration;

/// Telemetry frame layout
pub mod frame {
    /// Length of one reply frame in bytes
    pub const LEN: usize = 285;

    /// Required value of byte 0
    pub const START_FLAG: u8 = 100;

    /// Offset of the start flag
    pub const START_FLAG_OFFSET: usize = 0;

    /// Offset of the firmware protocol revision
    pub const PROTOCOL_VERSION_OFFSET: usize = 274;

    /// Digital temperature raw bytes (x0.5 °C, 0 = absent)
    pub const DIGITAL_TEMP_OFFSET: usize = 238;

    /// Analog temperature raw bytes (x0.5 °C, 0 = absent)
    pub const ANALOG_TEMP_OFFSET: usize = 260;

    /// Fan mode bitfield (bit i: 0 = PWM, 1 = analog)
    pub const FAN_MODE_OFFSET: usize = 136;

    /// Analog duty percent per fan
    pub const FAN_ANALOG_DUTY_OFFSET: usize = 141;

    /// Max RPM, little-endian u16 per fan
    pub const FAN_MAX_RPM_OFFSET: usize = 148;

    /// PWM duty percent per fan
    pub const FAN_PWM_DUTY_OFFSET: usize = 156;

    /// Scale applied to the raw max RPM word
    pub const MAX_RPM_SCALE: f32 = 11.5;

    /// Scale applied to raw temperature bytes
    pub const TEMPERATURE_SCALE: f32 = 0.5;
}

/// Channel counts per sensor kind
pub mod channels {
    pub const DIGITAL_TEMPERATURES: usize = 8;
    pub const ANALOG_TEMPERATURES: usize = 4;
    pub const FANS: usize = 4;
}

/// Host-to-device protocol
pub mod protocol {
    /// Single byte the host writes to request the next telemetry frame
    pub const POLL_REQUEST: u8 = 0x38;

    /// Firmware protocol revision this driver decodes
    pub const DEFAULT_PROTOCOL_VERSION: u8 = 0x2A;

    /// Product name used in reports
    pub const DEVICE_NAME: &str = "T-Balancer bigNG";
}

/// Serial line configuration (19200 8N1)
pub mod serial {
    pub const BAUD_RATE: u32 = 19200;

    /// FTDI vendor id; the controller uses an FT232 bridge
    pub const FTDI_VENDOR_ID: u16 = 0x0403;
}

/// Timing defaults
pub mod timing {
    use super::Duration;

    /// Default monitor tick
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

    /// Default serial read timeout
    pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;

    /// Default time a probe waits for a reply frame
    pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 500;

    /// Sleep between `bytes_available` checks while probing
    pub const PROBE_POLL_STEP: Duration = Duration::from_millis(10);
}

//! T-Balancer Core Library
//!
//! Polling driver for the T-Balancer bigNG fan/temperature controller.
//!
//! # Features
//!
//! - **Framing**: reads fixed 285-byte telemetry frames and rejects any with a
//!   bad start flag or protocol revision, resynchronising on the next poll
//! - **Decoding**: digital and analog temperatures, fan max RPM and duty in
//!   both PWM and analog modes
//! - **Presence tracking**: sensors appear on their first reading and are
//!   removed only after two consecutive empty frames
//! - **Transports**: serial ports at 19200 8N1, plus an in-memory transport
//!   for tests and offline replay
//!
//! # Module Structure
//!
//! - `frame` - frame validation and decoders
//! - `lifecycle` - active/deactivating sensor sets and notifications
//! - `session` - the poll loop body and diagnostics report
//! - `transport/` - byte transport trait and implementations
//! - `discovery` - port enumeration and probing
//!
//! # Example
//!
//! ```no_run
//! use tb_core::{Session, SessionOptions, TransportConfig};
//!
//! let mut session = Session::open(&TransportConfig::new("/dev/ttyUSB0"), SessionOptions::default());
//! session.update();
//! for sensor in session.active_sensors() {
//!     println!("{}: {:?}", sensor.label(), sensor.value());
//! }
//! ```

pub mod constants;
pub mod discovery;
pub mod display;
pub mod frame;
pub mod lifecycle;
pub mod report;
pub mod sensor;
pub mod session;
pub mod transport;

pub use discovery::{
    discover_ports, find_controller, probe_port, probe_transport, PortCandidate, ProbeOutcome,
    UsbIds,
};
pub use display::{
    celsius_to_fahrenheit, format_rpm, format_sensor_line, format_sensor_value,
    format_temp_precise_with_unit, TemperatureUnit,
};
pub use frame::{read_frame, FanMode, Frame};
pub use lifecycle::{LifecycleState, SensorEvent, SensorLifecycle};
pub use report::{hex_dump, render_report};
pub use sensor::{Channel, Sensor, SensorKind};
pub use session::{FanRpmPolicy, Session, SessionOptions, SessionStats};
pub use transport::{ScriptedTransport, SerialTransport, Transport, TransportConfig};

pub use tb_error::{FrameError, InvalidFrame, Result, TBalancerError};

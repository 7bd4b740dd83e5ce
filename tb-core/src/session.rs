//! Device session
//!
//! A `Session` owns one transport and one `SensorLifecycle`. The host calls
//! `update` once per tick: it drains every complete frame already buffered,
//! feeds each valid one to the lifecycle, then writes a single poll request.
//! The reply is consumed on a later tick, so `update` never waits for the
//! device.
//!
//! A controller that cannot be opened is not an error: the session is built
//! disconnected, reports no sensors, and `update` does nothing.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::constants::{channels, frame as layout, protocol};
use crate::frame::{read_frame, Frame};
use crate::lifecycle::{SensorEvent, SensorLifecycle};
use crate::report::render_report;
use crate::sensor::{Channel, Sensor};
use crate::transport::{SerialTransport, Transport, TransportConfig};
use tb_error::Result;

/// How a fan's max RPM is tracked across frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanRpmPolicy {
    /// Take max RPM from every frame
    #[default]
    Recompute,
    /// Freeze max RPM when the fan is first seen
    CacheAtCreation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Value frame byte 274 must carry
    pub protocol_version: u8,
    pub fan_rpm_policy: FanRpmPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            protocol_version: protocol::DEFAULT_PROTOCOL_VERSION,
            fan_rpm_policy: FanRpmPolicy::default(),
        }
    }
}

/// Counters since the session was opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub frames_valid: u64,
    pub frames_invalid: u64,
    pub polls_sent: u64,
}

pub struct Session<T: Transport> {
    port: String,
    transport: Option<T>,
    options: SessionOptions,
    lifecycle: SensorLifecycle,
    last_frame: Option<Frame>,
    link_lost: bool,
    stats: SessionStats,
}

impl Session<SerialTransport> {
    /// Open the serial port described by `config`. Never fails: an
    /// unreachable controller yields a disconnected session.
    pub fn open(config: &TransportConfig, options: SessionOptions) -> Self {
        Self::from_open_result(config.port.clone(), SerialTransport::open(config), options)
    }
}

impl<T: Transport> Session<T> {
    /// Build a session from the outcome of opening a transport
    pub fn from_open_result(port: impl Into<String>, opened: Result<T>, options: SessionOptions) -> Self {
        let port = port.into();
        match opened {
            Ok(transport) => Self::with_transport(port, transport, options),
            Err(e) => {
                warn!("Controller on {} unavailable: {}", port, e);
                Self::disconnected(port, options)
            }
        }
    }

    pub fn with_transport(port: impl Into<String>, transport: T, options: SessionOptions) -> Self {
        let port = port.into();
        let mut lifecycle = SensorLifecycle::new();
        for channel in Channel::temperatures() {
            lifecycle.register(Sensor::temperature(channel));
        }
        info!(
            "Session opened on {} (protocol 0x{:02X})",
            port, options.protocol_version
        );
        Self {
            port,
            transport: Some(transport),
            options,
            lifecycle,
            last_frame: None,
            link_lost: false,
            stats: SessionStats::default(),
        }
    }

    pub fn disconnected(port: impl Into<String>, options: SessionOptions) -> Self {
        Self {
            port: port.into(),
            transport: None,
            options,
            lifecycle: SensorLifecycle::new(),
            last_frame: None,
            link_lost: false,
            stats: SessionStats::default(),
        }
    }

    /// One poll cycle. See the module docs.
    pub fn update(&mut self) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        let mut link_lost = false;

        loop {
            match transport.bytes_available() {
                Ok(n) if n >= layout::LEN => {}
                Ok(_) => break,
                Err(e) => {
                    warn!("Failed to query {}: {}", self.port, e);
                    link_lost = true;
                    break;
                }
            }

            match read_frame(transport, self.options.protocol_version) {
                Ok(frame) => {
                    self.stats.frames_valid += 1;
                    apply_frame(&mut self.lifecycle, self.options.fan_rpm_policy, &frame);
                    self.last_frame = Some(frame);
                }
                Err(e) => {
                    self.stats.frames_invalid += 1;
                    if e.is_transport() {
                        warn!("Read from {} failed: {}", self.port, e);
                        link_lost = true;
                        break;
                    }
                    debug!("Skipping frame from {}: {}", self.port, e);
                }
            }
        }

        match transport.write(&[protocol::POLL_REQUEST]) {
            Ok(()) => self.stats.polls_sent += 1,
            Err(e) => {
                warn!("Poll request to {} failed: {}", self.port, e);
                link_lost = true;
            }
        }

        if link_lost && !self.link_lost {
            warn!("Link to {} lost", self.port);
        } else if !link_lost && self.link_lost {
            info!("Link to {} restored", self.port);
        }
        self.link_lost = link_lost;
    }

    /// Release the transport. Every visible sensor is reported removed.
    pub fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            self.lifecycle.deactivate_all();
            transport.close();
            info!("Session on {} closed", self.port);
        }
    }

    /// Hex dump of the last valid frame
    pub fn report(&self) -> String {
        render_report(self.options.protocol_version, self.last_frame.as_ref())
    }

    /// False when never opened, closed, or the last cycle hit a transport error
    pub fn is_connected(&self) -> bool {
        self.transport.is_some() && !self.link_lost
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    pub fn active_sensors(&self) -> impl Iterator<Item = &Sensor> + '_ {
        self.lifecycle.active_sensors()
    }

    pub fn drain_events(&mut self) -> Vec<SensorEvent> {
        self.lifecycle.drain_events()
    }

    pub fn lifecycle(&self) -> &SensorLifecycle {
        &self.lifecycle
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.last_frame.as_ref()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    pub fn transport_mut(&mut self) -> Option<&mut T> {
        self.transport.as_mut()
    }
}

/// Route one valid frame's readings into the lifecycle
fn apply_frame(lifecycle: &mut SensorLifecycle, policy: FanRpmPolicy, frame: &Frame) {
    for i in 0..channels::DIGITAL_TEMPERATURES {
        let channel = Channel::DigitalTemperature(i as u8);
        lifecycle.set_value(channel, frame.digital_temp(i));
        if frame.digital_temp_raw(i) > 0 {
            lifecycle.activate(channel);
        } else {
            lifecycle.deactivate(channel);
        }
    }

    for i in 0..channels::ANALOG_TEMPERATURES {
        let channel = Channel::AnalogTemperature(i as u8);
        lifecycle.set_value(channel, frame.analog_temp(i));
        if frame.analog_temp_raw(i) > 0 {
            lifecycle.activate(channel);
        } else {
            lifecycle.deactivate(channel);
        }
    }

    for i in 0..channels::FANS {
        let channel = Channel::Fan(i as u8);
        // A zero max RPM word means the output is not configured
        if frame.fan_max_rpm_raw(i) == 0 {
            lifecycle.deactivate(channel);
            continue;
        }

        let max_rpm = frame.fan_max_rpm(i);
        if lifecycle.register(Sensor::fan(i as u8, max_rpm)) {
            debug!("Created {} with max {} RPM", channel, max_rpm);
        }
        let effective_max = match policy {
            FanRpmPolicy::Recompute => {
                lifecycle.set_max_rpm(channel, max_rpm);
                max_rpm
            }
            FanRpmPolicy::CacheAtCreation => lifecycle
                .sensor(channel)
                .and_then(Sensor::max_rpm)
                .unwrap_or(max_rpm),
        };
        lifecycle.set_value(channel, Some(frame.fan_value_with_max_rpm(i, effective_max)));
        lifecycle.activate(channel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::tests::blank_frame;
    use crate::lifecycle::LifecycleState;
    use crate::transport::{MockTransport, ScriptedTransport};
    use mockall::Sequence;
    use std::io;

    fn scripted_session() -> Session<ScriptedTransport> {
        Session::with_transport("test", ScriptedTransport::new(), SessionOptions::default())
    }

    fn push(session: &mut Session<ScriptedTransport>, bytes: &[u8]) {
        session.transport_mut().unwrap().push_bytes(bytes);
    }

    #[test]
    fn test_update_without_data_only_polls() {
        let mut transport = MockTransport::new();
        let mut seq = Sequence::new();
        transport
            .expect_bytes_available()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(284));
        transport.expect_read_exact().never();
        transport
            .expect_write()
            .withf(|bytes| bytes.len() == 1 && bytes[0] == 0x38)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let mut session = Session::with_transport("mock", transport, SessionOptions::default());
        session.update();
        assert_eq!(session.stats().polls_sent, 1);
        assert!(session.is_connected());
    }

    #[test]
    fn test_invalid_frame_discards_and_updates_nothing() {
        let mut transport = MockTransport::new();
        let mut available = vec![285usize, 0].into_iter();
        transport
            .expect_bytes_available()
            .returning(move || Ok(available.next().unwrap_or(0)));
        transport.expect_read_exact().times(1).returning(|buf| {
            buf.fill(0xFF);
            Ok(())
        });
        transport
            .expect_discard_input_buffer()
            .times(1)
            .returning(|| Ok(()));
        transport.expect_write().times(1).returning(|_| Ok(()));

        let mut session = Session::with_transport("mock", transport, SessionOptions::default());
        session.update();

        assert_eq!(session.stats().frames_invalid, 1);
        assert!(session.last_frame().is_none());
        assert!(session.drain_events().is_empty());
        assert!(session.is_connected());
    }

    #[test]
    fn test_drains_all_buffered_frames() {
        let mut session = scripted_session();
        let mut first = blank_frame();
        first[238] = 20;
        let mut second = blank_frame();
        second[238] = 30;
        push(&mut session, &first);
        push(&mut session, &second);

        session.update();

        assert_eq!(session.stats().frames_valid, 2);
        let sensors: Vec<&Sensor> = session.active_sensors().collect();
        assert_eq!(sensors.len(), 1);
        assert_eq!(sensors[0].value(), Some(15.0));
        assert_eq!(session.last_frame().unwrap().digital_temp_raw(0), 30);
        assert_eq!(session.transport().unwrap().poll_requests(), 1);
    }

    #[test]
    fn test_drains_long_backlog_in_one_update() {
        let mut session = scripted_session();
        for raw in 1..=40u8 {
            let mut bytes = blank_frame();
            bytes[238] = raw;
            push(&mut session, &bytes);
        }

        session.update();

        assert_eq!(session.stats().frames_valid, 40);
        assert_eq!(session.transport().unwrap().pending(), 0);
        assert_eq!(session.last_frame().unwrap().digital_temp_raw(0), 40);
        assert_eq!(
            session.lifecycle().sensor(Channel::DigitalTemperature(0)).unwrap().value(),
            Some(20.0)
        );
        assert_eq!(session.transport().unwrap().poll_requests(), 1);
    }

    #[test]
    fn test_available_failure_marks_link_lost_until_cleared() {
        let mut session = scripted_session();
        push(&mut session, &blank_frame());
        session.transport_mut().unwrap().set_fail_available(true);
        session.update();

        assert!(!session.is_connected());
        assert!(session.is_open());
        assert_eq!(session.stats().frames_valid, 0);
        assert_eq!(session.stats().polls_sent, 1);
        assert_eq!(session.transport().unwrap().poll_requests(), 1);

        session.transport_mut().unwrap().set_fail_available(false);
        session.update();
        assert!(session.is_connected());
        assert_eq!(session.stats().frames_valid, 1);
        assert_eq!(session.stats().polls_sent, 2);
    }

    #[test]
    fn test_corrupt_frame_between_valid_ones() {
        let mut session = scripted_session();
        let mut good = blank_frame();
        good[238] = 20;
        push(&mut session, &good);
        session.update();
        assert_eq!(session.drain_events().len(), 1);

        let mut bad = good;
        bad[0] = 0;
        push(&mut session, &bad);
        session.update();
        assert_eq!(session.transport().unwrap().discard_count(), 1);
        assert!(session.drain_events().is_empty());
        assert_eq!(
            session.lifecycle().state(Channel::DigitalTemperature(0)),
            LifecycleState::Active
        );
    }

    #[test]
    fn test_sensor_removed_after_two_empty_frames() {
        let mut session = scripted_session();
        let mut present = blank_frame();
        present[260] = 40;
        let absent = blank_frame();

        for bytes in [&present, &absent, &absent] {
            push(&mut session, bytes);
            session.update();
        }
        let events = session.drain_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], SensorEvent::Added(s) if s.value() == Some(20.0)));
        assert!(matches!(&events[1], SensorEvent::Removed(s) if s.channel() == Channel::AnalogTemperature(0)));
    }

    #[test]
    fn test_fans_appear_when_configured() {
        let mut session = scripted_session();
        let mut bytes = blank_frame();
        bytes[150] = 0x64; // fan 1 max word = 100
        bytes[157] = 40;
        push(&mut session, &bytes);
        session.update();

        let fans: Vec<&Sensor> = session
            .active_sensors()
            .filter(|s| matches!(s.channel(), Channel::Fan(_)))
            .collect();
        assert_eq!(fans.len(), 1);
        assert_eq!(fans[0].channel(), Channel::Fan(1));
        assert_eq!(fans[0].max_rpm(), Some(1150.0));
        assert!((fans[0].value().unwrap() - 460.0).abs() < 1e-2);
    }

    fn fan_frame(max_word: u8, duty: u8) -> [u8; layout::LEN] {
        let mut bytes = blank_frame();
        bytes[148] = max_word;
        bytes[156] = duty;
        bytes
    }

    #[test]
    fn test_recompute_policy_tracks_max_rpm() {
        let mut session = scripted_session();
        push(&mut session, &fan_frame(100, 50));
        session.update();
        push(&mut session, &fan_frame(200, 50));
        session.update();

        let fan = session.lifecycle().sensor(Channel::Fan(0)).unwrap();
        assert_eq!(fan.max_rpm(), Some(2300.0));
        assert!((fan.value().unwrap() - 1150.0).abs() < 1e-2);
    }

    #[test]
    fn test_cache_policy_freezes_max_rpm() {
        let options = SessionOptions {
            fan_rpm_policy: FanRpmPolicy::CacheAtCreation,
            ..SessionOptions::default()
        };
        let mut session = Session::with_transport("test", ScriptedTransport::new(), options);
        push(&mut session, &fan_frame(100, 50));
        session.update();
        push(&mut session, &fan_frame(200, 50));
        session.update();

        let fan = session.lifecycle().sensor(Channel::Fan(0)).unwrap();
        assert_eq!(fan.max_rpm(), Some(1150.0));
        assert!((fan.value().unwrap() - 575.0).abs() < 1e-2);
    }

    #[test]
    fn test_read_failure_marks_link_lost() {
        let mut session = scripted_session();
        push(&mut session, &blank_frame());
        session.transport_mut().unwrap().fail_next_read();
        session.update();

        assert!(!session.is_connected());
        assert!(session.is_open());
        assert_eq!(session.stats().frames_invalid, 1);

        push(&mut session, &blank_frame());
        session.update();
        assert!(session.is_connected());
    }

    #[test]
    fn test_poll_write_failure_marks_link_lost() {
        let mut transport = MockTransport::new();
        transport.expect_bytes_available().returning(|| Ok(0));
        transport
            .expect_write()
            .returning(|_| Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone")));

        let mut session = Session::with_transport("mock", transport, SessionOptions::default());
        session.update();
        assert!(!session.is_connected());
        assert_eq!(session.stats().polls_sent, 0);
    }

    #[test]
    fn test_disconnected_session_is_inert() {
        let mut session: Session<ScriptedTransport> = Session::from_open_result(
            "/dev/missing",
            Err(tb_error::TBalancerError::serial_open("/dev/missing", "no such device")),
            SessionOptions::default(),
        );
        session.update();
        assert!(!session.is_connected());
        assert_eq!(session.active_sensors().count(), 0);
        assert_eq!(session.stats(), SessionStats::default());
        assert!(session.report().ends_with("No frame received\n"));
        session.close();
    }

    #[test]
    fn test_close_is_idempotent_and_removes_sensors() {
        let mut session = scripted_session();
        let mut bytes = blank_frame();
        bytes[238] = 20;
        push(&mut session, &bytes);
        session.update();
        session.drain_events();

        session.close();
        session.close();
        let events = session.drain_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], SensorEvent::Removed(_)));
        assert!(!session.is_open());
        assert_eq!(session.active_sensors().count(), 0);

        // No-op once closed
        session.update();
        assert_eq!(session.stats().polls_sent, 1);
    }

    #[test]
    fn test_report_matches_for_identical_frames() {
        let mut a = scripted_session();
        let mut b = scripted_session();
        let mut bytes = blank_frame();
        bytes[238] = 20;
        bytes[96] = 0xAB;
        push(&mut a, &bytes);
        push(&mut b, &bytes);
        a.update();
        b.update();
        assert_eq!(a.report(), b.report());
        assert!(a.report().contains(" 060   AB"));
    }
}

//! Channels and sensors

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::channels;

/// Stable identity of one measurement on the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum Channel {
    DigitalTemperature(u8),
    AnalogTemperature(u8),
    Fan(u8),
}

/// Physical quantity a sensor reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Temperature,
    Fan,
}

impl Channel {
    pub fn index(&self) -> usize {
        match *self {
            Channel::DigitalTemperature(i) | Channel::AnalogTemperature(i) | Channel::Fan(i) => {
                i as usize
            }
        }
    }

    pub fn kind(&self) -> SensorKind {
        match self {
            Channel::DigitalTemperature(_) | Channel::AnalogTemperature(_) => {
                SensorKind::Temperature
            }
            Channel::Fan(_) => SensorKind::Fan,
        }
    }

    /// Human readable label, numbered from 1
    pub fn label(&self) -> String {
        match self {
            Channel::DigitalTemperature(_) => format!("Digital Sensor #{}", self.index() + 1),
            Channel::AnalogTemperature(_) => format!("Analog Sensor #{}", self.index() + 1),
            Channel::Fan(_) => format!("Fan #{}", self.index() + 1),
        }
    }

    /// Every temperature channel, digital first
    pub fn temperatures() -> impl Iterator<Item = Channel> {
        (0..channels::DIGITAL_TEMPERATURES as u8)
            .map(Channel::DigitalTemperature)
            .chain((0..channels::ANALOG_TEMPERATURES as u8).map(Channel::AnalogTemperature))
    }

    pub fn fans() -> impl Iterator<Item = Channel> {
        (0..channels::FANS as u8).map(Channel::Fan)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// A channel plus its latest decoded reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sensor {
    channel: Channel,
    label: String,
    /// °C for temperatures, RPM for fans
    value: Option<f32>,
    /// Fans only
    #[serde(skip_serializing_if = "Option::is_none")]
    max_rpm: Option<f32>,
}

impl Sensor {
    pub fn temperature(channel: Channel) -> Self {
        Self {
            channel,
            label: channel.label(),
            value: None,
            max_rpm: None,
        }
    }

    pub fn fan(index: u8, max_rpm: f32) -> Self {
        let channel = Channel::Fan(index);
        Self {
            channel,
            label: channel.label(),
            value: None,
            max_rpm: Some(max_rpm),
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn value(&self) -> Option<f32> {
        self.value
    }

    pub fn max_rpm(&self) -> Option<f32> {
        self.max_rpm
    }

    pub fn kind(&self) -> SensorKind {
        self.channel.kind()
    }

    pub(crate) fn set_value(&mut self, value: Option<f32>) {
        self.value = value;
    }

    pub(crate) fn set_max_rpm(&mut self, max_rpm: f32) {
        self.max_rpm = Some(max_rpm);
    }
}

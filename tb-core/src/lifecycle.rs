//! Sensor presence tracking
//!
//! A sensor becomes visible on its first positive reading. Removal needs two
//! consecutive non-positive readings: the first only marks the sensor as
//! deactivating, the second removes it. A positive reading in between cancels
//! the pending removal without any notification, so one glitched frame never
//! makes a sensor flicker.
//!
//! Notifications are queued as `SensorEvent`s and drained by the host once
//! per tick.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{info, warn};

use crate::sensor::{Channel, Sensor};

/// Add/remove notification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "sensor", rename_all = "snake_case")]
pub enum SensorEvent {
    Added(Sensor),
    Removed(Sensor),
}

impl SensorEvent {
    pub fn sensor(&self) -> &Sensor {
        match self {
            SensorEvent::Added(s) | SensorEvent::Removed(s) => s,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Inactive,
    Active,
    /// Still active, one more non-positive reading removes it
    Deactivating,
}

#[derive(Debug, Default)]
pub struct SensorLifecycle {
    sensors: BTreeMap<Channel, Sensor>,
    active: BTreeSet<Channel>,
    deactivating: BTreeSet<Channel>,
    events: Vec<SensorEvent>,
}

impl SensorLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new sensor. Returns false if the channel is already known.
    pub fn register(&mut self, sensor: Sensor) -> bool {
        let channel = sensor.channel();
        if self.sensors.contains_key(&channel) {
            return false;
        }
        self.sensors.insert(channel, sensor);
        true
    }

    pub fn contains(&self, channel: Channel) -> bool {
        self.sensors.contains_key(&channel)
    }

    pub fn sensor(&self, channel: Channel) -> Option<&Sensor> {
        self.sensors.get(&channel)
    }

    pub(crate) fn set_value(&mut self, channel: Channel, value: Option<f32>) {
        if let Some(sensor) = self.sensors.get_mut(&channel) {
            sensor.set_value(value);
        }
    }

    pub(crate) fn set_max_rpm(&mut self, channel: Channel, max_rpm: f32) {
        if let Some(sensor) = self.sensors.get_mut(&channel) {
            sensor.set_max_rpm(max_rpm);
        }
    }

    pub fn activate(&mut self, channel: Channel) {
        let Some(sensor) = self.sensors.get(&channel) else {
            warn!("activate called for unregistered channel {}", channel);
            return;
        };
        self.deactivating.remove(&channel);
        if self.active.insert(channel) {
            info!("Sensor added: {}", channel);
            self.events.push(SensorEvent::Added(sensor.clone()));
        }
    }

    pub fn deactivate(&mut self, channel: Channel) {
        if self.deactivating.remove(&channel) {
            self.active.remove(&channel);
            if let Some(sensor) = self.sensors.get(&channel) {
                info!("Sensor removed: {}", channel);
                self.events.push(SensorEvent::Removed(sensor.clone()));
            }
        } else if self.active.contains(&channel) {
            self.deactivating.insert(channel);
        }
    }

    pub fn state(&self, channel: Channel) -> LifecycleState {
        if self.deactivating.contains(&channel) {
            LifecycleState::Deactivating
        } else if self.active.contains(&channel) {
            LifecycleState::Active
        } else {
            LifecycleState::Inactive
        }
    }

    pub fn is_active(&self, channel: Channel) -> bool {
        self.active.contains(&channel)
    }

    /// Visible sensors in channel order, including deactivating ones
    pub fn active_sensors(&self) -> impl Iterator<Item = &Sensor> + '_ {
        self.active.iter().filter_map(|c| self.sensors.get(c))
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Take all queued notifications in the order they happened
    pub fn drain_events(&mut self) -> Vec<SensorEvent> {
        std::mem::take(&mut self.events)
    }

    /// Remove every visible sensor at once, queueing a removal for each
    pub fn deactivate_all(&mut self) {
        let active = std::mem::take(&mut self.active);
        self.deactivating.clear();
        for channel in active {
            if let Some(sensor) = self.sensors.get(&channel) {
                self.events.push(SensorEvent::Removed(sensor.clone()));
            }
        }
    }
}

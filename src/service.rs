/*
 * This file is part of tbalancer.
 *
 * Copyright (C) 2025 tbalancer contributors
 *
 * tbalancer is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * tbalancer is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with tbalancer. If not, see <https://www.gnu.org/licenses/>.
 */

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, info};

use tb_core::{format_sensor_line, SensorEvent, Session, SessionStats, TemperatureUnit, Transport};

use crate::logger::{log_event, log_sensor_event};

const SLEEP_STEP: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub interval: Duration,
    /// Stop after this many ticks; run until shutdown when `None`
    pub ticks: Option<u64>,
    pub unit: TemperatureUnit,
    /// Print every active sensor after each tick
    pub show_values: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorSummary {
    pub ticks: u64,
    pub added: usize,
    pub removed: usize,
    pub stats: SessionStats,
}

/// Write one line per queued notification and journal it
pub fn emit_events<T: Transport, W: Write>(
    session: &mut Session<T>,
    unit: TemperatureUnit,
    out: &mut W,
    summary: &mut MonitorSummary,
) -> Result<()> {
    for event in session.drain_events() {
        log_sensor_event(session.port(), &event);
        match &event {
            SensorEvent::Added(sensor) => {
                summary.added += 1;
                writeln!(out, "+ {}", format_sensor_line(sensor, unit))?;
            }
            SensorEvent::Removed(sensor) => {
                summary.removed += 1;
                writeln!(out, "- {}", sensor.label())?;
            }
        }
    }
    Ok(())
}

/// Print every active sensor
pub fn write_sensors<T: Transport, W: Write>(
    session: &Session<T>,
    unit: TemperatureUnit,
    out: &mut W,
) -> Result<()> {
    for sensor in session.active_sensors() {
        writeln!(out, "  {}", format_sensor_line(sensor, unit))?;
    }
    Ok(())
}

/// Drive `session.update()` at a fixed interval until the tick budget runs
/// out or `shutdown` is set, then close the session.
pub fn run_monitor<T: Transport, W: Write>(
    session: &mut Session<T>,
    opts: &MonitorOptions,
    shutdown: &AtomicBool,
    out: &mut W,
) -> Result<MonitorSummary> {
    info!("Monitoring {} every {:?}", session.port(), opts.interval);
    let mut summary = MonitorSummary::default();
    let mut last: Option<Instant> = None;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            info!("Shutdown requested");
            break;
        }
        if opts.ticks.is_some_and(|max| summary.ticks >= max) {
            break;
        }

        let now = Instant::now();
        if let Some(prev) = last {
            let elapsed = now.duration_since(prev);
            if elapsed < opts.interval {
                thread::sleep((opts.interval - elapsed).min(SLEEP_STEP));
                continue;
            }
        }
        last = Some(now);

        let was_connected = session.is_connected();
        session.update();
        summary.ticks += 1;
        debug!("Tick {} on {}", summary.ticks, session.port());

        if was_connected && !session.is_connected() {
            log_event("link_lost", json!({ "port": session.port() }));
            writeln!(out, "! link to {} lost", session.port())?;
        }

        emit_events(session, opts.unit, out, &mut summary)?;
        if opts.show_values {
            writeln!(out, "-- tick {} --", summary.ticks)?;
            write_sensors(session, opts.unit, out)?;
        }
        out.flush().context("flush output")?;
    }

    session.close();
    emit_events(session, opts.unit, out, &mut summary)?;
    summary.stats = session.stats();
    log_event(
        "session_close",
        json!({ "port": session.port(), "ticks": summary.ticks, "stats": summary.stats }),
    );
    Ok(summary)
}

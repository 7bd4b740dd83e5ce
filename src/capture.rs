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

//! Raw frame capture and offline replay
//!
//! A capture file holds exactly the bytes of one or more frames as they came
//! off the wire. Replay feeds them through a session over a scripted
//! transport, so decoding follows the same path as a live device.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use tb_core::constants::frame as layout;
use tb_core::{Frame, ScriptedTransport, SensorEvent, Session, SessionOptions, Transport};
use tb_error::{Result, TBalancerError};

const WAIT_STEP: Duration = Duration::from_millis(20);

/// Poll until a valid frame arrives or `timeout` passes
pub fn poll_until_frame<T: Transport>(session: &mut Session<T>, timeout: Duration) -> Result<Frame> {
    if !session.is_open() {
        return Err(TBalancerError::NoDevice(session.port().to_string()));
    }
    let deadline = Instant::now() + timeout;
    loop {
        session.update();
        if let Some(frame) = session.last_frame() {
            return Ok(frame.clone());
        }
        if Instant::now() >= deadline {
            return Err(TBalancerError::Timeout(format!(
                "no valid frame from {} within {:?}",
                session.port(),
                timeout
            )));
        }
        thread::sleep(WAIT_STEP);
    }
}

pub fn write_capture(path: &Path, frame: &Frame) -> Result<()> {
    fs::write(path, frame.as_bytes()).map_err(|source| TBalancerError::FileWrite {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Wrote {} bytes to {}", layout::LEN, path.display());
    Ok(())
}

/// Read a capture file; its length must be a whole number of frames
pub fn read_capture(path: &Path) -> Result<Vec<u8>> {
    let bytes = fs::read(path).map_err(|source| TBalancerError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.is_empty() || bytes.len() % layout::LEN != 0 {
        return Err(TBalancerError::generic(format!(
            "{}: {} bytes is not a multiple of the {}-byte frame",
            path.display(),
            bytes.len(),
            layout::LEN
        )));
    }
    Ok(bytes)
}

/// Outcome of replaying captured frames
pub struct Replay {
    pub session: Session<ScriptedTransport>,
    /// Notifications in emission order, across all frames
    pub events: Vec<SensorEvent>,
}

/// Apply each frame in order with one `update()` per frame
pub fn replay_frames(frames: &[u8], options: SessionOptions) -> Replay {
    let mut session = Session::with_transport("replay", ScriptedTransport::new(), options);
    let mut events = Vec::new();

    for chunk in frames.chunks(layout::LEN) {
        if let Some(transport) = session.transport_mut() {
            transport.push_bytes(chunk);
        }
        session.update();
        events.extend(session.drain_events());
    }
    debug!(
        "Replayed {} frame(s): {:?}",
        frames.len() / layout::LEN,
        session.stats()
    );
    Replay { session, events }
}

pub fn replay_files<P: AsRef<Path>>(paths: &[P], options: SessionOptions) -> Result<Replay> {
    let mut frames = Vec::new();
    for path in paths {
        frames.extend(read_capture(path.as_ref())?);
    }
    Ok(replay_frames(&frames, options))
}

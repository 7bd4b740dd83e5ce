//! In-memory transport
//!
//! Bytes pushed with `push_bytes` are immediately readable. Replies queued
//! with `queue_reply` become readable only after the host writes the poll
//! request, which mimics the controller answering asynchronously.

use std::collections::VecDeque;
use std::io;

use super::Transport;
use crate::constants::protocol;

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    inbound: VecDeque<u8>,
    replies: VecDeque<Vec<u8>>,
    written: Vec<u8>,
    discards: usize,
    closed: bool,
    fail_next_read: bool,
    fail_next_write: bool,
    fail_available: bool,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `bytes` readable right away
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }

    /// Release `bytes` on the next poll request
    pub fn queue_reply(&mut self, bytes: Vec<u8>) {
        self.replies.push_back(bytes);
    }

    /// Everything the host has written so far
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Number of poll request bytes written
    pub fn poll_requests(&self) -> usize {
        self.written
            .iter()
            .filter(|b| **b == protocol::POLL_REQUEST)
            .count()
    }

    pub fn discard_count(&self) -> usize {
        self.discards
    }

    pub fn pending(&self) -> usize {
        self.inbound.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn fail_next_read(&mut self) {
        self.fail_next_read = true;
    }

    pub fn fail_next_write(&mut self) {
        self.fail_next_write = true;
    }

    /// Make every `bytes_available` call fail until cleared
    pub fn set_fail_available(&mut self, fail: bool) {
        self.fail_available = fail;
    }

    fn check_open(&self) -> io::Result<()> {
        if self.closed {
            Err(io::Error::new(io::ErrorKind::NotConnected, "transport is closed"))
        } else {
            Ok(())
        }
    }
}

impl Transport for ScriptedTransport {
    fn bytes_available(&mut self) -> io::Result<usize> {
        self.check_open()?;
        if self.fail_available {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device went away"));
        }
        Ok(self.inbound.len())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.check_open()?;
        if std::mem::take(&mut self.fail_next_read) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device went away"));
        }
        let n = buf.len();
        if self.inbound.len() < n {
            // A real port consumes whatever arrived before timing out
            self.inbound.clear();
            return Err(io::Error::new(io::ErrorKind::TimedOut, "short read"));
        }
        for (slot, byte) in buf.iter_mut().zip(self.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.check_open()?;
        if std::mem::take(&mut self.fail_next_write) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device went away"));
        }
        self.written.extend_from_slice(bytes);
        if bytes.contains(&protocol::POLL_REQUEST) {
            if let Some(reply) = self.replies.pop_front() {
                self.inbound.extend(reply);
            }
        }
        Ok(())
    }

    fn discard_input_buffer(&mut self) -> io::Result<()> {
        self.check_open()?;
        self.inbound.clear();
        self.discards += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

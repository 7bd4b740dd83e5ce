//! Diagnostic report of the last raw frame

use std::fmt::Write;

use crate::constants::protocol;
use crate::frame::Frame;

const BYTES_PER_ROW: usize = 16;

/// Render `bytes` as a 16-column hex grid with hex row offsets
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::new();
    out.push_str("      ");
    for column in 0..BYTES_PER_ROW {
        let _ = write!(out, " {:02X}", column);
    }
    out.push_str("\n\n");

    for (row, chunk) in bytes.chunks(BYTES_PER_ROW).enumerate() {
        let _ = write!(out, " {:03X}  ", row * BYTES_PER_ROW);
        for byte in chunk {
            let _ = write!(out, " {:02X}", byte);
        }
        out.push('\n');
    }
    out
}

/// Full report for one controller. Depends only on the expected protocol
/// version and the frame, so identical frames give identical text.
pub fn render_report(protocol_version: u8, frame: Option<&Frame>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", protocol::DEVICE_NAME);
    out.push('\n');
    let _ = writeln!(out, "Protocol Version: 0x{:02X}", protocol_version);
    out.push('\n');

    match frame {
        Some(frame) => {
            out.push_str("System Information Answer\n\n");
            out.push_str(&hex_dump(frame.as_bytes()));
        }
        None => out.push_str("No frame received\n"),
    }
    out
}

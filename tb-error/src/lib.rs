//! Unified error handling for the T-Balancer driver
//!
//! This crate provides the error types shared by the core driver and the
//! command line frontend. Frame-level failures have their own small type
//! because they are recovered locally on every poll cycle and never abort
//! a session.

use std::io;
use std::path::PathBuf;

/// Result type alias using TBalancerError
pub type Result<T> = std::result::Result<T, TBalancerError>;

/// Reason a telemetry frame was rejected
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidFrame {
    #[error("bad marker byte {0} (expected 100)")]
    BadMarker(u8),

    #[error("protocol version {found:#04x} does not match expected {expected:#04x}")]
    VersionMismatch { expected: u8, found: u8 },

    #[error("transport failed mid-frame: {0}")]
    Transport(String),
}

/// Error returned by the frame reader
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid frame: {0}")]
    Invalid(InvalidFrame),
}

impl FrameError {
    pub fn reason(&self) -> &InvalidFrame {
        match self {
            FrameError::Invalid(reason) => reason,
        }
    }

    /// True when the transport itself failed, as opposed to bad frame content
    pub fn is_transport(&self) -> bool {
        matches!(self.reason(), InvalidFrame::Transport(_))
    }
}

impl From<InvalidFrame> for FrameError {
    fn from(reason: InvalidFrame) -> Self {
        FrameError::Invalid(reason)
    }
}

/// Unified error type for all driver operations
#[derive(thiserror::Error, Debug)]
pub enum TBalancerError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: io::Error,
    },

    // ============================================================================
    // Device and Transport Errors
    // ============================================================================
    #[error("Failed to open serial port {port}: {reason}")]
    SerialOpen {
        port: String,
        reason: String,
    },

    #[error("Failed to enumerate serial ports: {0}")]
    PortEnumeration(String),

    #[error("No controller found: {0}")]
    NoDevice(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error(transparent)]
    Frame(#[from] FrameError),

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Generic(String),
}

impl TBalancerError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid config value error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a serial open error
    pub fn serial_open(port: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SerialOpen {
            port: port.into(),
            reason: reason.into(),
        }
    }
}

impl From<String> for TBalancerError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

impl From<&str> for TBalancerError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}

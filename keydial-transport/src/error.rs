//! Transport error types

use thiserror::Error;

/// Errors that can occur while attaching to or watching a device.
///
/// All of these are recoverable from the supervisor's point of view: they
/// surface as connection-state transitions and retries, never as a process
/// failure.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("device not found: {0}")]
    NotFound(String),

    #[error("connection timeout")]
    Timeout,

    #[error("link lost")]
    LinkLost,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("HID error: {0}")]
    Hid(String),

    #[error("bus error: {0}")]
    Bus(#[from] zbus::Error),
}

impl From<hidapi::HidError> for TransportError {
    fn from(e: hidapi::HidError) -> Self {
        let msg = e.to_string();
        if msg.contains("Permission denied") || msg.contains("EPERM") {
            TransportError::PermissionDenied(msg)
        } else {
            TransportError::Hid(msg)
        }
    }
}

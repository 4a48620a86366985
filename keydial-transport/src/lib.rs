// Huion Keydial Mini Linux Driver - Transport Layer
// HID report stream, BlueZ presence watching, and shared transport types

pub mod error;
pub mod hid;
pub mod presence;
pub mod types;

pub use error::TransportError;
pub use hid::HidReportTransport;
pub use presence::PresenceWatcher;
pub use types::{DeviceAddress, PresenceEvent, RawReport};

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Source of raw device reports.
///
/// An implementation hands out one report stream per attach. The receiver
/// closes when the link drops, which is how the supervisor observes link
/// loss. The concrete implementation is [`HidReportTransport`]; tests use
/// scripted streams.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Attach to the device's report stream.
    ///
    /// With a `target`, only that device is considered; without one, the
    /// first matching accessory is used.
    async fn attach(
        &self,
        target: Option<&DeviceAddress>,
    ) -> Result<mpsc::Receiver<RawReport>, TransportError>;
}

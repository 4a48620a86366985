//! HID input-report transport.
//!
//! Once BlueZ has connected the accessory, the kernel exposes it as a
//! Bluetooth-bus HID device. This transport finds that interface through
//! `hidapi` and pumps its input reports from a dedicated reader thread into
//! a tokio channel. The receiver closing is the link-loss signal.

use hidapi::{BusType, HidApi, HidDevice};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::types::{DeviceAddress, RawReport};
use crate::Transport;

use async_trait::async_trait;

/// Device identification (Huion)
pub const VENDOR_ID: u16 = 0x256C;
pub const PRODUCT_ID: u16 = 0x006D;

/// Maximum input report size
const REPORT_BUF_SIZE: usize = 64;

/// Read timeout; only affects how quickly the reader notices a dropped
/// receiver when the device is idle.
const READ_TIMEOUT_MS: i32 = 100;

/// Report channel depth
const REPORT_CHANNEL_SIZE: usize = 64;

/// Transport that reads HID input reports from the accessory's Bluetooth
/// HID interface.
pub struct HidReportTransport {
    vendor_id: u16,
    product_id: u16,
}

impl HidReportTransport {
    pub fn new() -> Self {
        Self {
            vendor_id: VENDOR_ID,
            product_id: PRODUCT_ID,
        }
    }

    /// Use a different VID/PID pair (compatible accessories).
    pub fn with_ids(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

impl Default for HidReportTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HidReportTransport {
    async fn attach(
        &self,
        target: Option<&DeviceAddress>,
    ) -> Result<mpsc::Receiver<RawReport>, TransportError> {
        let vid = self.vendor_id;
        let pid = self.product_id;
        let target = target.cloned();

        // hidapi enumeration and open are blocking calls.
        let device = tokio::task::spawn_blocking(move || {
            open_input_interface(vid, pid, target.as_ref())
        })
        .await
        .map_err(|e| TransportError::Hid(format!("open task failed: {e}")))??;

        let (tx, rx) = mpsc::channel(REPORT_CHANNEL_SIZE);
        std::thread::Builder::new()
            .name("keydial-report-reader".into())
            .spawn(move || run_report_reader(device, tx))
            .map_err(|e| TransportError::Hid(e.to_string()))?;

        Ok(rx)
    }
}

/// Find and open the accessory's Bluetooth HID input interface.
fn open_input_interface(
    vid: u16,
    pid: u16,
    target: Option<&DeviceAddress>,
) -> Result<HidDevice, TransportError> {
    let api = HidApi::new().map_err(TransportError::from)?;

    let matches_ids = |d: &&hidapi::DeviceInfo| {
        d.vendor_id() == vid
            && d.product_id() == pid
            && matches!(d.bus_type(), BusType::Bluetooth)
    };

    // Bluetooth HID interfaces carry the peer address as the serial number,
    // which is how a configured target narrows the search.
    let by_address = target.and_then(|t| {
        api.device_list().filter(matches_ids).find(|d| {
            d.serial_number()
                .is_some_and(|s| s.eq_ignore_ascii_case(t.as_str()))
        })
    });

    let info = match by_address {
        Some(info) => info,
        None => {
            if target.is_some() {
                debug!("no interface matched the target address, falling back to VID/PID match");
            }
            api.device_list()
                .find(matches_ids)
                .ok_or_else(|| TransportError::NotFound(format!("{vid:04x}:{pid:04x}")))?
        }
    };

    debug!(
        path = %info.path().to_string_lossy(),
        "opening HID input interface"
    );
    info.open_device(&api).map_err(TransportError::from)
}

/// Reader loop: pumps input reports until the receiver is dropped or the
/// device goes away.
fn run_report_reader(device: HidDevice, tx: mpsc::Sender<RawReport>) {
    debug!("report reader thread started");
    let mut buf = [0u8; REPORT_BUF_SIZE];

    loop {
        match device.read_timeout(&mut buf, READ_TIMEOUT_MS) {
            Ok(0) => {
                // Timeout with no data; check for a dropped receiver.
                if tx.is_closed() {
                    break;
                }
            }
            Ok(len) => {
                let report = RawReport::new(buf[..len].to_vec());
                if tx.blocking_send(report).is_err() {
                    break;
                }
            }
            Err(e) => {
                // The device disappearing mid-read is the normal way a
                // Bluetooth link drop shows up here.
                warn!("report read failed: {e}");
                break;
            }
        }
    }

    debug!("report reader thread exiting");
}

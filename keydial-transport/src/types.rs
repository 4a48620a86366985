//! Common types for the transport layer

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use thiserror::Error;

/// A Bluetooth device address (MAC), stored normalized to uppercase
/// colon-separated form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceAddress(String);

/// Address parse failure.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid device address {0:?}, expected AA:BB:CC:DD:EE:FF")]
pub struct AddressParseError(pub String);

impl DeviceAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The address as it appears in BlueZ object paths ("AA:BB" → "AA_BB").
    pub fn to_path_component(&self) -> String {
        self.0.replace(':', "_")
    }

    /// Parse a BlueZ device object path like
    /// `/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF`.
    pub fn from_device_path(path: &str) -> Option<Self> {
        let (_, tail) = path.rsplit_once("/dev_")?;
        tail.replace('_', ":").parse().ok()
    }
}

impl FromStr for DeviceAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let groups: Vec<&str> = s.split([':', '-']).collect();
        let valid = groups.len() == 6
            && groups
                .iter()
                .all(|g| g.len() == 2 && g.chars().all(|c| c.is_ascii_hexdigit()));
        if !valid {
            return Err(AddressParseError(s.to_string()));
        }
        Ok(DeviceAddress(groups.join(":").to_ascii_uppercase()))
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One raw report as delivered by the device, with its arrival timestamp.
#[derive(Debug, Clone)]
pub struct RawReport {
    pub data: Vec<u8>,
    pub ts: Instant,
}

impl RawReport {
    /// Wrap freshly received bytes, stamping the arrival time.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            ts: Instant::now(),
        }
    }
}

/// Connectivity change reported by the presence source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    Connected(DeviceAddress),
    Disconnected(DeviceAddress),
}

impl PresenceEvent {
    pub fn address(&self) -> &DeviceAddress {
        match self {
            PresenceEvent::Connected(addr) | PresenceEvent::Disconnected(addr) => addr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_parse_normalizes() {
        let addr: DeviceAddress = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        assert_eq!(addr.as_str(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn address_parse_accepts_dashes() {
        let addr: DeviceAddress = "AA-BB-CC-DD-EE-FF".parse().unwrap();
        assert_eq!(addr.as_str(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn address_parse_rejects_garbage() {
        assert!("".parse::<DeviceAddress>().is_err());
        assert!("AA:BB:CC:DD:EE".parse::<DeviceAddress>().is_err());
        assert!("AA:BB:CC:DD:EE:GG".parse::<DeviceAddress>().is_err());
        assert!("AABBCCDDEEFF".parse::<DeviceAddress>().is_err());
    }

    #[test]
    fn device_path_roundtrip() {
        let addr: DeviceAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        assert_eq!(addr.to_path_component(), "AA_BB_CC_DD_EE_FF");

        let parsed =
            DeviceAddress::from_device_path("/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF").unwrap();
        assert_eq!(parsed, addr);
    }

    #[test]
    fn device_path_rejects_non_device() {
        assert!(DeviceAddress::from_device_path("/org/bluez/hci0").is_none());
        assert!(DeviceAddress::from_device_path("/org/bluez/hci0/dev_XYZ").is_none());
    }
}

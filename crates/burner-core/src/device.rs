//! Classified device records.

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::OnceLock;

use crate::model::Model;

/// Vendor family a host was classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// Already running Oakridge firmware.
    Oakridge,
    /// Ubiquiti UniFi access point on stock firmware.
    UbiquitiAp,
    /// Ubiquiti EdgeRouter on stock EdgeOS.
    UbiquitiEdgeRouter,
    /// QTS or DCN OEM access point on stock firmware.
    Qts,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::Oakridge => write!(f, "Oakridge"),
            Family::UbiquitiAp => write!(f, "UBNT AP"),
            Family::UbiquitiEdgeRouter => write!(f, "UBNT ERX"),
            Family::Qts => write!(f, "QTS"),
        }
    }
}

/// Board data read from a QTS device's factory partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QtsInfo {
    pub vendor: String,
    pub oem_name: String,
    pub board_serial: String,
    pub manufacturing_date: String,
}

/// Family-specific part of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceKind {
    Oakridge,
    UbiquitiAp,
    UbiquitiEdgeRouter,
    Qts(QtsInfo),
}

/// One classified host.
///
/// Everything except the latest firmware version is fixed at classification
/// time. The latest version is resolved once, later, by the image cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub ipv4: Ipv4Addr,
    pub mac: String,
    /// Model code as reported by the device.
    pub model: String,
    pub display_name: String,
    pub current_firmware: String,
    pub kind: DeviceKind,
    latest_firmware: OnceLock<String>,
}

impl Device {
    /// The MAC is stored lowercase whatever case the device reports it in.
    pub fn new(
        ipv4: Ipv4Addr,
        mac: impl Into<String>,
        model: impl Into<String>,
        display_name: impl Into<String>,
        current_firmware: impl Into<String>,
        kind: DeviceKind,
    ) -> Self {
        Self {
            ipv4,
            mac: mac.into().trim().to_ascii_lowercase(),
            model: model.into(),
            display_name: display_name.into(),
            current_firmware: current_firmware.into(),
            kind,
            latest_firmware: OnceLock::new(),
        }
    }

    pub fn family(&self) -> Family {
        match self.kind {
            DeviceKind::Oakridge => Family::Oakridge,
            DeviceKind::UbiquitiAp => Family::UbiquitiAp,
            DeviceKind::UbiquitiEdgeRouter => Family::UbiquitiEdgeRouter,
            DeviceKind::Qts(_) => Family::Qts,
        }
    }

    /// Canonical model, if the reported code is one we support.
    pub fn canonical_model(&self) -> Option<Model> {
        Model::from_code(&self.model)
    }

    /// Latest published firmware, empty until resolved.
    pub fn latest_firmware(&self) -> &str {
        self.latest_firmware.get().map(String::as_str).unwrap_or("")
    }

    /// Record the latest published firmware. Only the first call has an
    /// effect; returns false when a value was already set.
    pub fn set_latest_firmware(&self, version: impl Into<String>) -> bool {
        self.latest_firmware.set(version.into()).is_ok()
    }

    /// Column header matching [`Device::summary`].
    pub fn summary_header() -> String {
        format!(
            "{:<9} {:<18} {:<17} {:<15} {:<24} {}",
            "FAMILY", "NAME", "MAC", "IPV4", "FIRMWARE", "LATEST"
        )
    }

    /// One-line listing.
    pub fn summary(&self) -> String {
        format!(
            "{:<9} {:<18} {:<17} {:<15} {:<24} {}",
            self.family().to_string(),
            self.display_name,
            self.mac,
            self.ipv4.to_string(),
            self.current_firmware,
            self.latest_firmware()
        )
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}, {})",
            self.family(),
            self.display_name,
            self.ipv4,
            self.mac
        )
    }
}

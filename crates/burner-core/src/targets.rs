//! Flashable targets derived from scan results.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::device::{Device, Family};
use crate::model::Model;
use crate::session::Credentials;

/// Firmware lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Stock firmware to Oakridge firmware.
    Convert,
    /// Oakridge firmware to the latest Oakridge release.
    Upgrade,
    /// Oakridge firmware back to factory firmware.
    Restore,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Convert => write!(f, "convert"),
            Operation::Upgrade => write!(f, "upgrade"),
            Operation::Restore => write!(f, "restore"),
        }
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "convert" => Ok(Operation::Convert),
            "upgrade" => Ok(Operation::Upgrade),
            "restore" => Ok(Operation::Restore),
            other => Err(format!("unknown operation `{other}`")),
        }
    }
}

/// One flashing attempt: a read-only copy of what the flasher needs from a
/// device record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: Ipv4Addr,
    pub mac: String,
    pub name: String,
    pub model: Model,
    pub operation: Operation,
    /// Login for the first stage.
    pub credentials: Credentials,
    pub current_version: String,
    pub latest_version: String,
}

impl Target {
    /// Build a target for `device`, or `None` when the operation does not
    /// apply to it.
    pub fn from_device(device: &Device, operation: Operation) -> Option<Target> {
        let model = device.canonical_model()?;
        let family = device.family();

        let credentials = match (operation, family) {
            (Operation::Upgrade | Operation::Restore, Family::Oakridge) => {
                Credentials::new("root", "oakridge")
            }
            (Operation::Convert, Family::UbiquitiAp | Family::UbiquitiEdgeRouter) => {
                Credentials::new("ubnt", "ubnt")
            }
            (Operation::Convert, Family::Qts) => Credentials::new("admin", "admin"),
            _ => return None,
        };

        if operation == Operation::Upgrade
            && !device.latest_firmware().is_empty()
            && device.latest_firmware() == device.current_firmware
        {
            return None;
        }

        Some(Target {
            host: device.ipv4,
            mac: device.mac.clone(),
            name: device.display_name.clone(),
            model,
            operation,
            credentials,
            current_version: device.current_firmware.clone(),
            latest_version: device.latest_firmware().to_string(),
        })
    }

    /// Column header matching [`Target::summary`].
    pub fn summary_header() -> String {
        format!(
            "{:<15} {:<18} {:<17} {:<24} {}",
            "IPV4", "NAME", "MAC", "CURRENT", "LATEST"
        )
    }

    pub fn summary(&self) -> String {
        format!(
            "{:<15} {:<18} {:<17} {:<24} {}",
            self.host.to_string(),
            self.name,
            self.mac,
            self.current_version,
            self.latest_version
        )
    }
}

/// Every device the operation applies to, in input order.
pub fn targets_for<'a>(
    devices: impl IntoIterator<Item = &'a Device>,
    operation: Operation,
) -> Vec<Target> {
    devices
        .into_iter()
        .filter_map(|d| Target::from_device(d, operation))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceKind, QtsInfo};

    fn dev(last: u8, model: &str, firmware: &str, kind: DeviceKind) -> Device {
        Device::new(
            Ipv4Addr::new(10, 0, 0, last),
            format!("00:00:00:00:00:{last:02x}"),
            model,
            model,
            firmware,
            kind,
        )
    }

    fn fleet() -> Vec<Device> {
        vec![
            dev(1, "ubntlite", "v4.0.1", DeviceKind::Oakridge),
            dev(2, "A820", "v4.1.0", DeviceKind::Oakridge),
            dev(3, "AP999", "v4.0.1", DeviceKind::Oakridge),
            dev(4, "AC-PRO", "v3.7.58", DeviceKind::UbiquitiAp),
            dev(5, "EdgeRouter_ER-X", "v1.10.11", DeviceKind::UbiquitiEdgeRouter),
            dev(6, "W282", "", DeviceKind::Qts(QtsInfo::default())),
        ]
    }

    #[test]
    fn test_operation_parse() {
        assert_eq!("Upgrade".parse::<Operation>(), Ok(Operation::Upgrade));
        assert!("flash".parse::<Operation>().is_err());
        assert_eq!(Operation::Restore.to_string(), "restore");
    }

    #[test]
    fn test_convert_targets() {
        let devices = fleet();
        let targets = targets_for(&devices, Operation::Convert);
        let hosts: Vec<u8> = targets.iter().map(|t| t.host.octets()[3]).collect();
        assert_eq!(hosts, vec![4, 5, 6]);
        assert_eq!(targets[0].credentials, Credentials::new("ubnt", "ubnt"));
        assert_eq!(targets[1].model, Model::EdgeRouterX);
        assert_eq!(targets[2].credentials, Credentials::new("admin", "admin"));
    }

    #[test]
    fn test_upgrade_skips_current() {
        let devices = fleet();
        for d in &devices {
            d.set_latest_firmware("v4.1.0");
        }
        let targets = targets_for(&devices, Operation::Upgrade);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].model, Model::AcLite);
        assert_eq!(targets[0].latest_version, "v4.1.0");
        assert_eq!(targets[0].credentials, Credentials::new("root", "oakridge"));
    }

    #[test]
    fn test_restore_needs_known_model() {
        let devices = fleet();
        let targets = targets_for(&devices, Operation::Restore);
        let hosts: Vec<u8> = targets.iter().map(|t| t.host.octets()[3]).collect();
        assert_eq!(hosts, vec![1, 2]);
    }
}

//! Per-vendor fingerprint queries.

use tracing::debug;

use super::ClassifyError;
use super::parse::{key_values, serial_to_mac};
use crate::device::{Device, DeviceKind, QtsInfo};
use crate::model::{Model, display_name_for};
use crate::session::RemoteSession;

pub(crate) const UCI_MAC: &str = "uci get productinfo.productinfo.mac";
pub(crate) const UCI_PRODUCTION: &str = "uci get productinfo.productinfo.production";
pub(crate) const UCI_MODEL: &str = "uci get productinfo.productinfo.model";
pub(crate) const UCI_BOOTVERSION: &str = "uci get productinfo.productinfo.bootversion";
pub(crate) const UCI_SWVERSION: &str = "uci get productinfo.productinfo.swversion";
pub(crate) const UBNT_SYSTEM_INFO: &str = "cat /proc/ubnthal/system.info";
pub(crate) const UBNT_VERSION: &str = "cat /etc/version";
pub(crate) const ERX_SHOW_VERSION: &str = "/opt/vyatta/bin/vyatta-op-cmd-wrapper show version";
pub(crate) const QTS_BOARD_DATA: &str = "strings /dev/mtd5 | grep =";

const ERX_HW_MODEL: &str = "EdgeRouter X 5-Port";

fn field(
    map: &mut std::collections::HashMap<String, String>,
    key: &'static str,
) -> Result<String, ClassifyError> {
    map.remove(key)
        .filter(|v| !v.is_empty())
        .ok_or(ClassifyError::MissingField(key))
}

pub(crate) fn query_oakridge(session: &mut dyn RemoteSession) -> Result<Device, ClassifyError> {
    let mac = session.run_checked(UCI_MAC)?.text();
    let model = session.run_checked(UCI_PRODUCTION)?.text();

    let display_name = match session.run_checked(UCI_MODEL) {
        Ok(out) => out.text(),
        Err(e) => {
            debug!(host = %session.host(), error = %e, "No model name, using table");
            display_name_for(&model)
        }
    };

    let firmware = match session.run_checked(UCI_BOOTVERSION) {
        Ok(out) => out.text(),
        Err(_) => session.run_checked(UCI_SWVERSION)?.text(),
    };

    Ok(Device::new(
        session.host(),
        mac,
        model,
        display_name,
        firmware,
        DeviceKind::Oakridge,
    ))
}

pub(crate) fn query_ubiquiti_ap(session: &mut dyn RemoteSession) -> Result<Device, ClassifyError> {
    let info = session.run_checked(UBNT_SYSTEM_INFO)?.text();
    let mut kv = key_values(&info, '=');

    let mac = field(&mut kv, "eth0.macaddr")?;
    let system_id = field(&mut kv, "systemid")?;
    let model = match system_id.as_str() {
        "e517" => Model::AcLite,
        "e527" => Model::AcLr,
        "e537" => Model::AcPro,
        _ => {
            return Err(ClassifyError::Unsupported {
                what: "systemid",
                value: system_id,
            });
        }
    };

    let firmware = session.run_checked(UBNT_VERSION)?.text();

    Ok(Device::new(
        session.host(),
        mac,
        model.code(),
        model.display_name(),
        firmware,
        DeviceKind::UbiquitiAp,
    ))
}

pub(crate) fn query_edge_router(session: &mut dyn RemoteSession) -> Result<Device, ClassifyError> {
    let version = session.run_checked(ERX_SHOW_VERSION)?.text();
    let mut kv = key_values(&version, ':');

    let hw_model = field(&mut kv, "HW model")?;
    if hw_model != ERX_HW_MODEL {
        return Err(ClassifyError::Unsupported {
            what: "HW model",
            value: hw_model,
        });
    }
    let serial = field(&mut kv, "HW S/N")?;
    let mac = serial_to_mac(&serial).ok_or(ClassifyError::Unsupported {
        what: "HW S/N",
        value: serial,
    })?;
    let firmware = field(&mut kv, "Version")?;

    let model = Model::EdgeRouterX;
    Ok(Device::new(
        session.host(),
        mac,
        model.code(),
        model.display_name(),
        firmware,
        DeviceKind::UbiquitiEdgeRouter,
    ))
}

pub(crate) fn query_qts(session: &mut dyn RemoteSession) -> Result<Device, ClassifyError> {
    let board = session.run_checked(QTS_BOARD_DATA)?.text();
    let mut kv = key_values(&board, '=');

    let dev_name = field(&mut kv, "DEV_NAME")?;
    let display_name = match dev_name.as_str() {
        "A820" | "A822" | "A920" | "W282" => format!("QTS_{dev_name}"),
        "WL8200-I2" => format!("DCN_{dev_name}"),
        "A923" => "DCN_SEAP380".to_string(),
        _ => {
            return Err(ClassifyError::Unsupported {
                what: "DEV_NAME",
                value: dev_name,
            });
        }
    };
    let mac = field(&mut kv, "MAC_ADDRESS")?;

    let info = QtsInfo {
        vendor: kv.remove("VENDOR_NAME").unwrap_or_default(),
        oem_name: kv.remove("DEV_OEMNAME").unwrap_or_default(),
        board_serial: kv.remove("BOARD_SERIAL_NUMBER").unwrap_or_default(),
        manufacturing_date: kv.remove("MANUFACTURING_DATE").unwrap_or_default(),
    };

    // The factory partition carries no firmware version.
    Ok(Device::new(
        session.host(),
        mac,
        dev_name,
        display_name,
        "",
        DeviceKind::Qts(info),
    ))
}

//! Firmware image catalog and local image cache.
//!
//! Every image the tool can install is listed here with the file name it
//! is cached under and the URL it comes from. Several models may share a
//! file name; the cache then downloads that file once and reuses it.

pub mod cache;
pub mod fetch;
pub mod mock;

use std::path::PathBuf;

use thiserror::Error;

use crate::device::{Device, Family};
use crate::model::Model;
use crate::targets::Operation;

pub use cache::ImageCache;
pub use fetch::{FetchError, Fetcher, HttpFetcher};
pub use mock::CountingFetcher;

macro_rules! image_url {
    ($path:literal) => {
        concat!("http://image.oakridge.vip:8000/images/ap/", $path)
    };
}

/// Where one image comes from and what it is called locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageSpec {
    pub filename: &'static str,
    pub url: &'static str,
}

const fn image(filename: &'static str, url: &'static str) -> ImageSpec {
    ImageSpec { filename, url }
}

const UNIFI_SYSUPGRADE: &str = image_url!("ubntunifi/sysloader/latest-sysupgrade.bin.tar.gz");
const AP152_SYSUPGRADE: &str = image_url!("ap152/sysloader/latest-sysupgrade.bin.tar.gz");
const ERX_SYSUPGRADE_URL: &str = image_url!("ubnterx/sysloader/latest-sysupgrade.bin.tar.gz");

const CONVERT: &[(Model, ImageSpec)] = &[
    (Model::AcLite, image("oakridge.sysloader.ubnt.tar.gz", UNIFI_SYSUPGRADE)),
    (Model::AcLr, image("oakridge.sysloader.ubnt.tar.gz", UNIFI_SYSUPGRADE)),
    (Model::AcPro, image("oakridge.sysloader.ubnt.tar.gz", UNIFI_SYSUPGRADE)),
    (Model::A820, image("oakridge.a820.tar.gz", AP152_SYSUPGRADE)),
    (Model::A822, image("oakridge.a822.tar.gz", AP152_SYSUPGRADE)),
    (Model::A920, image("oakridge.a920.tar.gz", AP152_SYSUPGRADE)),
    (Model::A923, image("oakridge.a923.tar.gz", AP152_SYSUPGRADE)),
    (Model::W282, image("oakridge.w282.tar.gz", AP152_SYSUPGRADE)),
    (Model::Wl8200I2, image("oakridge.wl8200_i2.tar.gz", AP152_SYSUPGRADE)),
];

const UPGRADE: &[(Model, ImageSpec)] = &[
    (Model::AcLite, image("aclite.tar.gz", UNIFI_SYSUPGRADE)),
    (Model::AcLr, image("aclr.tar.gz", UNIFI_SYSUPGRADE)),
    (Model::AcPro, image("acpro.tar.gz", UNIFI_SYSUPGRADE)),
    (Model::EdgeRouterX, image("ubnterx.tar.gz", ERX_SYSUPGRADE_URL)),
    (Model::A820, image("a820.tar.gz", AP152_SYSUPGRADE)),
    (Model::A822, image("a822.tar.gz", AP152_SYSUPGRADE)),
    (Model::A920, image("a920.tar.gz", AP152_SYSUPGRADE)),
    (Model::A923, image("a923.tar.gz", AP152_SYSUPGRADE)),
    (Model::W282, image("w282.tar.gz", AP152_SYSUPGRADE)),
    (Model::Wl8200I2, image("wl8200_i2.tar.gz", AP152_SYSUPGRADE)),
];

// Factory images must not share a cache name with the upgrade images above.
const RESTORE: &[(Model, ImageSpec)] = &[
    (
        Model::AcLite,
        image("origin.aclite.tar.gz", image_url!("ubntunifi/origin/AC-LITE/firmware.bin.tar.gz")),
    ),
    (
        Model::AcLr,
        image("origin.aclr.tar.gz", image_url!("ubntunifi/origin/AC-LR/firmware.bin.tar.gz")),
    ),
    (
        Model::AcPro,
        image("origin.acpro.tar.gz", image_url!("ubntunifi/origin/AC-PRO/firmware.bin.tar.gz")),
    ),
    (
        Model::A820,
        image("origin.a820.tar.gz", image_url!("ap152/origin/A820/firmware.bin.tar.gz")),
    ),
    (
        Model::A822,
        image("origin.a822.tar.gz", image_url!("ap152/origin/A822/firmware.bin.tar.gz")),
    ),
    (
        Model::A920,
        image("origin.a920.tar.gz", image_url!("ap152/origin/A920/firmware.bin.tar.gz")),
    ),
    (
        Model::A923,
        image("origin.a923.tar.gz", image_url!("ap152/origin/A923/firmware.bin.tar.gz")),
    ),
    (
        Model::W282,
        image("origin.w282.tar.gz", image_url!("ap152/origin/W282/firmware.bin.tar.gz")),
    ),
    (
        Model::Wl8200I2,
        image("origin.wl8200_i2.tar.gz", image_url!("ap152/origin/WL8200-I2/firmware.bin.tar.gz")),
    ),
];

/// EdgeRouter images. Conversion and restore use fixed sets instead of a
/// per-model entry.
pub mod erx {
    use super::{ImageSpec, image};

    pub const FACTORY: ImageSpec = image(
        "erx_factory.bin.tar.gz",
        image_url!("ubnterx/origin/factory.bin.tar.gz"),
    );
    pub const SYSUPGRADE: ImageSpec =
        image("oakridge_sysupgrade.bin.tar.gz", super::ERX_SYSUPGRADE_URL);
    pub const RECOVER: ImageSpec = image(
        "erx_recover.tar.tar.gz",
        image_url!("ubnterx/origin/recover-ubnt-erx.tar.tar.gz"),
    );
    pub const SQUASHFS: ImageSpec =
        image("erx_squashfs.tmp", image_url!("ubnterx/origin/squashfs.tmp"));
    pub const SQUASHFS_MD5: ImageSpec = image(
        "erx_squashfs.tmp.md5",
        image_url!("ubnterx/origin/squashfs.tmp.md5"),
    );
    pub const VERSION: ImageSpec =
        image("erx_version.tmp", image_url!("ubnterx/origin/version.tmp"));
    pub const VMLINUX: ImageSpec =
        image("erx_vmlinux.tmp", image_url!("ubnterx/origin/vmlinux.tmp"));
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("No {operation} image for {model}")]
    NoImage { operation: Operation, model: Model },

    #[error("Download of {url} failed: {source}")]
    Download {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("Cache error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Single-image entry for `operation` on `model`.
pub fn lookup(operation: Operation, model: Model) -> Result<ImageSpec, CatalogError> {
    let table = match operation {
        Operation::Convert => CONVERT,
        Operation::Upgrade => UPGRADE,
        Operation::Restore => RESTORE,
    };
    table
        .iter()
        .find(|(m, _)| *m == model)
        .map(|(_, spec)| *spec)
        .ok_or(CatalogError::NoImage { operation, model })
}

/// Published "latest version" files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionSource {
    /// Oakridge builds for ap152-class boards and everything already on
    /// Oakridge firmware.
    Ap152,
    /// UniFi line builds, used for stock Ubiquiti APs and routers.
    Unifi,
}

impl VersionSource {
    pub const ALL: [VersionSource; 2] = [VersionSource::Ap152, VersionSource::Unifi];

    pub fn filename(self) -> &'static str {
        match self {
            VersionSource::Ap152 => "latest-swversion-ap152.txt",
            VersionSource::Unifi => "latest-swversion-ubnt.txt",
        }
    }

    pub fn url(self) -> &'static str {
        match self {
            VersionSource::Ap152 => image_url!("ap152/sysloader/latest-swversion.txt"),
            VersionSource::Unifi => image_url!("ubntunifi/sysloader/latest-swversion.txt"),
        }
    }

    /// Version file that applies to `device`. Every device already on
    /// Oakridge firmware follows the ap152 builds, whatever its hardware.
    pub fn for_device(device: &Device) -> VersionSource {
        match device.family() {
            Family::Oakridge | Family::Qts => VersionSource::Ap152,
            Family::UbiquitiAp | Family::UbiquitiEdgeRouter => VersionSource::Unifi,
        }
    }
}

//! Supported hardware models and the vendor spellings that map onto them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical hardware model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Model {
    /// Ubiquiti UniFi AC Lite.
    AcLite,
    /// Ubiquiti UniFi AC Long Range.
    AcLr,
    /// Ubiquiti UniFi AC Pro.
    AcPro,
    /// Ubiquiti EdgeRouter X 5-port.
    EdgeRouterX,
    A820,
    A822,
    A920,
    A923,
    W282,
    Wl8200I2,
}

/// Firmware build line a model belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FirmwareLine {
    /// ar71xx UniFi builds.
    Unifi,
    /// ar71xx ap152 builds (QTS and DCN OEM boards).
    Ap152,
    /// ramips mt7621 EdgeRouter builds.
    EdgeRouter,
}

/// Every spelling seen in the field, old tags included.
const ALIASES: &[(&str, Model)] = &[
    ("AC-LITE", Model::AcLite),
    ("ubntlite", Model::AcLite),
    ("AC-LR", Model::AcLr),
    ("ubntlr", Model::AcLr),
    ("AC-PRO", Model::AcPro),
    ("ubntpro", Model::AcPro),
    ("EdgeRouter_ER-X", Model::EdgeRouterX),
    ("UBNT_ERX", Model::EdgeRouterX),
    ("ubnterx", Model::EdgeRouterX),
    ("A820", Model::A820),
    ("A822", Model::A822),
    ("A920", Model::A920),
    ("A923", Model::A923),
    ("W282", Model::W282),
    ("WL8200-I2", Model::Wl8200I2),
];

impl Model {
    pub const ALL: [Model; 10] = [
        Model::AcLite,
        Model::AcLr,
        Model::AcPro,
        Model::EdgeRouterX,
        Model::A820,
        Model::A822,
        Model::A920,
        Model::A923,
        Model::W282,
        Model::Wl8200I2,
    ];

    /// Resolve a vendor model code, old or new spelling.
    pub fn from_code(code: &str) -> Option<Model> {
        let code = code.trim();
        ALIASES
            .iter()
            .find(|(alias, _)| *alias == code)
            .map(|(_, model)| *model)
    }

    /// Current vendor spelling.
    pub fn code(self) -> &'static str {
        match self {
            Model::AcLite => "AC-LITE",
            Model::AcLr => "AC-LR",
            Model::AcPro => "AC-PRO",
            Model::EdgeRouterX => "EdgeRouter_ER-X",
            Model::A820 => "A820",
            Model::A822 => "A822",
            Model::A920 => "A920",
            Model::A923 => "A923",
            Model::W282 => "W282",
            Model::Wl8200I2 => "WL8200-I2",
        }
    }

    /// Name shown to operators.
    pub fn display_name(self) -> &'static str {
        match self {
            Model::AcLite => "UBNT_AC-LITE",
            Model::AcLr => "UBNT_AC-LR",
            Model::AcPro => "UBNT_AC-PRO",
            Model::EdgeRouterX => "UBNT_EdgeRouter-X",
            Model::A820 => "QTS_A820",
            Model::A822 => "QTS_A822",
            Model::A920 => "QTS_A920",
            Model::A923 => "DCN_SEAP-380",
            Model::W282 => "QTS_W282",
            Model::Wl8200I2 => "DCN_WL8200-I2",
        }
    }

    pub fn line(self) -> FirmwareLine {
        match self {
            Model::AcLite | Model::AcLr | Model::AcPro => FirmwareLine::Unifi,
            Model::EdgeRouterX => FirmwareLine::EdgeRouter,
            Model::A820
            | Model::A822
            | Model::A920
            | Model::A923
            | Model::W282
            | Model::Wl8200I2 => FirmwareLine::Ap152,
        }
    }
}

/// Display name for a raw model code; unknown codes are assumed to be QTS
/// OEM boards.
pub fn display_name_for(code: &str) -> String {
    match Model::from_code(code) {
        Some(model) => model.display_name().to_string(),
        None => format!("QTS_{}", code.trim()),
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Model {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Model::from_code(s).ok_or_else(|| format!("unsupported model `{s}`"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_old_tags_normalize() {
        assert_eq!(Model::from_code("ubntlite"), Some(Model::AcLite));
        assert_eq!(Model::from_code("ubntpro"), Some(Model::AcPro));
        assert_eq!(Model::from_code("UBNT_ERX"), Some(Model::EdgeRouterX));
        assert_eq!(Model::from_code("ubnterx\n"), Some(Model::EdgeRouterX));
        assert_eq!(Model::from_code("AP152"), None);
    }

    #[test]
    fn test_code_round_trip() {
        for model in Model::ALL {
            assert_eq!(Model::from_code(model.code()), Some(model));
        }
    }

    #[test]
    fn test_display_name_fallback() {
        assert_eq!(display_name_for("A923"), "DCN_SEAP-380");
        assert_eq!(display_name_for("ubntlr"), "UBNT_AC-LR");
        assert_eq!(display_name_for("X100"), "QTS_X100");
    }

    #[test]
    fn test_firmware_lines() {
        assert_eq!(Model::AcLr.line(), FirmwareLine::Unifi);
        assert_eq!(Model::Wl8200I2.line(), FirmwareLine::Ap152);
        assert_eq!(Model::EdgeRouterX.line(), FirmwareLine::EdgeRouter);
    }
}

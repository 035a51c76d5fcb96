//! Tool configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::flash::FlashSettings;
use crate::reach::IcmpProber;

/// Settings for a scan-and-flash run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BurnerConfig {
    /// Directory holding downloaded images and version files.
    pub cache_dir: PathBuf,
    /// SSH login timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Classification threads per subnet.
    pub scan_workers: usize,
    /// Delay between two probes of a round, in milliseconds.
    pub probe_interval_ms: u64,
    /// Rounds before a rebooting device counts as lost.
    pub max_probe_rounds: u32,
    /// Fixed delay between login attempts after a reboot. Unset uses the
    /// per-plan default.
    pub reconnect_interval_secs: Option<u64>,
    /// Login attempts after a reboot. Unset retries forever.
    pub reconnect_max_attempts: Option<u32>,
    /// Wait after a reboot before the first probe. Unset uses the per-plan
    /// default.
    pub settle_secs: Option<u64>,
    /// Drop cached "latest version" files at start-up.
    pub refresh_versions: bool,
    /// Whole-request timeout for downloads, in seconds.
    pub http_timeout_secs: u64,
}

impl Default for BurnerConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("."),
            connect_timeout_secs: 3,
            scan_workers: crate::scan::DEFAULT_WORKERS,
            probe_interval_ms: 1000,
            max_probe_rounds: 60,
            reconnect_interval_secs: None,
            reconnect_max_attempts: None,
            settle_secs: None,
            refresh_versions: true,
            http_timeout_secs: 600,
        }
    }
}

impl BurnerConfig {
    /// Load configuration from a TOML file. Missing keys take defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BurnerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn flash_settings(&self) -> FlashSettings {
        FlashSettings {
            connect_timeout: self.connect_timeout(),
            max_probe_rounds: self.max_probe_rounds,
            reconnect_interval: self.reconnect_interval_secs.map(Duration::from_secs),
            reconnect_max_attempts: self.reconnect_max_attempts,
            settle: self.settle_secs.map(Duration::from_secs),
        }
    }

    pub fn prober(&self) -> IcmpProber {
        IcmpProber {
            interval: Duration::from_millis(self.probe_interval_ms),
            ..IcmpProber::default()
        }
    }
}

//! Configuration file support for stmflash.
//!
//! Settings are resolved in this order, first match wins:
//! command-line flags, `STMFLASH_*` environment variables, `./stmflash.toml`,
//! then the global `config.toml` in the platform config directory.
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud = 115200
//! reply_mode = false
//!
//! [[serial.adapter]]
//! vid = 0x1A86
//! pid = 0x7523
//!
//! [target]
//! flash_size = "32"
//! start_address = 0x08000000
//! routines_dir = "res/stm8_routines"
//! go = true
//! ```

use anyhow::Context;
use directories::ProjectDirs;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Local configuration file name.
pub const LOCAL_CONFIG_FILE: &str = "stmflash.toml";

/// USB-UART adapter the user chose before, matched by VID/PID.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdapterId {
    /// USB vendor ID.
    pub vid: u16,
    /// USB product ID.
    pub pid: u16,
}

impl AdapterId {
    pub fn is(&self, vid: u16, pid: u16) -> bool {
        (self.vid, self.pid) == (vid, pid)
    }
}

/// `[serial]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSection {
    /// Port to use without asking.
    pub port: Option<String>,
    pub baud: Option<u32>,
    /// Echo every received byte back (STM8 single-wire UART).
    pub reply_mode: bool,
    /// Remembered adapters, preferred during auto-detection.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub adapter: Vec<AdapterId>,
}

impl SerialSection {
    fn overlay(&mut self, top: Self) {
        self.port = top.port.or(self.port.take());
        self.baud = top.baud.or(self.baud);
        self.reply_mode |= top.reply_mode;
        for id in top.adapter {
            self.add_adapter(id);
        }
    }

    /// Add `id` unless it is already known. Returns whether it was added.
    fn add_adapter(&mut self, id: AdapterId) -> bool {
        let new = !self.adapter.contains(&id);
        if new {
            self.adapter.push(id);
        }
        new
    }

    /// Whether the adapter with this VID/PID was remembered.
    pub fn knows_adapter(&self, vid: u16, pid: u16) -> bool {
        self.adapter.iter().any(|id| id.is(vid, pid))
    }
}

/// `[target]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSection {
    /// STM8 flash size in KiB ("0", "32", "128" or "256").
    pub flash_size: Option<String>,
    /// GO address when the image has no start address record.
    pub start_address: Option<u32>,
    /// Directory of the STM8 erase/write routines.
    pub routines_dir: Option<PathBuf>,
    /// Jump to the application after every flash.
    pub go: bool,
}

impl TargetSection {
    fn overlay(&mut self, top: Self) {
        self.flash_size = top.flash_size.or(self.flash_size.take());
        self.start_address = top.start_address.or(self.start_address);
        self.routines_dir = top.routines_dir.or(self.routines_dir.take());
        self.go |= top.go;
    }
}

/// Merged configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialSection,
    pub target: TargetSection,
}

impl Config {
    /// Global file, then the local one on top.
    pub fn load() -> Self {
        let files = Self::global_config_path()
            .into_iter()
            .chain([PathBuf::from(LOCAL_CONFIG_FILE)]);

        let mut config = Self::default();
        for path in files.filter(|p| p.is_file()) {
            match Self::read(&path) {
                Ok(layer) => {
                    debug!("Loaded config from {}", path.display());
                    config.overlay(layer);
                },
                Err(e) => warn!("Ignoring config file: {e:#}"),
            }
        }
        config
    }

    /// Load only the file given with `--config`.
    pub fn load_from_path(path: &Path) -> Self {
        Self::read(path).unwrap_or_else(|e| {
            warn!("{e:#}, using defaults");
            Self::default()
        })
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("cannot parse {}", path.display()))
    }

    /// Platform config directory for stmflash.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "stmflash").map(|dirs| dirs.config_dir().to_path_buf())
    }

    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    fn overlay(&mut self, top: Self) {
        self.serial.overlay(top.serial);
        self.target.overlay(top.target);
    }

    /// Remember an adapter so later runs pick it without asking.
    ///
    /// Written to `./stmflash.toml` if present, else to the global file.
    pub fn remember_adapter(&mut self, vid: u16, pid: u16) -> anyhow::Result<()> {
        let id = AdapterId { vid, pid };
        if !self.serial.add_adapter(id) {
            return Ok(());
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        let path = match Self::global_config_path() {
            Some(global) if !local.exists() => global,
            _ => local,
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("cannot create {}", dir.display()))?;
        }

        Self::store_adapter(&path, id)?;
        info!("Remembered adapter {vid:04X}:{pid:04X} in {}", path.display());
        Ok(())
    }

    /// Add `id` to the file at `path`, keeping everything else in it.
    fn store_adapter(path: &Path, id: AdapterId) -> anyhow::Result<()> {
        let mut on_disk = if path.exists() {
            Self::read(path)?
        } else {
            Self::default()
        };
        on_disk.serial.add_adapter(id);
        fs::write(path, toml::to_string_pretty(&on_disk)?)
            .with_context(|| format!("cannot write {}", path.display()))?;
        Ok(())
    }
}

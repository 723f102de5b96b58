//! STM8 erase/write routines.
//!
//! STM8 ROM bootloaders cannot erase or program flash on their own. A small
//! routine blob, matched to the flash size and the bootloader version, has
//! to be written to RAM first. The blobs ship as files named
//! `E_W_ROUTINEs_<flash>K_ver_<version>.bin`.

use crate::error::{Error, Result};
use log::debug;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// RAM address the routines are loaded to.
pub const ROUTINES_ADDRESS: u32 = 0xA0;

/// Flash size class of an STM8 device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlashSize {
    /// STM8L devices, whose bootloader needs no routines ("0").
    None,
    /// 32 KiB.
    K32,
    /// 128 KiB.
    K128,
    /// 256 KiB.
    K256,
}

impl FlashSize {
    /// Size in KiB, 0 for [`FlashSize::None`].
    pub fn kilobytes(self) -> u32 {
        match self {
            Self::None => 0,
            Self::K32 => 32,
            Self::K128 => 128,
            Self::K256 => 256,
        }
    }

    /// Whether routines must be uploaded for this flash size.
    pub fn needs_routines(self) -> bool {
        self != Self::None
    }
}

impl FromStr for FlashSize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "0" => Ok(Self::None),
            "32" => Ok(Self::K32),
            "128" => Ok(Self::K128),
            "256" => Ok(Self::K256),
            other => Err(Error::Config(format!(
                "unsupported flash size '{other}', expected 0, 32, 128 or 256"
            ))),
        }
    }
}

impl std::fmt::Display for FlashSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kilobytes())
    }
}

/// Device selection used to pick the routines blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSelection {
    /// Flash size class.
    pub flash: FlashSize,
    /// Bootloader version as reported by GET, e.g. "1.3".
    pub bl_version: String,
}

impl DeviceSelection {
    /// Create a selection.
    ///
    /// A version is required whenever the flash size needs routines.
    pub fn new(flash: FlashSize, bl_version: impl Into<String>) -> Result<Self> {
        let bl_version = bl_version.into();
        if flash.needs_routines() && bl_version.trim().is_empty() {
            return Err(Error::Config(
                "bootloader version is required to select erase/write routines".to_string(),
            ));
        }
        Ok(Self { flash, bl_version })
    }

    /// Parse a selection from its textual flash size.
    pub fn parse(flash: &str, bl_version: &str) -> Result<Self> {
        Self::new(flash.parse()?, bl_version)
    }

    /// Routines file for this selection, `None` when no routines are needed.
    pub fn routines_file(&self) -> Option<String> {
        self.flash
            .needs_routines()
            .then(|| routines_file_name(self.flash.kilobytes(), &self.bl_version))
    }
}

/// File name of the routines for a flash size (KiB) and bootloader version.
pub fn routines_file_name(flash_kb: u32, bl_version: &str) -> String {
    format!("E_W_ROUTINEs_{flash_kb}K_ver_{bl_version}.bin")
}

/// Upload state of the routines within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoutinesState {
    /// Must be uploaded before WRITE or ERASE.
    #[default]
    NotLoaded,
    /// Upload in progress.
    Loading,
    /// Uploaded, or not needed.
    Loaded,
}

/// Source of routine blobs.
pub trait RoutineLoader: Send {
    /// Fetch the blob called `name`.
    fn load(&self, name: &str) -> Result<Vec<u8>>;
}

/// Loads routine blobs from a directory.
#[derive(Debug, Clone)]
pub struct DirRoutineLoader {
    dir: PathBuf,
}

impl DirRoutineLoader {
    /// Create a loader reading from `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Directory the blobs are read from.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl RoutineLoader for DirRoutineLoader {
    fn load(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.dir.join(name);
        debug!("Reading routines from: {}", path.display());
        std::fs::read(&path).map_err(|source| Error::Asset {
            name: path.display().to_string(),
            source,
        })
    }
}

/// In-memory blobs keyed by file name.
impl RoutineLoader for HashMap<String, Vec<u8>> {
    fn load(&self, name: &str) -> Result<Vec<u8>> {
        self.get(name).cloned().ok_or_else(|| Error::Asset {
            name: name.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such routines"),
        })
    }
}

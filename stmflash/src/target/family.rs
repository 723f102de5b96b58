//! Device families and bootloader information.
//!
//! The family is not configured by the user: it is inferred once from the
//! command list returned by GET. Only STM32 bootloaders list GET ID (0x02).

use crate::protocol::Command;
use std::fmt;

/// Write block size of STM8 bootloaders.
pub const STM8_WRITE_BLOCK_SIZE: usize = 128;

/// Write block size of STM32 bootloaders.
pub const STM32_WRITE_BLOCK_SIZE: usize = 256;

/// Largest READ transfer, for both families.
pub const READ_BLOCK_SIZE: usize = 256;

/// Microcontroller family behind the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Family {
    /// STM8: small write blocks, needs erase/write routines in RAM.
    #[default]
    Stm8,
    /// STM32: everything is built into the ROM bootloader.
    Stm32,
}

impl Family {
    /// Infer the family from the command list returned by GET.
    pub fn from_commands(commands: &[u8]) -> Self {
        if commands.contains(&Command::GetId.opcode()) {
            Self::Stm32
        } else {
            Self::Stm8
        }
    }

    /// Transfer limits and requirements of this family.
    pub fn capabilities(self) -> Capabilities {
        match self {
            Self::Stm8 => Capabilities {
                write_block_size: STM8_WRITE_BLOCK_SIZE,
                read_block_size: READ_BLOCK_SIZE,
                needs_routines: true,
            },
            Self::Stm32 => Capabilities {
                write_block_size: STM32_WRITE_BLOCK_SIZE,
                read_block_size: READ_BLOCK_SIZE,
                needs_routines: false,
            },
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stm8 => write!(f, "STM8"),
            Self::Stm32 => write!(f, "STM32"),
        }
    }
}

/// What a session may send, resolved after GET.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Largest WRITE payload.
    pub write_block_size: usize,
    /// Largest READ payload.
    pub read_block_size: usize,
    /// Whether erase/write routines must be uploaded before WRITE or ERASE.
    pub needs_routines: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Family::default().capabilities()
    }
}

/// Result of GET.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BootloaderInfo {
    /// Bootloader version, e.g. "3.1".
    pub bl_version: String,
    /// Supported command opcodes, in the order the device listed them.
    pub commands: Vec<u8>,
    /// Family inferred from `commands`.
    pub family: Family,
}

impl BootloaderInfo {
    /// Whether the bootloader listed `command`.
    pub fn supports(&self, command: Command) -> bool {
        self.commands.contains(&command.opcode())
    }
}

/// Result of GET VERSION.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct VersionInfo {
    /// Bootloader version, e.g. "3.1".
    pub bl_version: String,
    /// Number of times read protection was enabled.
    pub rp_enabled: u8,
    /// Number of times read protection was disabled.
    pub rp_disabled: u8,
}

/// Format a BCD-style version byte (0x31 -> "3.1").
pub fn format_version(byte: u8) -> String {
    format!("{}.{}", byte >> 4, byte & 0x0F)
}

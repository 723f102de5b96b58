//! Bootloader opcodes and handshake bytes.

/// Positive acknowledgement.
pub const ACK: u8 = 0x79;

/// Negative acknowledgement.
pub const NACK: u8 = 0x1F;

/// Synchronization byte sent once after reset to start the bootloader.
pub const SYNC: u8 = 0x7F;

/// Bootloader commands (opcode byte of the command frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Version and list of supported commands (0x00).
    Get = 0x00,

    /// Bootloader version and read protection status (0x01).
    GetVersion = 0x01,

    /// Product ID (0x02). Only STM32 bootloaders list it.
    GetId = 0x02,

    /// Read up to 256 bytes of memory (0x11).
    ReadMemory = 0x11,

    /// Jump to user code (0x21).
    Go = 0x21,

    /// Write up to 256 bytes to RAM or flash (0x31).
    WriteMemory = 0x31,

    /// Erase flash pages (0x43).
    Erase = 0x43,

    /// Erase flash pages with two-byte page numbers (0x44).
    ExtendedErase = 0x44,

    /// Disable write protection (0x73).
    WriteUnprotect = 0x73,

    /// Disable readout protection (0x92).
    ReadoutUnprotect = 0x92,
}

impl Command {
    /// Opcode byte.
    pub fn opcode(self) -> u8 {
        self as u8
    }

    /// Complement byte sent after the opcode (`0xFF ^ opcode`).
    pub fn complement(self) -> u8 {
        0xFF ^ self as u8
    }

    /// Human readable command name, used in logs and errors.
    pub fn name(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::GetVersion => "GV",
            Self::GetId => "GID",
            Self::ReadMemory => "READ",
            Self::Go => "GO",
            Self::WriteMemory => "WRITE",
            Self::Erase => "ERASE",
            Self::ExtendedErase => "EXTENDED ERASE",
            Self::WriteUnprotect => "WRITE UNPROTECT",
            Self::ReadoutUnprotect => "READOUT UNPROTECT",
        }
    }

    /// Payload that erases the whole flash for this erase flavour.
    pub fn mass_erase_payload(self) -> Option<&'static [u8]> {
        match self {
            Self::Erase => Some(&[0xFF, 0x00]),
            Self::ExtendedErase => Some(&[0xFF, 0xFF, 0x00]),
            _ => None,
        }
    }

    /// Look up a command by opcode.
    pub fn from_opcode(opcode: u8) -> Option<Self> {
        Some(match opcode {
            0x00 => Self::Get,
            0x01 => Self::GetVersion,
            0x02 => Self::GetId,
            0x11 => Self::ReadMemory,
            0x21 => Self::Go,
            0x31 => Self::WriteMemory,
            0x43 => Self::Erase,
            0x44 => Self::ExtendedErase,
            0x73 => Self::WriteUnprotect,
            0x92 => Self::ReadoutUnprotect,
            _ => return None,
        })
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:#04x})", self.name(), self.opcode())
    }
}

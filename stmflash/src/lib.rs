//! # stmflash
//!
//! A library for flashing STM8 and STM32 microcontrollers through their
//! built-in UART ROM bootloader.
//!
//! This crate provides:
//!
//! - Motorola S-record and Intel HEX parsing into memory records
//! - Packing of records into write-sized contiguous blocks
//! - The bootloader protocol engine (GET, GET VERSION, GET ID, READ, WRITE,
//!   GO, ERASE/EXTENDED ERASE, WRITE/READOUT UNPROTECT), reply mode included
//! - Upload of the STM8 erase/write routines
//! - Serial port discovery
//!
//! ## Features
//!
//! - `native` (default): Native serial port support via the `serialport` crate
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use stmflash::{Bootloader, ConnectOptions, EngineConfig, Family, image};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "native")]
//!     {
//!         let port = stmflash::NativePort::with_name("/dev/ttyUSB0");
//!         let mut bootloader = Bootloader::new(port, EngineConfig::default());
//!         bootloader.connect(&ConnectOptions::new(115200))?;
//!
//!         let info = bootloader.get_commands()?;
//!         if info.family == Family::Stm32 {
//!             println!("Product ID: {}", bootloader.get_id()?);
//!         }
//!
//!         let records = image::load_image("firmware.s19", None, bootloader.write_block_size())?;
//!         let summary = bootloader.program(&records, |block, total| {
//!             println!("Writing block {}/{}", block + 1, total);
//!         })?;
//!         if let Some(entry) = summary.start_address {
//!             bootloader.go(entry)?;
//!         }
//!         bootloader.disconnect()?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod device;
pub mod error;
pub mod image;
pub mod port;
pub mod protocol;
pub mod target;

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::native::NativePort;
pub use {
    device::{DetectedPort, DeviceKind, auto_detect_port, detect_ports, select_best_port},
    error::{Error, ErrorKind, Result},
    image::{ImageFormat, MemoryRecord, RecordKind},
    port::{Level, Line, LineSettings, Parity, Port, SerialConfig, Signals},
    protocol::Command,
    target::{
        Bootloader, BootloaderInfo, ConnectOptions, DeviceSelection, EngineConfig, EngineState,
        Family, FlashSize, ProgramSummary, RoutinesState, VersionInfo,
    },
};

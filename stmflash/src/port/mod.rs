//! Port abstraction for the bootloader transport.
//!
//! The protocol engine never touches a serial device directly. It drives a
//! [`Port`], which exposes exactly what the bootloader exchange needs:
//!
//! ```text
//! +------------------+
//! | Bootloader<P>    |  frames, ACK/NACK, reply-mode echo
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |   Port trait     |  open/close, response reads, RESET/BOOT0 lines
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |   NativePort     |  serialport crate
//! +------------------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use stmflash::port::{LineSettings, Parity, Port};
//!
//! fn ping<P: Port>(port: &mut P) -> stmflash::Result<Vec<u8>> {
//!     port.open(&LineSettings::new(115200, Parity::Even))?;
//!     port.write_bytes(&[0x7F])?;
//!     port.read_response()
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;
#[cfg(feature = "native")]
pub use native::NativePort;

#[cfg(test)]
pub(crate) mod mock;

use std::time::Duration;

use crate::error::Result;

/// Serial port configuration.
///
/// Baud rate and parity given here are defaults; the engine chooses the
/// values used for a session through [`LineSettings`] on [`Port::open`].
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Timeout waiting for the first byte of a response.
    pub timeout: Duration,
    /// Silence after which a response is considered complete.
    pub response_gap: Duration,
    /// Data bits (the bootloader always uses 8).
    pub data_bits: DataBits,
    /// Parity.
    pub parity: Parity,
    /// Stop bits (typically One).
    pub stop_bits: StopBits,
    /// Flow control (must stay None, RTS drives BOOT0).
    pub flow_control: FlowControl,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: 115200,
            timeout: Duration::from_millis(1000),
            response_gap: Duration::from_millis(10),
            data_bits: DataBits::Eight,
            parity: Parity::Even,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the first-byte timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the inter-byte silence that ends a response.
    #[must_use]
    pub fn with_response_gap(mut self, gap: Duration) -> Self {
        self.response_gap = gap;
        self
    }
}

/// Line settings applied when a session opens the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSettings {
    /// Baud rate.
    pub baud_rate: u32,
    /// Parity.
    pub parity: Parity,
}

impl LineSettings {
    /// Create line settings.
    pub fn new(baud_rate: u32, parity: Parity) -> Self {
        Self { baud_rate, parity }
    }
}

/// Number of data bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataBits {
    /// 7 data bits.
    Seven,
    /// 8 data bits.
    #[default]
    Eight,
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    /// No parity.
    None,
    /// Odd parity.
    Odd,
    /// Even parity.
    #[default]
    Even,
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBits {
    /// 1 stop bit.
    #[default]
    One,
    /// 2 stop bits.
    Two,
}

/// Flow control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowControl {
    /// No flow control.
    #[default]
    None,
    /// Hardware flow control (RTS/CTS).
    Hardware,
    /// Software flow control (XON/XOFF).
    Software,
}

/// Target control line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    /// NRST of the target.
    Reset,
    /// BOOT0 (boot mode selection) of the target.
    Boot0,
}

/// Electrical level of a target control line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Pin driven high.
    High,
    /// Pin driven low.
    Low,
}

impl std::fmt::Display for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Reset => "RESET",
            Self::Boot0 => "BOOT0",
        })
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::High => "high",
            Self::Low => "low",
        })
    }
}

/// Set of control line changes applied together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Signals {
    /// New RESET level, unchanged if `None`.
    pub reset: Option<Level>,
    /// New BOOT0 level, unchanged if `None`.
    pub boot0: Option<Level>,
}

impl Signals {
    /// No changes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive RESET to `level`.
    #[must_use]
    pub fn reset(mut self, level: Level) -> Self {
        self.reset = Some(level);
        self
    }

    /// Drive BOOT0 to `level`.
    #[must_use]
    pub fn boot0(mut self, level: Level) -> Self {
        self.boot0 = Some(level);
        self
    }

    /// Requested changes, RESET first.
    pub fn iter(&self) -> impl Iterator<Item = (Line, Level)> {
        [
            self.reset.map(|level| (Line::Reset, level)),
            self.boot0.map(|level| (Line::Boot0, level)),
        ]
        .into_iter()
        .flatten()
    }
}

/// Transport used by the bootloader engine.
///
/// A session owns its port exclusively; implementations need no locking.
pub trait Port: Send {
    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Whether the port is currently open.
    fn is_open(&self) -> bool;

    /// Open the port with the given line settings.
    fn open(&mut self, settings: &LineSettings) -> Result<()>;

    /// Close the port and release resources. Closing a closed port is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Read one response: at least one byte, then whatever arrives without a pause.
    ///
    /// A device that sends bytes one at a time yields one byte per call.
    fn read_response(&mut self) -> Result<Vec<u8>>;

    /// Write all bytes, blocking until complete.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;

    /// Drive the target control lines.
    fn control(&mut self, signals: &Signals) -> Result<()>;
}

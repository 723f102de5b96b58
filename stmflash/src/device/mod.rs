//! Serial port discovery and classification.
//!
//! The bootloader needs a UART with DTR and RTS wired to the target's NRST
//! and BOOT0. Ports are classified by USB VID/PID so that adapters able to
//! do this are preferred during auto-selection.

use crate::error::{Error, Result};
use log::info;

#[cfg(feature = "native")]
use log::{debug, trace};

/// USB-UART adapter families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DeviceKind {
    /// WCH CH340/CH341.
    Ch340,
    /// Silicon Labs CP210x.
    Cp210x,
    /// FTDI FT232 and friends.
    Ftdi,
    /// Prolific PL2303.
    Prolific,
    /// ST-LINK virtual COM port (no DTR/RTS on the target side).
    StLink,
    /// Anything else, including on-board UARTs.
    Unknown,
}

impl DeviceKind {
    /// Classify a USB VID/PID pair.
    #[must_use]
    pub fn from_vid_pid(vid: u16, pid: u16) -> Self {
        match (vid, pid) {
            (0x1A86, 0x7523 | 0x7522 | 0x5523 | 0x5512 | 0x55D4) => Self::Ch340,
            (0x10C4, 0xEA60 | 0xEA70 | 0xEA71 | 0xEA63) => Self::Cp210x,
            (0x0403, 0x6001 | 0x6010 | 0x6011 | 0x6014 | 0x6015) => Self::Ftdi,
            (0x067B, 0x2303 | 0x23A3 | 0x23C3 | 0x23D3) => Self::Prolific,
            (0x0483, 0x374B | 0x374E | 0x374F | 0x3752 | 0x3753 | 0x3754) => Self::StLink,
            _ => Self::Unknown,
        }
    }

    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ch340 => "CH340/CH341",
            Self::Cp210x => "CP210x",
            Self::Ftdi => "FTDI",
            Self::Prolific => "PL2303",
            Self::StLink => "ST-LINK VCP",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether the VID/PID matched a known adapter.
    pub fn is_known(&self) -> bool {
        *self != Self::Unknown
    }

    /// Whether the adapter can drive RESET and BOOT0 through DTR/RTS.
    pub fn has_control_lines(&self) -> bool {
        matches!(self, Self::Ch340 | Self::Cp210x | Self::Ftdi | Self::Prolific)
    }

    /// Auto-selection order, lower is better.
    ///
    /// PL2303 clones often mishandle DTR/RTS, so they rank below the other
    /// adapters with control lines.
    fn rank(self) -> u8 {
        match self {
            Self::Ch340 | Self::Cp210x | Self::Ftdi => 0,
            Self::Prolific => 1,
            Self::StLink => 2,
            Self::Unknown => 3,
        }
    }
}

/// Discovered serial port.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DetectedPort {
    /// Port name/path (e.g., "/dev/ttyUSB0" or "COM3").
    pub name: String,
    /// Adapter family.
    pub device: DeviceKind,
    /// USB vendor ID.
    pub vid: Option<u16>,
    /// USB product ID.
    pub pid: Option<u16>,
    /// USB manufacturer string.
    pub manufacturer: Option<String>,
    /// USB product string.
    pub product: Option<String>,
    /// USB serial number.
    pub serial: Option<String>,
}

impl DetectedPort {
    /// Create an entry for a port without USB metadata.
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device: DeviceKind::Unknown,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial: None,
        }
    }

    #[cfg(feature = "native")]
    fn from_info(info: serialport::SerialPortInfo) -> Self {
        let mut port = Self::plain(info.port_name);
        if let serialport::SerialPortType::UsbPort(usb) = info.port_type {
            port.device = DeviceKind::from_vid_pid(usb.vid, usb.pid);
            port.vid = Some(usb.vid);
            port.pid = Some(usb.pid);
            port.manufacturer = usb.manufacturer;
            port.product = usb.product;
            port.serial = usb.serial_number;
            trace!(
                "{}: USB {:04X}:{:04X} ({})",
                port.name,
                usb.vid,
                usb.pid,
                port.device.name()
            );
        }
        port
    }
}

/// Enumerate the serial ports of this machine.
///
/// Enumeration failures are logged and yield an empty list.
#[cfg(feature = "native")]
pub fn detect_ports() -> Vec<DetectedPort> {
    match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(DetectedPort::from_info).collect(),
        Err(e) => {
            debug!("Failed to enumerate serial ports: {e}");
            Vec::new()
        },
    }
}

/// Enumerate the serial ports of this machine (no native support compiled in).
#[cfg(not(feature = "native"))]
pub fn detect_ports() -> Vec<DetectedPort> {
    Vec::new()
}

/// Pick the best candidate among `ports`.
///
/// CH340, CP210x and FTDI adapters come first, then PL2303, then ST-LINK,
/// then anything else. Ties keep the enumeration order.
pub fn select_best_port(ports: &[DetectedPort]) -> Option<&DetectedPort> {
    ports.iter().min_by_key(|p| p.device.rank())
}

/// Detect ports and pick the best one.
pub fn auto_detect_port() -> Result<DetectedPort> {
    let ports = detect_ports();
    let port = select_best_port(&ports)
        .cloned()
        .ok_or_else(|| Error::Transport("no serial port found".to_string()))?;

    if port.device.is_known() {
        info!("Auto-detected {} adapter on {}", port.device.name(), port.name);
    } else {
        info!("No known USB-UART adapter, using {}", port.name);
    }
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usb(name: &str, vid: u16, pid: u16) -> DetectedPort {
        DetectedPort {
            vid: Some(vid),
            pid: Some(pid),
            device: DeviceKind::from_vid_pid(vid, pid),
            ..DetectedPort::plain(name)
        }
    }

    #[test]
    fn test_classification() {
        let cases = [
            (0x1A86, 0x7523, DeviceKind::Ch340),
            (0x10C4, 0xEA60, DeviceKind::Cp210x),
            (0x0403, 0x6001, DeviceKind::Ftdi),
            (0x067B, 0x2303, DeviceKind::Prolific),
            (0x0483, 0x374B, DeviceKind::StLink),
            // ST DFU, not a UART
            (0x0483, 0xDF11, DeviceKind::Unknown),
            (0x1234, 0x5678, DeviceKind::Unknown),
        ];
        for (vid, pid, kind) in cases {
            assert_eq!(DeviceKind::from_vid_pid(vid, pid), kind, "{vid:04X}:{pid:04X}");
        }
    }

    #[test]
    fn test_control_lines() {
        assert!(DeviceKind::Ftdi.has_control_lines());
        assert!(DeviceKind::Prolific.has_control_lines());
        assert!(!DeviceKind::StLink.has_control_lines());
        assert!(DeviceKind::StLink.is_known());
        assert!(!DeviceKind::Unknown.is_known());
    }

    #[test]
    fn test_select_best_port() {
        let ports = vec![
            DetectedPort::plain("/dev/ttyS0"),
            usb("/dev/ttyACM0", 0x0483, 0x374B),
            usb("/dev/ttyUSB0", 0x067B, 0x2303),
            usb("/dev/ttyUSB1", 0x1A86, 0x7523),
        ];
        assert_eq!(select_best_port(&ports).unwrap().name, "/dev/ttyUSB1");
        assert_eq!(select_best_port(&ports[..3]).unwrap().name, "/dev/ttyUSB0");
        assert_eq!(select_best_port(&ports[..2]).unwrap().name, "/dev/ttyACM0");
        assert_eq!(select_best_port(&ports[..1]).unwrap().name, "/dev/ttyS0");
        assert!(select_best_port(&[]).is_none());
    }

    #[test]
    fn test_select_best_port_keeps_enumeration_order_on_ties() {
        let ports = vec![
            usb("/dev/ttyUSB3", 0x0403, 0x6001),
            usb("/dev/ttyUSB2", 0x10C4, 0xEA60),
        ];
        assert_eq!(select_best_port(&ports).unwrap().name, "/dev/ttyUSB3");
    }
}

//! Native serial port implementation using the `serialport` crate.
//!
//! USB-UART adapters wire the modem lines to the target as:
//!
//! | line  | adapter pin | asserted = pin |
//! |-------|-------------|----------------|
//! | RESET | DTR         | low            |
//! | BOOT0 | RTS         | low            |

use {
    crate::{
        error::{Error, Result},
        port::{
            DataBits, FlowControl, Level, Line, LineSettings, Parity, Port, SerialConfig, Signals,
            StopBits,
        },
    },
    log::{debug, trace},
    serialport::ClearBuffer,
    std::io::{ErrorKind, Read, Write},
    std::time::Duration,
};

/// Native serial port implementation.
///
/// Created closed; the engine opens it with session line settings.
pub struct NativePort {
    port: Option<Box<dyn serialport::SerialPort>>,
    config: SerialConfig,
}

impl NativePort {
    /// Create a closed port with the given configuration.
    pub fn new(config: SerialConfig) -> Self {
        Self { port: None, config }
    }

    /// Create a closed port with default settings.
    pub fn with_name(port_name: &str) -> Self {
        Self::new(SerialConfig::new(port_name, SerialConfig::default().baud_rate))
    }

    /// Port configuration.
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Change the first-byte timeout, on the open port too.
    ///
    /// Mass erase can keep the bootloader silent for many seconds.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.config.timeout = timeout;
        if let Some(port) = self.port.as_mut() {
            port.set_timeout(timeout)?;
        }
        Ok(())
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>> {
        self.port.as_mut().ok_or_else(|| {
            Error::Serial(serialport::Error::new(
                serialport::ErrorKind::NoDevice,
                "Port is closed",
            ))
        })
    }

    /// Collect bytes until the line stays silent for `response_gap`.
    fn drain_into(&mut self, response: &mut Vec<u8>) -> Result<()> {
        let gap = self.config.response_gap;
        let timeout = self.config.timeout;
        let port = self.port_mut()?;
        port.set_timeout(gap)?;

        let mut buf = [0u8; 256];
        let result = loop {
            match port.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(n) => response.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::TimedOut => break Ok(()),
                Err(e) => break Err(Error::Io(e)),
            }
        };

        port.set_timeout(timeout)?;
        result
    }
}

impl Port for NativePort {
    fn name(&self) -> &str {
        &self.config.port_name
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn open(&mut self, settings: &LineSettings) -> Result<()> {
        if self.port.is_some() {
            return Err(Error::State(format!("{} is already open", self.config.port_name)));
        }

        let port = serialport::new(&self.config.port_name, settings.baud_rate)
            .timeout(self.config.timeout)
            .data_bits(self.config.data_bits.into())
            .parity(settings.parity.into())
            .stop_bits(self.config.stop_bits.into())
            .flow_control(self.config.flow_control.into())
            .open()?;
        port.clear(ClearBuffer::All)?;

        debug!(
            "Opened {} at {} baud, parity {:?}",
            self.config.port_name, settings.baud_rate, settings.parity
        );
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            debug!("Closed {}", self.config.port_name);
        }
        Ok(())
    }

    fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut first = [0u8; 1];
        self.port_mut()?.read_exact(&mut first)?;

        let mut response = vec![first[0]];
        self.drain_into(&mut response)?;
        trace!("<- {response:02X?}");
        Ok(response)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        trace!("-> {bytes:02X?}");
        let port = self.port_mut()?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn control(&mut self, signals: &Signals) -> Result<()> {
        let port = self.port_mut()?;
        for (line, level) in signals.iter() {
            trace!("Setting {line} {level}");
            let asserted = level == Level::Low;
            match line {
                Line::Reset => port.write_data_terminal_ready(asserted)?,
                Line::Boot0 => port.write_request_to_send(asserted)?,
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for NativePort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativePort")
            .field("name", &self.config.port_name)
            .field("open", &self.port.is_some())
            .finish_non_exhaustive()
    }
}

// Type conversions from our types to serialport types

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Seven => Self::Seven,
            DataBits::Eight => Self::Eight,
        }
    }
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => Self::None,
            Parity::Odd => Self::Odd,
            Parity::Even => Self::Even,
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => Self::One,
            StopBits::Two => Self::Two,
        }
    }
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => Self::None,
            FlowControl::Hardware => Self::Hardware,
            FlowControl::Software => Self::Software,
        }
    }
}

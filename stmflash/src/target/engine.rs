//! Bootloader protocol engine.
//!
//! [`Bootloader`] owns a [`Port`] and drives one target through the ROM
//! bootloader session:
//!
//! ```text
//! Disconnected -> Connecting -> Activating -> Ready -> Disconnecting -> Disconnected
//! ```
//!
//! Every command is a straight sequence of frame writes, each followed by a
//! single response read. In reply mode the first byte of every response is
//! echoed back before the read is considered complete.
//!
//! ## Example
//!
//! ```rust,no_run
//! use stmflash::image::load_image;
//! use stmflash::port::{NativePort, SerialConfig};
//! use stmflash::target::{Bootloader, ConnectOptions, EngineConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let port = NativePort::new(SerialConfig::new("/dev/ttyUSB0", 115200));
//!     let mut bootloader = Bootloader::new(port, EngineConfig::default());
//!
//!     bootloader.connect(&ConnectOptions::new(115200))?;
//!     let info = bootloader.get_commands()?;
//!     println!("Bootloader {} ({})", info.bl_version, info.family);
//!
//!     let records = load_image("firmware.hex", None, bootloader.write_block_size())?;
//!     bootloader.erase_all()?;
//!     bootloader.program(&records, |block, total| println!("Writing block {}/{}", block + 1, total))?;
//!     bootloader.disconnect()?;
//!     Ok(())
//! }
//! ```

use crate::error::{Error, Result};
use crate::image::record::{MemoryRecord, RecordKind};
use crate::port::{Level, LineSettings, Parity, Port, Signals};
use crate::protocol::{ACK, Command, NACK, SYNC, address_frame, command_frame, count_frame, data_frame};
use crate::target::family::{BootloaderInfo, Capabilities, Family, VersionInfo, format_version};
use crate::target::routines::{
    DeviceSelection, DirRoutineLoader, ROUTINES_ADDRESS, RoutineLoader, RoutinesState,
};
use log::{debug, info, trace, warn};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Delay after releasing RESET before the bootloader accepts SYNC.
pub const RESET_SETTLE: Duration = Duration::from_millis(200);

/// Default directory of the STM8 routine blobs.
pub const DEFAULT_ROUTINES_DIR: &str = "res/stm8_routines";

/// Engine configuration, fixed at construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Delay after releasing RESET.
    pub reset_settle: Duration,
    /// Directory holding the STM8 erase/write routine blobs.
    pub routines_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reset_settle: RESET_SETTLE,
            routines_dir: PathBuf::from(DEFAULT_ROUTINES_DIR),
        }
    }
}

/// Per-connection options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Baud rate.
    pub baud_rate: u32,
    /// Echo every received byte back to the device.
    pub reply_mode: bool,
}

impl ConnectOptions {
    /// Options for a plain (non-reply) connection.
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            reply_mode: false,
        }
    }

    /// Enable or disable reply mode.
    #[must_use]
    pub fn with_reply_mode(mut self, reply_mode: bool) -> Self {
        self.reply_mode = reply_mode;
        self
    }

    /// Line settings: even parity, or none in reply mode.
    pub fn line_settings(&self) -> LineSettings {
        let parity = if self.reply_mode {
            Parity::None
        } else {
            Parity::Even
        };
        LineSettings::new(self.baud_rate, parity)
    }
}

/// Lifecycle state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    /// Port closed.
    #[default]
    Disconnected,
    /// Opening the port.
    Connecting,
    /// Resetting the target into the bootloader.
    Activating,
    /// Commands may be issued.
    Ready,
    /// Releasing the target and closing the port.
    Disconnecting,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Activating => "activating",
            Self::Ready => "ready",
            Self::Disconnecting => "disconnecting",
        })
    }
}

/// Outcome of [`Bootloader::program`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgramSummary {
    /// WRITE commands issued.
    pub blocks: usize,
    /// Bytes written.
    pub bytes: usize,
    /// Entry point found in the image, if any.
    pub start_address: Option<u32>,
}

/// State of one connected device. Cleared by every target reset.
#[derive(Debug, Default)]
struct Session {
    reply_mode: bool,
    info: Option<BootloaderInfo>,
    capabilities: Capabilities,
    routines: RoutinesState,
}

impl Session {
    fn new(reply_mode: bool) -> Self {
        Self {
            reply_mode,
            ..Self::default()
        }
    }

    fn clear(&mut self) {
        *self = Self::new(self.reply_mode);
    }
}

type InterruptChecker = Arc<dyn Fn() -> bool + Send + Sync>;

/// STM8/STM32 ROM bootloader client.
///
/// Generic over the port type `P`. One engine drives one target; callers
/// serialize access themselves.
pub struct Bootloader<P: Port> {
    port: P,
    config: EngineConfig,
    state: EngineState,
    session: Session,
    device: Option<DeviceSelection>,
    loader: Box<dyn RoutineLoader>,
    routines_cache: Option<(String, Vec<u8>)>,
    interrupt: Option<InterruptChecker>,
}

impl<P: Port> Bootloader<P> {
    /// Create an engine around a closed port.
    pub fn new(port: P, config: EngineConfig) -> Self {
        let loader = DirRoutineLoader::new(&config.routines_dir);
        Self {
            port,
            config,
            state: EngineState::Disconnected,
            session: Session::default(),
            device: None,
            loader: Box::new(loader),
            routines_cache: None,
            interrupt: None,
        }
    }

    /// Replace the routines source.
    #[must_use]
    pub fn with_routine_loader<L: RoutineLoader + 'static>(mut self, loader: L) -> Self {
        self.loader = Box::new(loader);
        self.routines_cache = None;
        self
    }

    /// Register a checker polled between frame exchanges.
    ///
    /// When it returns `true` the running operation stops with
    /// [`Error::Interrupted`]. A frame and its acknowledgement are never split.
    #[must_use]
    pub fn with_interrupt_checker<F>(mut self, checker: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.interrupt = Some(Arc::new(checker));
        self
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Get a mutable reference to the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Consume the engine and return the underlying port.
    pub fn into_port(self) -> P {
        self.port
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Result of the last GET in this session.
    pub fn info(&self) -> Option<&BootloaderInfo> {
        self.session.info.as_ref()
    }

    /// Largest WRITE payload. 128 until GET identifies an STM32.
    pub fn write_block_size(&self) -> usize {
        self.session.capabilities.write_block_size
    }

    /// Largest READ payload.
    pub fn read_block_size(&self) -> usize {
        self.session.capabilities.read_block_size
    }

    /// Whether the session echoes received bytes.
    pub fn reply_mode(&self) -> bool {
        self.session.reply_mode
    }

    /// Upload state of the STM8 erase/write routines.
    pub fn routines_state(&self) -> RoutinesState {
        self.session.routines
    }

    /// Current device selection.
    pub fn device(&self) -> Option<&DeviceSelection> {
        self.device.as_ref()
    }

    // ----- lifecycle -----

    /// Open the port and start the bootloader.
    ///
    /// On failure the port is closed again and the engine is back to
    /// [`EngineState::Disconnected`].
    pub fn connect(&mut self, options: &ConnectOptions) -> Result<()> {
        if self.state != EngineState::Disconnected || self.port.is_open() {
            return Err(Error::State(format!("{} is already open", self.port.name())));
        }

        info!(
            "Connecting to {} at {} baud{}",
            self.port.name(),
            options.baud_rate,
            if options.reply_mode { " (reply mode)" } else { "" }
        );
        self.state = EngineState::Connecting;
        self.session = Session::new(options.reply_mode);

        match self.open_and_activate(options) {
            Ok(()) => {
                self.state = EngineState::Ready;
                info!("Bootloader ready");
                Ok(())
            },
            Err(e) => {
                warn!("Connection failed: {e}");
                if let Err(close_err) = self.port.close() {
                    debug!("Closing after failed connect: {close_err}");
                }
                self.session.clear();
                self.state = EngineState::Disconnected;
                Err(e)
            },
        }
    }

    fn open_and_activate(&mut self, options: &ConnectOptions) -> Result<()> {
        self.port.open(&options.line_settings())?;
        self.port
            .control(&Signals::new().reset(Level::High).boot0(Level::Low))?;
        self.state = EngineState::Activating;
        self.activate_bootloader()
    }

    /// BOOT0 high, reset pulse, BOOT0 low, then SYNC.
    fn activate_bootloader(&mut self) -> Result<()> {
        info!("Activating bootloader");
        self.port.control(&Signals::new().boot0(Level::High))?;
        self.reset_target()?;
        self.port.control(&Signals::new().boot0(Level::Low))?;
        self.check_interrupted()?;

        self.port.write_bytes(&[SYNC])?;
        self.expect_ack("synchronization")?;
        Ok(())
    }

    /// Pulse RESET and wait for the target to settle.
    ///
    /// Anything uploaded to RAM is lost, so the session is cleared.
    fn reset_target(&mut self) -> Result<()> {
        debug!("Resetting target");
        self.port.control(&Signals::new().reset(Level::Low))?;
        self.port.control(&Signals::new().reset(Level::High))?;
        self.session.clear();
        thread::sleep(self.config.reset_settle);
        Ok(())
    }

    /// Release the target into user code and close the port.
    ///
    /// Safe to call in any state; without an open port it only clears the
    /// session.
    pub fn disconnect(&mut self) -> Result<()> {
        if !self.port.is_open() {
            self.session.clear();
            self.state = EngineState::Disconnected;
            return Ok(());
        }

        info!("Disconnecting from {}", self.port.name());
        self.state = EngineState::Disconnecting;
        let released = self.release_target();
        let closed = self.port.close();
        self.session.clear();
        self.state = EngineState::Disconnected;
        released.and(closed)
    }

    fn release_target(&mut self) -> Result<()> {
        self.port.control(&Signals::new().boot0(Level::Low))?;
        self.reset_target()
    }

    // ----- device selection -----

    /// Select the STM8 device, which decides the erase/write routines.
    ///
    /// Devices without routines (STM8L, flash size "0") are ready for
    /// WRITE and ERASE right away. Choosing different routines than the ones
    /// in RAM forces a new upload.
    pub fn set_device(&mut self, selection: &DeviceSelection) -> Result<()> {
        let routines = selection.routines_file();
        match &routines {
            Some(file) => debug!("Device selected: {} KiB flash, routines {file}", selection.flash),
            None => debug!("Device selected: no erase/write routines needed"),
        }

        let changed = self
            .device
            .as_ref()
            .is_none_or(|current| current.routines_file() != routines);
        self.device = Some(selection.clone());

        self.session.routines = if routines.is_none() || !self.session.capabilities.needs_routines {
            RoutinesState::Loaded
        } else if changed {
            RoutinesState::NotLoaded
        } else {
            self.session.routines
        };
        Ok(())
    }

    // ----- commands -----

    /// GET: bootloader version and supported commands.
    ///
    /// Also resolves the family and with it the block sizes.
    pub fn get_commands(&mut self) -> Result<BootloaderInfo> {
        self.ensure_ready()?;
        let mut response = self.exchange(&command_frame(Command::Get), "GET")?;

        // Some STM8 bootloaders send every byte separately, the trailing
        // ACK included.
        let byte_wise = response.len() == 1;
        self.fill(&mut response, 3, "GET")?;
        let count = usize::from(response[1]);
        self.fill(&mut response, 3 + count + usize::from(byte_wise), "GET")?;
        // A block response carries the trailing ACK in the same read when the
        // bootloader sends it; nothing more is read for it here.
        if let Some(&trailer) = response.get(3 + count) {
            ack_status(Some(trailer), "GET end")?;
        }

        let commands = response[3..3 + count].to_vec();
        let family = Family::from_commands(&commands);
        let info = BootloaderInfo {
            bl_version: format_version(response[2]),
            commands,
            family,
        };

        self.session.capabilities = family.capabilities();
        if !self.routines_required() {
            self.session.routines = RoutinesState::Loaded;
        }
        self.session.info = Some(info.clone());

        info!(
            "Bootloader {} ({}), write block {} bytes",
            info.bl_version,
            info.family,
            self.session.capabilities.write_block_size
        );
        debug!("Supported commands: {:02X?}", info.commands);
        Ok(info)
    }

    /// GET ID: product ID as "0x" and four hex digits.
    pub fn get_id(&mut self) -> Result<String> {
        self.require(Command::GetId)?;
        let mut response = self.exchange(&command_frame(Command::GetId), "GID")?;
        self.fill(&mut response, 4, "GID")?;

        let id = format!("0x{:02x}{:02x}", response[2], response[3]);
        debug!("Product ID: {id}");
        Ok(id)
    }

    /// GET VERSION: bootloader version and read protection counters.
    pub fn get_version(&mut self) -> Result<VersionInfo> {
        self.require(Command::GetVersion)?;
        let mut response = self.exchange(&command_frame(Command::GetVersion), "GV")?;
        self.fill(&mut response, 4, "GV")?;

        Ok(VersionInfo {
            bl_version: format_version(response[1]),
            rp_enabled: response[2],
            rp_disabled: response[3],
        })
    }

    /// GO: start executing at `address`.
    pub fn go(&mut self, address: u32) -> Result<()> {
        self.ensure_ready()?;
        info!("Jumping to {address:#010x}");
        self.exchange(&command_frame(Command::Go), "GO")?;
        self.exchange(&address_frame(address), "GO address")?;
        Ok(())
    }

    /// READ MEMORY: `count` bytes at `address`, `count` in `1..=read_block_size`.
    pub fn read_block(&mut self, address: u32, count: usize) -> Result<Vec<u8>> {
        let limit = self.session.capabilities.read_block_size;
        let frame = count_frame(count).filter(|_| count <= limit).ok_or_else(|| {
            Error::InvalidArgument(format!("read length {count} is outside 1..={limit}"))
        })?;
        self.ensure_ready()?;

        trace!("Reading {count} bytes at {address:#010x}");
        self.exchange(&command_frame(Command::ReadMemory), "READ")?;
        self.exchange(&address_frame(address), "READ address")?;
        let mut response = self.exchange(&frame, "READ length")?;

        // In reply mode each data byte is its own echoed response.
        let mut data = response.split_off(1);
        self.fill(&mut data, count, "READ data")?;
        data.truncate(count);
        Ok(data)
    }

    /// Read `len` bytes at `address` in READ-sized pieces.
    pub fn read(&mut self, address: u32, len: usize) -> Result<Vec<u8>> {
        self.read_with_progress(address, len, |_, _| {})
    }

    /// Like [`read`](Self::read), calling `progress(done, len)` after each
    /// piece with the number of bytes read so far.
    pub fn read_with_progress<F>(&mut self, address: u32, len: usize, mut progress: F) -> Result<Vec<u8>>
    where
        F: FnMut(usize, usize),
    {
        let block_size = self.session.capabilities.read_block_size;
        let mut data = Vec::with_capacity(len);
        while data.len() < len {
            self.check_interrupted()?;
            let offset = offset_address(address, data.len())?;
            let count = block_size.min(len - data.len());
            data.extend(self.read_block(offset, count)?);
            progress(data.len(), len);
        }
        Ok(data)
    }

    /// WRITE MEMORY: one block of at most `write_block_size` bytes.
    ///
    /// Uploads the STM8 erase/write routines first when needed.
    pub fn write_block(&mut self, data: &[u8], address: u32) -> Result<()> {
        let limit = self.session.capabilities.write_block_size;
        if data.is_empty() || data.len() > limit {
            return Err(Error::InvalidArgument(format!(
                "write length {} is outside 1..={limit}",
                data.len()
            )));
        }
        self.require(Command::WriteMemory)?;
        if self.session.routines == RoutinesState::NotLoaded {
            self.load_routines()?;
        }

        let frame = data_frame(data).ok_or_else(|| {
            Error::InvalidArgument(format!("cannot frame {} bytes", data.len()))
        })?;
        trace!("Writing {} bytes at {address:#010x}", data.len());
        self.exchange(&command_frame(Command::WriteMemory), "WRITE")?;
        self.exchange(&address_frame(address), "WRITE address")?;
        self.exchange(&frame, "WRITE data")?;
        Ok(())
    }

    /// Write `data` at `address` in `write_block_size` chunks.
    ///
    /// `progress(index, total)` is called before each chunk. The first failing
    /// chunk stops the write; the chunks before it stay written.
    pub fn write<F>(&mut self, data: &[u8], address: u32, mut progress: F) -> Result<()>
    where
        F: FnMut(usize, usize),
    {
        let block_size = self.session.capabilities.write_block_size;
        let total = data.len().div_ceil(block_size);

        for (index, chunk) in data.chunks(block_size).enumerate() {
            self.check_interrupted()?;
            progress(index, total);
            let chunk_address = offset_address(address, index * block_size)?;
            self.write_block(chunk, chunk_address)
                .map_err(|source| Error::WriteFailed {
                    block: index,
                    total,
                    address: chunk_address,
                    source: Box::new(source),
                })?;
        }
        Ok(())
    }

    /// Program packed records.
    ///
    /// Data records are written block by block, `progress(index, total)`
    /// being called before each block. The last start address record is
    /// returned in the summary; jumping to it is left to the caller.
    pub fn program<F>(&mut self, records: &[MemoryRecord], mut progress: F) -> Result<ProgramSummary>
    where
        F: FnMut(usize, usize),
    {
        let block_size = self.session.capabilities.write_block_size;
        let total: usize = records
            .iter()
            .filter(|r| r.kind == RecordKind::Data)
            .map(|r| r.len().div_ceil(block_size))
            .sum();
        let mut summary = ProgramSummary::default();

        for record in records {
            if record.kind == RecordKind::StartAddress {
                debug!("Start address {:#010x}", record.address);
                summary.start_address = Some(record.address);
                continue;
            }
            for (i, chunk) in record.data.chunks(block_size).enumerate() {
                self.check_interrupted()?;
                let index = summary.blocks;
                progress(index, total);
                let address = offset_address(record.address, i * block_size)?;
                self.write_block(chunk, address)
                    .map_err(|source| Error::WriteFailed {
                        block: index,
                        total,
                        address,
                        source: Box::new(source),
                    })?;
                summary.blocks += 1;
                summary.bytes += chunk.len();
            }
        }

        info!(
            "Programmed {} bytes in {} blocks",
            summary.bytes, summary.blocks
        );
        Ok(summary)
    }

    /// Erase the whole flash with ERASE, or EXTENDED ERASE if that is all
    /// the bootloader offers.
    pub fn erase_all(&mut self) -> Result<()> {
        let info = self.require_info()?;
        let command = [Command::Erase, Command::ExtendedErase]
            .into_iter()
            .find(|c| info.supports(*c))
            .ok_or_else(|| {
                Error::Unsupported("bootloader offers neither ERASE nor EXTENDED ERASE".to_string())
            })?;
        let payload = command.mass_erase_payload().ok_or_else(|| {
            Error::Unsupported(format!("{command} has no mass erase payload"))
        })?;

        if self.session.routines == RoutinesState::NotLoaded {
            self.load_routines()?;
        }

        info!("Erasing flash ({})", command.name());
        self.exchange(&command_frame(command), command.name())?;
        self.exchange(payload, "ERASE payload")?;
        Ok(())
    }

    /// WRITE UNPROTECT. The target resets itself afterwards.
    pub fn write_unprotect(&mut self) -> Result<()> {
        self.require(Command::WriteUnprotect)?;
        self.exchange(&command_frame(Command::WriteUnprotect), "WRITE UNPROTECT")?;
        self.expect_ack("WRITE UNPROTECT completion")?;
        info!("Write protection disabled, target is resetting");
        Ok(())
    }

    /// READOUT UNPROTECT. Mass-erases the flash, then the target resets itself.
    pub fn readout_unprotect(&mut self) -> Result<()> {
        self.require(Command::ReadoutUnprotect)?;
        self.exchange(&command_frame(Command::ReadoutUnprotect), "READOUT UNPROTECT")?;
        self.expect_ack("READOUT UNPROTECT completion")?;
        info!("Readout protection disabled, target is resetting");
        Ok(())
    }

    // ----- internals -----

    /// Upload the erase/write routines to RAM.
    fn load_routines(&mut self) -> Result<()> {
        let name = self
            .device
            .as_ref()
            .and_then(DeviceSelection::routines_file)
            .ok_or_else(|| {
                Error::State("select the device flash size before writing to an STM8".to_string())
            })?;

        let blob = match &self.routines_cache {
            Some((cached, blob)) if *cached == name => blob.clone(),
            _ => {
                let blob = self.loader.load(&name)?;
                if blob.is_empty() {
                    return Err(Error::Config(format!("routines {name} are empty")));
                }
                self.routines_cache = Some((name.clone(), blob.clone()));
                blob
            },
        };

        info!("Loading erase/write routines {name} ({} bytes)", blob.len());
        self.session.routines = RoutinesState::Loading;
        match self.write(&blob, ROUTINES_ADDRESS, |_, _| {}) {
            Ok(()) => {
                self.session.routines = RoutinesState::Loaded;
                Ok(())
            },
            Err(e) => {
                self.session.routines = RoutinesState::NotLoaded;
                Err(e)
            },
        }
    }

    fn routines_required(&self) -> bool {
        self.session.capabilities.needs_routines
            && self
                .device
                .as_ref()
                .is_none_or(|device| device.flash.needs_routines())
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.state == EngineState::Ready {
            Ok(())
        } else {
            Err(Error::State(format!("bootloader is {}", self.state)))
        }
    }

    fn require_info(&self) -> Result<BootloaderInfo> {
        self.ensure_ready()?;
        self.session
            .info
            .clone()
            .ok_or_else(|| Error::State("execute GET first".to_string()))
    }

    fn require(&self, command: Command) -> Result<()> {
        if self.require_info()?.supports(command) {
            Ok(())
        } else {
            Err(Error::Unsupported(format!("{command} is not offered by this bootloader")))
        }
    }

    fn check_interrupted(&self) -> Result<()> {
        if self.interrupt.as_ref().is_some_and(|checker| checker()) {
            warn!("Interrupted");
            return Err(Error::Interrupted);
        }
        Ok(())
    }

    /// Send a frame and expect ACK.
    fn exchange(&mut self, frame: &[u8], step: &'static str) -> Result<Vec<u8>> {
        self.port.write_bytes(frame)?;
        self.expect_ack(step)
    }

    fn expect_ack(&mut self, step: &'static str) -> Result<Vec<u8>> {
        let response = self.read_response()?;
        ack_status(response.first().copied(), step)?;
        Ok(response)
    }

    /// Read more responses until `buf` holds at least `len` bytes.
    fn fill(&mut self, buf: &mut Vec<u8>, len: usize, step: &'static str) -> Result<()> {
        while buf.len() < len {
            let more = self.read_response()?;
            if more.is_empty() {
                return Err(Error::UnexpectedResponse { step, byte: None });
            }
            buf.extend(more);
        }
        Ok(())
    }

    /// Read one response, echoing its first byte in reply mode.
    fn read_response(&mut self) -> Result<Vec<u8>> {
        let response = self.port.read_response()?;
        if self.session.reply_mode {
            if let Some(&first) = response.first() {
                self.port.write_bytes(&[first])?;
            }
        }
        Ok(response)
    }
}

impl<P: Port + fmt::Debug> fmt::Debug for Bootloader<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bootloader")
            .field("port", &self.port)
            .field("state", &self.state)
            .field("session", &self.session)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

/// Map a response byte to success on ACK.
fn ack_status(byte: Option<u8>, step: &'static str) -> Result<()> {
    match byte {
        Some(ACK) => Ok(()),
        Some(NACK) => Err(Error::Nack { step }),
        byte => Err(Error::UnexpectedResponse { step, byte }),
    }
}

fn offset_address(base: u32, offset: usize) -> Result<u32> {
    u32::try_from(offset)
        .ok()
        .and_then(|offset| base.checked_add(offset))
        .ok_or_else(|| {
            Error::InvalidArgument(format!(
                "{offset} bytes past {base:#010x} is outside the 32-bit address space"
            ))
        })
}

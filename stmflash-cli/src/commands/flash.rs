//! Commands that talk to the target: flash, erase, read, go and unprotect.

use anyhow::{Context, Result};
use console::style;
use log::debug;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;
use stmflash::image::{self, data_count, data_len};
use stmflash::target::family::STM32_WRITE_BLOCK_SIZE;
use stmflash::{
    Bootloader, BootloaderInfo, Command, ConnectOptions, DeviceSelection, EngineConfig, Family,
    ImageFormat, MemoryRecord, NativePort, SerialConfig,
};

use super::firmware::resolve_firmware;
use super::{progress_bar, spinner};
use crate::config::Config;
use crate::{Cli, CliError, get_port, was_interrupted};

/// First-byte timeout while the bootloader erases. Mass erase of a large
/// STM32 can take well over the default timeout.
const ERASE_TIMEOUT: Duration = Duration::from_secs(60);

/// Bytes per line of the `read` hex dump.
const DUMP_WIDTH: usize = 16;

type Target = Bootloader<NativePort>;

/// Options of the `flash` command, config defaults applied.
#[derive(Debug, Clone)]
pub(crate) struct FlashOptions {
    /// Load address for raw binaries.
    pub(crate) address: Option<u32>,
    /// Mass erase before writing.
    pub(crate) erase: bool,
    /// Read back and compare.
    pub(crate) verify: bool,
    /// Jump to the application when done.
    pub(crate) go: bool,
    /// GO address when the image has no start address record.
    pub(crate) start_address: u32,
}

/// What was learned about the target right after connecting.
#[derive(Debug, Clone)]
pub(crate) struct Identity {
    pub(crate) info: BootloaderInfo,
    pub(crate) product_id: Option<String>,
}

fn ensure_not_interrupted() -> Result<()> {
    if was_interrupted() {
        Err(CliError::Cancelled("interrupted by user".to_string()).into())
    } else {
        Ok(())
    }
}

/// Connect, identify the target, run `body`, then always disconnect.
///
/// `need_device` makes a missing STM8 flash size a usage error; only WRITE
/// and ERASE need the erase/write routines.
pub(crate) fn with_target<T, F>(cli: &Cli, config: &mut Config, need_device: bool, body: F) -> Result<T>
where
    F: FnOnce(&mut Target, &Identity) -> Result<T>,
{
    let port_name = get_port(cli, config)?;
    let baud = cli.baud_rate(config);
    if !cli.quiet {
        eprintln!(
            "{} Using port {} at {} baud",
            style("🔌").cyan(),
            style(&port_name).green(),
            baud
        );
    }
    ensure_not_interrupted()?;

    let engine_config = EngineConfig {
        routines_dir: cli.routines_dir(config),
        ..EngineConfig::default()
    };
    let mut target = Bootloader::new(NativePort::new(SerialConfig::new(&port_name, baud)), engine_config)
        .with_interrupt_checker(was_interrupted);

    if !cli.quiet {
        eprintln!("{} Waiting for the bootloader...", style("⏳").yellow());
    }
    let options = ConnectOptions::new(baud).with_reply_mode(cli.reply_mode(config));
    target
        .connect(&options)
        .with_context(|| format!("failed to connect to the bootloader on {port_name}"))?;

    let result = identify(cli, config, &mut target, need_device).and_then(|identity| {
        if !cli.quiet {
            eprintln!(
                "{} Connected: {} bootloader v{}{}",
                style("✓").green(),
                identity.info.family,
                identity.info.bl_version,
                identity
                    .product_id
                    .as_ref()
                    .map(|id| format!(", product ID {id}"))
                    .unwrap_or_default()
            );
        }
        body(&mut target, &identity)
    });

    let closed = target.disconnect();
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e).context("failed to release the target"),
        (Err(e), closed) => {
            if let Err(close_err) = closed {
                debug!("Disconnect after failure: {close_err}");
            }
            Err(e)
        },
    }
}

fn identify(cli: &Cli, config: &Config, target: &mut Target, need_device: bool) -> Result<Identity> {
    let info = target.get_commands().context("GET failed")?;
    let mut product_id = None;

    match info.family {
        Family::Stm32 => {
            if info.supports(Command::GetId) {
                product_id = Some(target.get_id().context("GET ID failed")?);
            }
        },
        Family::Stm8 => match cli.flash_size(config) {
            Some(size) => {
                let selection = DeviceSelection::parse(&size, &info.bl_version)?;
                target.set_device(&selection)?;
            },
            None if need_device => {
                return Err(CliError::Usage(
                    "STM8 bootloader detected, pass --flash-size (0, 32, 128 or 256) \
                     to select the erase/write routines"
                        .to_string(),
                )
                .into());
            },
            None => {},
        },
    }

    Ok(Identity { info, product_id })
}

/// Run `op` with the long erase timeout, restoring the normal one after.
fn with_long_timeout<T>(
    target: &mut Target,
    op: impl FnOnce(&mut Target) -> stmflash::Result<T>,
) -> Result<T> {
    let normal = target.port().config().timeout;
    target.port_mut().set_timeout(ERASE_TIMEOUT)?;
    let result = op(target);
    target.port_mut().set_timeout(normal)?;
    Ok(result?)
}

fn erase(cli: &Cli, target: &mut Target) -> Result<()> {
    let pb = spinner(cli.quiet, "Erasing flash...".to_string());
    let result = with_long_timeout(target, Bootloader::erase_all).context("mass erase failed");
    pb.finish_and_clear();
    result?;
    if !cli.quiet {
        eprintln!("{} Flash erased", style("✓").green());
    }
    Ok(())
}

/// Lowest and highest (exclusive) address covered by data records.
fn data_span(records: &[MemoryRecord]) -> Option<(u32, u64)> {
    let data = records.iter().filter(|r| r.is_data());
    let low = data.clone().map(|r| r.address).min()?;
    let high = data
        .map(|r| u64::from(r.address) + r.len() as u64)
        .max()?;
    Some((low, high))
}

/// Flash command implementation.
pub(crate) fn cmd_flash(
    cli: &Cli,
    config: &mut Config,
    firmware: Option<&PathBuf>,
    options: &FlashOptions,
) -> Result<()> {
    let path = resolve_firmware(firmware, cli.non_interactive, cli.quiet)?;
    if !cli.quiet {
        eprintln!(
            "{} Loading firmware: {}",
            style("📦").cyan(),
            path.display()
        );
    }

    // Packed to the largest block size; re-packed once the family is known.
    let records = image::load_image(&path, options.address, STM32_WRITE_BLOCK_SIZE)
        .with_context(|| format!("failed to load firmware {}", path.display()))?;
    let Some((low, high)) = data_span(&records) else {
        anyhow::bail!("{} contains no data", path.display());
    };
    if !cli.quiet {
        eprintln!(
            "{} {} image: {} bytes in {} records, {:#010x}..{:#010x}",
            style("ℹ").blue(),
            ImageFormat::from_path(&path),
            data_len(&records),
            data_count(&records),
            low,
            high
        );
    }

    with_target(cli, config, true, |target, _| {
        if options.erase {
            erase(cli, target)?;
        }

        let records = image::pack(records, target.write_block_size())?;
        let pb = progress_bar(cli.quiet, 0);
        pb.set_message("Writing");
        let summary = target
            .program(&records, |block, total| {
                pb.set_length(total as u64);
                pb.set_position(block as u64);
            })
            .context("programming failed");
        let summary = match summary {
            Ok(summary) => {
                pb.set_position(summary.blocks as u64);
                pb.finish_with_message("Written");
                summary
            },
            Err(e) => {
                pb.abandon();
                return Err(e);
            },
        };
        if !cli.quiet {
            eprintln!(
                "{} Wrote {} bytes in {} blocks",
                style("✓").green(),
                summary.bytes,
                summary.blocks
            );
        }
        ensure_not_interrupted()?;

        if options.verify {
            verify(cli, target, &records)?;
        }

        if options.go {
            let address = summary.start_address.unwrap_or(options.start_address);
            target
                .go(address)
                .with_context(|| format!("GO {address:#010x} failed"))?;
            if !cli.quiet {
                eprintln!("{} Started at {address:#010x}", style("🚀").cyan());
            }
        }
        Ok(())
    })?;

    if !cli.quiet {
        eprintln!("\n{} Flashing completed", style("🎉").green().bold());
    }
    Ok(())
}

/// Read every data record back and compare.
fn verify(cli: &Cli, target: &mut Target, records: &[MemoryRecord]) -> Result<()> {
    let data: Vec<&MemoryRecord> = records.iter().filter(|r| r.is_data()).collect();
    let pb = progress_bar(cli.quiet, data.len());
    pb.set_message("Verifying");

    for record in data {
        let actual = target
            .read(record.address, record.len())
            .with_context(|| format!("read back at {:#010x} failed", record.address))?;
        if let Some(offset) = first_mismatch(&record.data, &actual) {
            pb.abandon();
            anyhow::bail!(
                "verify failed at {:#010x}: wrote {:#04x}, read {:#04x}",
                u64::from(record.address) + offset as u64,
                record.data[offset],
                actual.get(offset).copied().unwrap_or_default()
            );
        }
        pb.inc(1);
    }

    pb.finish_with_message("Verified");
    if !cli.quiet {
        eprintln!("{} Verify passed", style("✓").green());
    }
    Ok(())
}

/// Offset of the first byte where `expected` and `actual` differ.
fn first_mismatch(expected: &[u8], actual: &[u8]) -> Option<usize> {
    expected
        .iter()
        .zip(actual)
        .position(|(e, a)| e != a)
        .or_else(|| (actual.len() < expected.len()).then_some(actual.len()))
}

/// Erase command implementation.
pub(crate) fn cmd_erase(cli: &Cli, config: &mut Config, all: bool) -> Result<()> {
    if !all {
        if !cli.quiet {
            eprintln!(
                "{} Only mass erase is supported, use --all to confirm",
                style("⚠").yellow()
            );
        }
        return Err(CliError::Usage("refusing to erase without --all".to_string()).into());
    }

    with_target(cli, config, true, |target, _| erase(cli, target))?;

    if !cli.quiet {
        eprintln!("\n{} Erase completed", style("✓").green().bold());
    }
    Ok(())
}

/// Read command implementation: to a file, or a hex dump on stdout.
pub(crate) fn cmd_read(
    cli: &Cli,
    config: &mut Config,
    address: u32,
    length: usize,
    output: Option<&PathBuf>,
) -> Result<()> {
    if u64::from(address) + length as u64 > 1 << 32 {
        return Err(CliError::Usage(format!(
            "{length} bytes at {address:#010x} run past the end of the address space"
        ))
        .into());
    }

    let data = with_target(cli, config, false, |target, _| {
        let pb = progress_bar(cli.quiet, length);
        pb.set_message("Reading");
        let data = target
            .read_with_progress(address, length, |done, _| pb.set_position(done as u64))
            .with_context(|| format!("READ of {length} bytes at {address:#010x} failed"));
        pb.finish_and_clear();
        Ok(data?)
    })?;

    match output {
        Some(path) => {
            std::fs::write(path, &data)
                .with_context(|| format!("failed to write {}", path.display()))?;
            if !cli.quiet {
                eprintln!(
                    "{} Saved {} bytes to {}",
                    style("✓").green(),
                    data.len(),
                    path.display()
                );
            }
        },
        None => print!("{}", hex_dump(address, &data)),
    }
    Ok(())
}

/// Classic hex dump: address, 16 bytes, printable ASCII.
pub(crate) fn hex_dump(address: u32, data: &[u8]) -> String {
    let mut out = String::new();
    for (i, line) in data.chunks(DUMP_WIDTH).enumerate() {
        let at = u64::from(address) + (i * DUMP_WIDTH) as u64;
        let _ = write!(out, "{at:08x}:");
        for byte in line {
            let _ = write!(out, " {byte:02x}");
        }
        for _ in line.len()..DUMP_WIDTH {
            out.push_str("   ");
        }
        out.push_str("  ");
        out.extend(line.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                char::from(b)
            } else {
                '.'
            }
        }));
        out.push('\n');
    }
    out
}

/// Go command implementation.
pub(crate) fn cmd_go(cli: &Cli, config: &mut Config, address: u32) -> Result<()> {
    with_target(cli, config, false, |target, _| {
        target
            .go(address)
            .with_context(|| format!("GO {address:#010x} failed"))?;
        Ok(())
    })?;

    if !cli.quiet {
        eprintln!("{} Started at {address:#010x}", style("🚀").cyan());
    }
    Ok(())
}

/// Unprotect command implementation.
pub(crate) fn cmd_unprotect(cli: &Cli, config: &mut Config, write: bool, read: bool) -> Result<()> {
    with_target(cli, config, false, |target, _| {
        if write {
            target
                .write_unprotect()
                .context("WRITE UNPROTECT failed")?;
            if !cli.quiet {
                eprintln!("{} Write protection removed", style("✓").green());
            }
        }
        if read {
            let pb = spinner(cli.quiet, "Removing readout protection...".to_string());
            let result = with_long_timeout(target, Bootloader::readout_unprotect)
                .context("READOUT UNPROTECT failed");
            pb.finish_and_clear();
            result?;
            if !cli.quiet {
                eprintln!(
                    "{} Readout protection removed, flash was erased",
                    style("✓").green()
                );
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_dump_full_and_partial_lines() {
        let data: Vec<u8> = (0x30..0x30 + 20).collect();
        let dump = hex_dump(0x0800_0000, &data);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "08000000: 30 31 32 33 34 35 36 37 38 39 3a 3b 3c 3d 3e 3f  0123456789:;<=>?"
        );
        assert!(lines[1].starts_with("08000010: 40 41 42 43 "));
        assert!(lines[1].ends_with("  @ABC"));
        assert_eq!(lines[0].find("  0"), lines[1].find("  @"));
    }

    #[test]
    fn test_hex_dump_non_printable() {
        let dump = hex_dump(0xA0, &[0x00, 0x41, 0xFF, 0x0A]);
        assert!(dump.starts_with("000000a0: 00 41 ff 0a"));
        assert!(dump.trim_end().ends_with(".A.."));
    }

    #[test]
    fn test_hex_dump_empty() {
        assert!(hex_dump(0, &[]).is_empty());
    }

    #[test]
    fn test_first_mismatch() {
        assert_eq!(first_mismatch(&[1, 2, 3], &[1, 2, 3]), None);
        assert_eq!(first_mismatch(&[1, 2, 3], &[1, 9, 3]), Some(1));
        assert_eq!(first_mismatch(&[1, 2, 3], &[1, 2]), Some(2));
    }

    #[test]
    fn test_data_span_ignores_start_address() {
        let records = vec![
            MemoryRecord::data(0x0800_0100, vec![0; 16]),
            MemoryRecord::data(0x0800_0000, vec![0; 4]),
            MemoryRecord::start_address(0x0800_0199),
        ];
        assert_eq!(data_span(&records), Some((0x0800_0000, 0x0800_0110)));
        assert_eq!(data_span(&[MemoryRecord::start_address(0)]), None);
    }
}

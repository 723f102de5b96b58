//! Bootloader info, firmware inspection and port listing.

use {
    anyhow::{Context, Result},
    console::style,
    serde_json::{Value, json},
    std::path::{Path, PathBuf},
    stmflash::{
        Command, DetectedPort, Family, ImageFormat, MemoryRecord, Port, VersionInfo,
        auto_detect_port, detect_ports,
        image::{self, data_count, data_len},
    },
};

use super::flash::{Identity, with_target};
use crate::{Cli, config::Config};

/// Everything `info` reports about a connected target.
#[derive(Debug)]
struct TargetReport {
    port: String,
    identity: Identity,
    write_block_size: usize,
    read_block_size: usize,
    version: Option<VersionInfo>,
}

/// Display name of an opcode, "0xNN" for opcodes this tool does not know.
fn command_name(opcode: u8) -> String {
    Command::from_opcode(opcode).map_or_else(|| format!("{opcode:#04x}"), |c| c.name().to_string())
}

/// Info command implementation.
pub(crate) fn cmd_info(cli: &Cli, config: &mut Config, json: bool) -> Result<()> {
    let report = with_target(cli, config, false, |target, identity| {
        let version = if identity.info.supports(Command::GetVersion) {
            Some(target.get_version().context("GET VERSION failed")?)
        } else {
            None
        };
        Ok(TargetReport {
            port: target.port().name().to_string(),
            identity: identity.clone(),
            write_block_size: target.write_block_size(),
            read_block_size: target.read_block_size(),
            version,
        })
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report_json(&report))?);
        return Ok(());
    }

    let info = &report.identity.info;
    eprintln!("\n{}", style("Bootloader Information").bold().underlined());
    eprintln!("  Port:             {}", style(&report.port).cyan());
    eprintln!("  Family:           {}", style(info.family).green().bold());
    eprintln!("  Version:          {}", info.bl_version);
    if let Some(id) = &report.identity.product_id {
        eprintln!("  Product ID:       {id}");
    }
    eprintln!("  Write block:      {} bytes", report.write_block_size);
    eprintln!("  Read block:       {} bytes", report.read_block_size);
    if let Some(version) = &report.version {
        eprintln!(
            "  Read protection:  enabled {} times, disabled {} times",
            version.rp_enabled, version.rp_disabled
        );
    }
    if info.family == Family::Stm8 && cli.flash_size(config).is_none() {
        eprintln!(
            "  {} pass --flash-size to flash or erase this target",
            style("⚠").yellow()
        );
    }

    eprintln!("\n{}", style("Commands").bold().underlined());
    for opcode in &info.commands {
        eprintln!(
            "  {} {:#04x}  {}",
            style("•").green(),
            opcode,
            command_name(*opcode)
        );
    }

    Ok(())
}

fn report_json(report: &TargetReport) -> Value {
    let info = &report.identity.info;
    let commands: Vec<Value> = info
        .commands
        .iter()
        .map(|&opcode| {
            json!({
                "opcode": format!("0x{opcode:02X}"),
                "name": command_name(opcode),
            })
        })
        .collect();

    json!({
        "ok": true,
        "data": {
            "port": report.port,
            "family": info.family,
            "bootloader_version": info.bl_version,
            "product_id": report.identity.product_id,
            "write_block_size": report.write_block_size,
            "read_block_size": report.read_block_size,
            "commands": commands,
            "version": report.version,
        }
    })
}

/// Inspect command implementation: no target involved.
pub(crate) fn cmd_inspect(
    firmware: &PathBuf,
    address: Option<u32>,
    block_size: usize,
    json: bool,
) -> Result<()> {
    let records = image::load_image(firmware, address, block_size)
        .with_context(|| format!("failed to load firmware {}", firmware.display()))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&inspect_json(firmware, &records))?
        );
        return Ok(());
    }

    eprintln!("\n{}", style("Firmware Information").bold().underlined());
    eprintln!("  File:           {}", firmware.display());
    eprintln!("  Format:         {}", ImageFormat::from_path(firmware));
    eprintln!("  Data bytes:     {}", data_len(&records));
    eprintln!("  Blocks:         {} (max {block_size} bytes)", data_count(&records));
    match start_address(&records) {
        Some(entry) => eprintln!("  Start address:  {entry:#010x}"),
        None => eprintln!("  Start address:  {}", style("none").dim()),
    }

    eprintln!("\n{}", style("Blocks").bold().underlined());
    for record in records.iter().filter(|r| r.is_data()) {
        eprintln!(
            "  {} {:#010x}  {} bytes",
            style("•").green(),
            record.address,
            record.len()
        );
    }

    Ok(())
}

/// Last start address record; it is the one a flash run jumps to.
fn start_address(records: &[MemoryRecord]) -> Option<u32> {
    records
        .iter()
        .rev()
        .find(|r| !r.is_data())
        .map(|r| r.address)
}

fn inspect_json(firmware: &Path, records: &[MemoryRecord]) -> Value {
    let blocks: Vec<Value> = records
        .iter()
        .filter(|r| r.is_data())
        .map(|r| {
            json!({
                "address": format!("0x{:08X}", r.address),
                "length": r.len(),
            })
        })
        .collect();

    json!({
        "ok": true,
        "data": {
            "file": firmware.display().to_string(),
            "format": ImageFormat::from_path(firmware).name(),
            "bytes": data_len(records),
            "block_count": data_count(records),
            "start_address": start_address(records).map(|a| format!("0x{a:08X}")),
            "blocks": blocks,
        }
    })
}

fn port_json(port: &DetectedPort) -> Value {
    json!({
        "name": port.name,
        "device": port.device.name(),
        "known": port.device.is_known(),
        "control_lines": port.device.has_control_lines(),
        "vid": port.vid,
        "pid": port.pid,
        "manufacturer": port.manufacturer,
        "product": port.product,
        "serial": port.serial,
    })
}

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let detected = detect_ports();

    if json {
        let ports: Vec<Value> = detected.iter().map(port_json).collect();
        let output = json!({
            "ok": true,
            "data": {
                "ports": ports,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    eprintln!("{}", style("Available Serial Ports").bold().underlined());

    if detected.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return Ok(());
    }

    for port in &detected {
        let device_type = if port.device.is_known() {
            format!(" [{}]", style(port.device.name()).yellow())
        } else {
            String::new()
        };
        let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            format!(" ({vid:04X}:{pid:04X})")
        } else {
            String::new()
        };
        let product = port
            .product
            .as_deref()
            .map(|p| format!(" - {}", style(p).dim()))
            .unwrap_or_default();

        eprintln!(
            "  {} {}{}{}{}",
            style("•").green(),
            style(&port.name).cyan(),
            device_type,
            vid_pid,
            product
        );
    }

    if let Ok(auto_port) = auto_detect_port() {
        eprintln!(
            "\n{} Auto-detected: {}",
            style("→").green().bold(),
            style(&auto_port.name).cyan().bold()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stmflash::{BootloaderInfo, DeviceKind};

    fn stm32_report() -> TargetReport {
        TargetReport {
            port: "/dev/ttyUSB0".to_string(),
            identity: Identity {
                info: BootloaderInfo {
                    bl_version: "3.1".to_string(),
                    commands: vec![0x00, 0x01, 0x02, 0x11, 0x44, 0x99],
                    family: Family::Stm32,
                },
                product_id: Some("0x0413".to_string()),
            },
            write_block_size: 256,
            read_block_size: 256,
            version: Some(VersionInfo {
                bl_version: "3.1".to_string(),
                rp_enabled: 0,
                rp_disabled: 2,
            }),
        }
    }

    #[test]
    fn test_command_name() {
        assert_eq!(command_name(0x00), "GET");
        assert_eq!(command_name(0x99), "0x99");
    }

    #[test]
    fn test_report_json() {
        let value = report_json(&stm32_report());
        assert_eq!(value["ok"], true);
        let data = &value["data"];
        assert_eq!(data["family"], "Stm32");
        assert_eq!(data["bootloader_version"], "3.1");
        assert_eq!(data["product_id"], "0x0413");
        assert_eq!(data["write_block_size"], 256);
        assert_eq!(data["commands"][2]["opcode"], "0x02");
        assert_eq!(data["commands"][0]["name"], "GET");
        assert_eq!(data["commands"][5]["name"], "0x99");
        assert_eq!(data["version"]["rp_disabled"], 2);
    }

    #[test]
    fn test_report_json_without_optional_fields() {
        let mut report = stm32_report();
        report.identity.product_id = None;
        report.version = None;
        let value = report_json(&report);
        assert!(value["data"]["product_id"].is_null());
        assert!(value["data"]["version"].is_null());
    }

    #[test]
    fn test_inspect_json() {
        let records = vec![
            MemoryRecord::data(0x0800_0000, vec![0xAA; 256]),
            MemoryRecord::data(0x0800_0100, vec![0xBB; 10]),
            MemoryRecord::start_address(0x0800_0199),
        ];
        let value = inspect_json(Path::new("app.s19"), &records);
        let data = &value["data"];
        assert_eq!(data["format"], "S-record");
        assert_eq!(data["bytes"], 266);
        assert_eq!(data["block_count"], 2);
        assert_eq!(data["start_address"], "0x08000199");
        assert_eq!(data["blocks"][1]["address"], "0x08000100");
        assert_eq!(data["blocks"][1]["length"], 10);
    }

    #[test]
    fn test_start_address_absent() {
        let records = vec![MemoryRecord::data(0, vec![1, 2, 3])];
        assert_eq!(start_address(&records), None);
        assert!(inspect_json(Path::new("a.hex"), &records)["data"]["start_address"].is_null());
    }

    #[test]
    fn test_port_json() {
        let port = DetectedPort {
            vid: Some(0x1A86),
            pid: Some(0x7523),
            device: DeviceKind::Ch340,
            ..DetectedPort::plain("/dev/ttyUSB0")
        };
        let value = port_json(&port);
        assert_eq!(value["name"], "/dev/ttyUSB0");
        assert_eq!(value["device"], "CH340/CH341");
        assert_eq!(value["known"], true);
        assert_eq!(value["control_lines"], true);
        assert_eq!(value["vid"], 0x1A86);

        let plain = port_json(&DetectedPort::plain("/dev/ttyS0"));
        assert_eq!(plain["known"], false);
        assert!(plain["vid"].is_null());
    }
}

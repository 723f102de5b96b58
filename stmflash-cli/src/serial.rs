//! Serial port selection.
//!
//! An explicit `--port` or the configured port is used as is. Otherwise the
//! detected ports are narrowed to recognised USB-UART adapters (built-in
//! list plus the ones remembered in the config) and the user picks one, or
//! the only candidate is taken directly.

use {
    crate::{CliError, config::Config},
    anyhow::Result,
    console::style,
    dialoguer::{Confirm, Error as DialoguerError, Select, theme::ColorfulTheme},
    log::{debug, error, info, warn},
    std::io::IsTerminal,
    stmflash::{DetectedPort, detect_ports, device::select_best_port},
};

/// How the port should be chosen.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Port given on the command line.
    pub port: Option<String>,
    /// Offer every port, not only recognised adapters.
    pub list_all_ports: bool,
    /// Never prompt.
    pub non_interactive: bool,
    /// Ask even when a single recognised adapter is found.
    pub confirm_port: bool,
}

/// Port chosen for the session.
#[derive(Debug)]
pub struct SelectedPort {
    pub port: DetectedPort,
    /// Recognised adapter, built-in or remembered.
    pub is_known: bool,
}

impl SelectedPort {
    fn new(port: DetectedPort, config: &Config) -> Self {
        let is_known = is_known_device(&port, config);
        Self { port, is_known }
    }
}

fn usage_err(message: &str) -> anyhow::Error {
    CliError::Usage(message.to_string()).into()
}

fn cancelled() -> anyhow::Error {
    CliError::Cancelled("port selection cancelled".to_string()).into()
}

/// Recognised adapters, built-in or remembered.
fn is_known_device(port: &DetectedPort, config: &Config) -> bool {
    port.device.is_known()
        || matches!((port.vid, port.pid), (Some(vid), Some(pid)) if config.serial.knows_adapter(vid, pid))
}

/// Ports worth offering, best first.
///
/// Recognised adapters only, unless there are none or `all` is set.
fn candidates(ports: Vec<DetectedPort>, config: &Config, all: bool) -> Vec<DetectedPort> {
    let (mut known, unknown): (Vec<_>, Vec<_>) =
        ports.into_iter().partition(|p| is_known_device(p, config));
    known.sort_by_key(|p| !p.device.has_control_lines());

    if all || known.is_empty() {
        known.extend(unknown);
    }
    known
}

/// The only candidate, or a usage error naming what went wrong.
fn single_candidate(mut ports: Vec<DetectedPort>) -> Result<DetectedPort> {
    match ports.len() {
        0 => Err(usage_err("no serial port available")),
        1 => Ok(ports.remove(0)),
        _ => Err(usage_err(
            "multiple serial ports found, select one with --port",
        )),
    }
}

/// Select the serial port for this run.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<SelectedPort> {
    if let Some(name) = &options.port {
        return Ok(find_port_by_name(name));
    }
    if let Some(name) = &config.serial.port {
        debug!("Using port from config: {name}");
        return Ok(find_port_by_name(name));
    }

    let detected = detect_ports();
    if detected.is_empty() {
        return Err(usage_err("no serial ports found"));
    }
    let ports = candidates(detected, config, options.list_all_ports);

    if options.non_interactive {
        return Ok(SelectedPort::new(single_candidate(ports)?, config));
    }

    if ports.len() > 1 {
        ensure_interactive_terminal()?;
        return select_port_interactive(ports, config);
    }

    let selected = SelectedPort::new(single_candidate(ports)?, config);
    if selected.is_known && !options.confirm_port {
        let device = selected.port.device;
        info!("Auto-selected port: {} [{}]", selected.port.name, device.name());
        if device.is_known() && !device.has_control_lines() {
            warn!(
                "{} cannot drive RESET/BOOT0, start the bootloader by hand",
                device.name()
            );
        }
        return Ok(selected);
    }

    ensure_interactive_terminal()?;
    let product = selected
        .port
        .product
        .as_ref()
        .map(|p| format!(" - {p}"))
        .unwrap_or_default();
    if confirm(&format!("Use {}{product}?", selected.port.name), true)? {
        Ok(selected)
    } else {
        Err(cancelled())
    }
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(usage_err(
            "interactive port selection needs a terminal, use --port",
        ))
    }
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    let DialoguerError::IO(io_err) = err;
    if io_err.kind() == std::io::ErrorKind::Interrupted {
        cancelled()
    } else {
        usage_err("port selection prompt failed")
    }
}

/// Yes/no prompt; Esc counts as "no".
fn confirm(prompt: &str, default: bool) -> Result<bool> {
    Ok(Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(default)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false))
}

/// Look the name up among detected ports to get its USB details.
fn find_port_by_name(name: &str) -> SelectedPort {
    let ports = detect_ports();
    let found = ports
        .iter()
        .find(|p| p.name == name)
        .or_else(|| ports.iter().find(|p| p.name.eq_ignore_ascii_case(name)));

    match found {
        Some(port) => SelectedPort {
            port: port.clone(),
            is_known: port.device.is_known(),
        },
        // Not enumerated (pty, socat link), trust the user.
        None => SelectedPort {
            port: DetectedPort::plain(name),
            is_known: false,
        },
    }
}

/// One line of the selection list.
fn port_label(port: &DetectedPort, config: &Config) -> String {
    let name = if is_known_device(port, config) {
        style(&port.name).bold().to_string()
    } else {
        port.name.clone()
    };

    let adapter = match (port.device.is_known(), port.vid, port.pid) {
        (true, _, _) => format!(" [{}]", style(port.device.name()).yellow()),
        (false, Some(vid), Some(pid)) => format!(" ({vid:04X}:{pid:04X})"),
        _ => String::new(),
    };
    let no_lines = if port.device.is_known() && !port.device.has_control_lines() {
        style(" no RESET/BOOT0").red().to_string()
    } else {
        String::new()
    };
    let product = port
        .product
        .as_ref()
        .map(|p| format!(" - {}", style(p).dim()))
        .unwrap_or_default();

    format!("{name}{adapter}{no_lines}{product}")
}

fn select_port_interactive(ports: Vec<DetectedPort>, config: &Config) -> Result<SelectedPort> {
    eprintln!(
        "{} Detected {} serial ports",
        style("ℹ").blue(),
        ports.len()
    );

    let default = select_best_port(&ports)
        .and_then(|best| ports.iter().position(|p| p.name == best.name))
        .unwrap_or(0);

    let width = usize::from(console::Term::stderr().size().1).saturating_sub(4);
    let labels: Vec<String> = ports
        .iter()
        .map(|port| console::truncate_str(&port_label(port, config), width, "…").into_owned())
        .collect();

    let index = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select the port wired to the target")
        .items(&labels)
        .default(default)
        .interact_opt()
        .map_err(map_prompt_error)?
        .ok_or_else(cancelled)?;

    let port = ports
        .into_iter()
        .nth(index)
        .ok_or_else(|| anyhow::anyhow!("invalid port index: {index}"))?;
    Ok(SelectedPort::new(port, config))
}

/// Offer to remember an unrecognised adapter.
pub fn ask_remember_port(port: &DetectedPort, config: &mut Config) -> Result<()> {
    let (Some(vid), Some(pid)) = (port.vid, port.pid) else {
        return Ok(());
    };
    if config.serial.knows_adapter(vid, pid) {
        return Ok(());
    }

    if confirm(
        &format!("Remember adapter {vid:04X}:{pid:04X} for auto-detection?"),
        false,
    )? {
        if let Err(e) = config.remember_adapter(vid, pid) {
            error!("Failed to save adapter: {e:#}");
        }
    }
    Ok(())
}

//! stmflash CLI - Command-line tool for flashing STM8/STM32 chips.
//!
//! ## Features
//!
//! - Flash S-record, Intel HEX and raw binary images
//! - Mass erase, read back, jump to an address
//! - Remove write/readout protection
//! - Inspect firmware files offline
//! - Interactive serial port selection
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{ArgGroup, Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::{debug, warn};
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use stmflash::ErrorKind;
use stmflash::target::DEFAULT_ROUTINES_DIR;

mod commands;
mod config;
mod serial;

use config::Config;
use serial::{SerialOptions, ask_remember_port, select_serial_port};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Default baud rate.
const DEFAULT_BAUD: u32 = 115200;

/// GO address used when neither the image nor the user gives one.
const DEFAULT_START_ADDRESS: u32 = 0x0800_0000;

/// Check if emoji/animations should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether the user pressed Ctrl-C.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Failures that map to dedicated exit codes.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Invalid invocation or missing setup (exit code 2).
    #[error("{0}")]
    Usage(String),
    /// Cancelled by the user (exit code 130).
    #[error("{0}")]
    Cancelled(String),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => 2,
            Self::Cancelled(_) => 130,
        }
    }
}

/// stmflash - Flash STM8/STM32 chips through the UART ROM bootloader.
///
/// Environment variables:
///   STMFLASH_PORT              - Default serial port
///   STMFLASH_BAUD              - Default baud rate (default: 115200)
///   STMFLASH_REPLY_MODE        - Echo received bytes (STM8 single-wire UART)
///   STMFLASH_FLASH_SIZE        - STM8 flash size in KiB (0, 32, 128, 256)
///   STMFLASH_ROUTINES_DIR      - Directory of STM8 erase/write routines
///   STMFLASH_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "stmflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "STMFLASH_PORT")]
    pub(crate) port: Option<String>,

    /// Baud rate [default: 115200].
    #[arg(short, long, global = true, env = "STMFLASH_BAUD")]
    pub(crate) baud: Option<u32>,

    /// Reply mode: echo every received byte back to the target.
    #[arg(long, global = true, env = "STMFLASH_REPLY_MODE")]
    pub(crate) reply_mode: bool,

    /// STM8 flash size in KiB (0, 32, 128 or 256), selects the erase/write routines.
    #[arg(long, global = true, env = "STMFLASH_FLASH_SIZE", value_name = "KB")]
    pub(crate) flash_size: Option<String>,

    /// Directory holding the STM8 erase/write routines.
    #[arg(long, global = true, env = "STMFLASH_ROUTINES_DIR", value_name = "DIR")]
    pub(crate) routines_dir: Option<PathBuf>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "STMFLASH_NON_INTERACTIVE")]
    pub(crate) non_interactive: bool,

    /// Confirm port selection even for auto-detected ports.
    #[arg(long, global = true)]
    pub(crate) confirm_port: bool,

    /// List all available ports (including unknown types).
    #[arg(long, global = true)]
    pub(crate) list_all_ports: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub(crate) config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

impl Cli {
    /// Baud rate from the command line, then the config file.
    pub(crate) fn baud_rate(&self, config: &Config) -> u32 {
        self.baud
            .or(config.serial.baud)
            .unwrap_or(DEFAULT_BAUD)
    }

    pub(crate) fn reply_mode(&self, config: &Config) -> bool {
        self.reply_mode || config.serial.reply_mode
    }

    pub(crate) fn flash_size(&self, config: &Config) -> Option<String> {
        self.flash_size
            .clone()
            .or_else(|| config.target.flash_size.clone())
    }

    pub(crate) fn routines_dir(&self, config: &Config) -> PathBuf {
        self.routines_dir
            .clone()
            .or_else(|| config.target.routines_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ROUTINES_DIR))
    }
}

/// Available commands.
#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Flash a firmware image (S-record, Intel HEX or raw binary).
    Flash {
        /// Firmware file (searched in the current directory if omitted).
        firmware: Option<PathBuf>,

        /// Load address for raw binary images.
        #[arg(short, long, value_parser = parse_hex_u32)]
        address: Option<u32>,

        /// Mass erase before writing.
        #[arg(long)]
        erase: bool,

        /// Read the written blocks back and compare.
        #[arg(long)]
        verify: bool,

        /// Jump to the application after flashing.
        #[arg(long)]
        go: bool,

        /// GO address when the image has no entry point [default: 0x08000000].
        #[arg(long, value_parser = parse_hex_u32)]
        start_address: Option<u32>,
    },

    /// Erase flash memory.
    Erase {
        /// Erase entire flash (required confirmation).
        #[arg(long)]
        all: bool,
    },

    /// Connect and show bootloader information.
    Info {
        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Read target memory.
    Read {
        /// Start address (hex).
        #[arg(value_parser = parse_hex_u32)]
        address: u32,

        /// Number of bytes (decimal or 0x-prefixed hex).
        #[arg(value_parser = parse_length)]
        length: usize,

        /// Write the bytes to this file instead of a hex dump on stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Start executing at an address.
    Go {
        /// Jump address (hex) [default: configured start address or 0x08000000].
        #[arg(value_parser = parse_hex_u32)]
        address: Option<u32>,
    },

    /// Remove write or readout protection.
    #[command(group(ArgGroup::new("protection").required(true).args(["write", "read"])))]
    Unprotect {
        /// Remove write protection.
        #[arg(long)]
        write: bool,

        /// Remove readout protection (mass-erases the flash).
        #[arg(long)]
        read: bool,
    },

    /// Show the contents of a firmware file without a target.
    Inspect {
        /// Firmware file.
        firmware: PathBuf,

        /// Load address for raw binary images.
        #[arg(short, long, value_parser = parse_hex_u32)]
        address: Option<u32>,

        /// Block size to pack the image into.
        #[arg(long, default_value = "256")]
        block_size: usize,

        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions (auto-detected if not specified with --install).
        #[arg(value_enum)]
        shell: Option<Shell>,

        /// Automatically install completions to your shell configuration.
        #[arg(long)]
        install: bool,
    },
}

/// Parse hexadecimal address (supports 0x prefix and underscores).
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    // Support underscore separators like 0x0800_0000
    let s: String = s.chars().filter(|c| *c != '_').collect();
    u32::from_str_radix(&s, 16).map_err(|e| format!("Invalid hex address: {e}"))
}

/// Parse a byte count, decimal or 0x-prefixed hex.
fn parse_length(s: &str) -> Result<usize, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => s.parse(),
    };
    match parsed {
        Ok(0) => Err("Length must be non-zero".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("Invalid length: {e}")),
    }
}

fn main() {
    let code = match run() {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            exit_code(&err)
        },
    };
    std::process::exit(code);
}

/// Exit code for a failed run: 2 usage, 130 cancelled, 1 otherwise.
fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(cli_err) = cause.downcast_ref::<CliError>() {
            return cli_err.exit_code();
        }
        if let Some(lib_err) = cause.downcast_ref::<stmflash::Error>() {
            if lib_err.kind() == ErrorKind::Interrupted {
                return 130;
            }
        }
    }
    1
}

fn run() -> Result<()> {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "stmflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    // The engine polls the flag between frames; a frame is never cut.
    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)) {
        warn!("Could not install Ctrl-C handler: {e}");
    }

    // Load configuration
    let mut config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Flash {
            firmware,
            address,
            erase,
            verify,
            go,
            start_address,
        } => {
            let options = commands::flash::FlashOptions {
                address: *address,
                erase: *erase,
                verify: *verify,
                go: *go || config.target.go,
                start_address: start_address
                    .or(config.target.start_address)
                    .unwrap_or(DEFAULT_START_ADDRESS),
            };
            commands::flash::cmd_flash(&cli, &mut config, firmware.as_ref(), &options)?;
        },
        Commands::Erase { all } => {
            commands::flash::cmd_erase(&cli, &mut config, *all)?;
        },
        Commands::Info { json } => {
            commands::info::cmd_info(&cli, &mut config, *json)?;
        },
        Commands::Read {
            address,
            length,
            output,
        } => {
            commands::flash::cmd_read(&cli, &mut config, *address, *length, output.as_ref())?;
        },
        Commands::Go { address } => {
            let address = address
                .or(config.target.start_address)
                .unwrap_or(DEFAULT_START_ADDRESS);
            commands::flash::cmd_go(&cli, &mut config, address)?;
        },
        Commands::Unprotect { write, read } => {
            commands::flash::cmd_unprotect(&cli, &mut config, *write, *read)?;
        },
        Commands::Inspect {
            firmware,
            address,
            block_size,
            json,
        } => {
            commands::info::cmd_inspect(firmware, *address, *block_size, *json)?;
        },
        Commands::ListPorts { json } => {
            commands::info::cmd_list_ports(*json)?;
        },
        Commands::Completions { shell, install } => {
            if *install {
                commands::completions::cmd_completions_install(*shell)?;
            } else {
                let shell = shell.ok_or_else(|| {
                    CliError::Usage(
                        "specify a shell type, e.g.: stmflash completions bash \
                         (or use --install to auto-install)"
                            .to_string(),
                    )
                })?;
                commands::completions::cmd_completions(shell);
            }
        },
    }

    Ok(())
}

/// Get serial port from CLI args or interactive selection.
pub(crate) fn get_port(cli: &Cli, config: &mut Config) -> Result<String> {
    let options = SerialOptions {
        port: cli.port.clone(),
        list_all_ports: cli.list_all_ports,
        non_interactive: cli.non_interactive,
        confirm_port: cli.confirm_port,
    };

    let selected = select_serial_port(&options, config)?;

    // Offer to remember an unrecognised adapter the user picked by hand.
    let picked = cli.port.is_none() && config.serial.port.is_none();
    if picked && !selected.is_known && !cli.non_interactive {
        ask_remember_port(&selected.port, config)?;
    }

    Ok(selected.port.name)
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use clap::CommandFactory;

    // ---- clap validation ----

    #[test]
    fn test_cli_command_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_flash() {
        let cli = Cli::try_parse_from([
            "stmflash",
            "--port",
            "/dev/ttyUSB0",
            "--baud",
            "57600",
            "flash",
            "firmware.s19",
        ])
        .unwrap();
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(cli.baud, Some(57600));
        if let Commands::Flash { firmware, go, .. } = cli.command {
            assert_eq!(firmware, Some(PathBuf::from("firmware.s19")));
            assert!(!go);
        } else {
            panic!("Expected Flash command");
        }
    }

    #[test]
    fn test_cli_parse_flash_with_all_options() {
        let cli = Cli::try_parse_from([
            "stmflash",
            "flash",
            "app.bin",
            "--address",
            "0x0800_4000",
            "--erase",
            "--verify",
            "--go",
            "--start-address",
            "08004000",
        ])
        .unwrap();
        if let Commands::Flash {
            firmware,
            address,
            erase,
            verify,
            go,
            start_address,
        } = cli.command
        {
            assert_eq!(firmware, Some(PathBuf::from("app.bin")));
            assert_eq!(address, Some(0x0800_4000));
            assert!(erase && verify && go);
            assert_eq!(start_address, Some(0x0800_4000));
        } else {
            panic!("Expected Flash command");
        }
    }

    #[test]
    fn test_cli_parse_flash_without_firmware() {
        let cli = Cli::try_parse_from(["stmflash", "flash"]).unwrap();
        assert!(matches!(cli.command, Commands::Flash { firmware: None, .. }));
    }

    #[test]
    fn test_cli_parse_erase() {
        let cli = Cli::try_parse_from(["stmflash", "erase", "--all"]).unwrap();
        assert!(matches!(cli.command, Commands::Erase { all: true }));
    }

    #[test]
    fn test_cli_parse_read() {
        let cli =
            Cli::try_parse_from(["stmflash", "read", "0x08000000", "0x400", "-o", "dump.bin"])
                .unwrap();
        if let Commands::Read {
            address,
            length,
            output,
        } = cli.command
        {
            assert_eq!(address, 0x0800_0000);
            assert_eq!(length, 1024);
            assert_eq!(output, Some(PathBuf::from("dump.bin")));
        } else {
            panic!("Expected Read command");
        }
    }

    #[test]
    fn test_cli_parse_read_zero_length_rejected() {
        assert!(Cli::try_parse_from(["stmflash", "read", "0x08000000", "0"]).is_err());
    }

    #[test]
    fn test_cli_parse_go_default_address() {
        let cli = Cli::try_parse_from(["stmflash", "go"]).unwrap();
        assert!(matches!(cli.command, Commands::Go { address: None }));
    }

    #[test]
    fn test_cli_parse_unprotect_requires_a_kind() {
        assert!(Cli::try_parse_from(["stmflash", "unprotect"]).is_err());
        assert!(Cli::try_parse_from(["stmflash", "unprotect", "--write", "--read"]).is_err());
        let cli = Cli::try_parse_from(["stmflash", "unprotect", "--read"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Unprotect {
                write: false,
                read: true
            }
        ));
    }

    #[test]
    fn test_cli_parse_inspect() {
        let cli = Cli::try_parse_from(["stmflash", "inspect", "fw.hex", "--json"]).unwrap();
        if let Commands::Inspect {
            block_size, json, ..
        } = cli.command
        {
            assert_eq!(block_size, 256);
            assert!(json);
        } else {
            panic!("Expected Inspect command");
        }
    }

    #[test]
    fn test_cli_parse_list_ports_json() {
        let cli = Cli::try_parse_from(["stmflash", "list-ports", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::ListPorts { json: true }));
    }

    #[test]
    fn test_cli_global_options() {
        let cli = Cli::try_parse_from([
            "stmflash",
            "-vv",
            "--reply-mode",
            "--flash-size",
            "32",
            "--routines-dir",
            "blobs",
            "--non-interactive",
            "info",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.reply_mode);
        assert_eq!(cli.flash_size.as_deref(), Some("32"));
        assert!(cli.non_interactive);

        let config = Config::default();
        assert!(cli.reply_mode(&config));
        assert_eq!(cli.routines_dir(&config), PathBuf::from("blobs"));
    }

    #[test]
    fn test_cli_missing_subcommand() {
        assert!(Cli::try_parse_from(["stmflash"]).is_err());
    }

    // ---- settings resolution ----

    #[test]
    fn test_settings_fall_back_to_config() {
        let cli = Cli::try_parse_from(["stmflash", "info"]).unwrap();
        let mut config = Config::default();
        assert_eq!(cli.baud_rate(&config), DEFAULT_BAUD);
        assert_eq!(cli.routines_dir(&config), PathBuf::from(DEFAULT_ROUTINES_DIR));
        assert!(cli.flash_size(&config).is_none());

        config.serial.baud = Some(9600);
        config.serial.reply_mode = true;
        config.target.flash_size = Some("128".to_string());
        assert_eq!(cli.baud_rate(&config), 9600);
        assert!(cli.reply_mode(&config));
        assert_eq!(cli.flash_size(&config).as_deref(), Some("128"));

        let cli = Cli::try_parse_from(["stmflash", "-b", "230400", "info"]).unwrap();
        assert_eq!(cli.baud_rate(&config), 230400);
    }

    // ---- value parsers ----

    #[test]
    fn test_parse_hex_u32() {
        assert_eq!(parse_hex_u32("0x08000000"), Ok(0x0800_0000));
        assert_eq!(parse_hex_u32("8000"), Ok(0x8000));
        assert_eq!(parse_hex_u32("0x0800_0000"), Ok(0x0800_0000));
        assert_eq!(parse_hex_u32("  0xA0 "), Ok(0xA0));
        assert!(parse_hex_u32("0xZZ").is_err());
        assert!(parse_hex_u32("0x100000000").is_err());
    }

    #[test]
    fn test_parse_length() {
        assert_eq!(parse_length("256"), Ok(256));
        assert_eq!(parse_length("0x100"), Ok(256));
        assert!(parse_length("0").is_err());
        assert!(parse_length("-1").is_err());
    }

    // ---- exit codes ----

    #[test]
    fn test_exit_codes() {
        let usage: anyhow::Error = CliError::Usage("bad".to_string()).into();
        assert_eq!(exit_code(&usage), 2);

        let cancelled: anyhow::Error = CliError::Cancelled("stop".to_string()).into();
        assert_eq!(exit_code(&cancelled), 130);

        let interrupted = anyhow::Error::new(stmflash::Error::Interrupted).context("flashing");
        assert_eq!(exit_code(&interrupted), 130);

        let nack = anyhow::Error::new(stmflash::Error::Nack { step: "GET" });
        assert_eq!(exit_code(&nack), 1);
    }
}

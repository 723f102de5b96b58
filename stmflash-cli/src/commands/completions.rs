//! Shell completion scripts: print to stdout or install for the current user.

use std::env;
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::{Shell, generate};
use console::style;
use directories::BaseDirs;

use crate::Cli;

/// `.zshrc` line that puts `~/.zfunc` on the completion search path.
const ZSH_FPATH_LINE: &str = "fpath=(~/.zfunc $fpath)";

fn bin_name() -> String {
    Cli::command().get_name().to_string()
}

fn write_script(shell: Shell, out: &mut dyn io::Write) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, bin_name(), out);
}

/// Print the completion script for `shell`.
pub(crate) fn cmd_completions(shell: Shell) {
    write_script(shell, &mut io::stdout());
}

/// Shell named by a binary path such as `/usr/bin/zsh` or `pwsh.exe`.
fn shell_from_path(path: &str) -> Option<Shell> {
    match Path::new(path).file_stem()?.to_str()? {
        "bash" => Some(Shell::Bash),
        "zsh" => Some(Shell::Zsh),
        "fish" => Some(Shell::Fish),
        "elvish" => Some(Shell::Elvish),
        "pwsh" | "powershell" => Some(Shell::PowerShell),
        _ => None,
    }
}

fn current_shell() -> Option<Shell> {
    match env::var("SHELL") {
        Ok(path) => shell_from_path(&path),
        Err(_) if cfg!(windows) && env::var_os("PSModulePath").is_some() => {
            Some(Shell::PowerShell)
        },
        Err(_) => None,
    }
}

/// Per-user location the shell loads completions from.
fn install_path(shell: Shell, home: &Path, data_dir: &Path) -> Result<PathBuf> {
    let name = bin_name();
    let config = home.join(".config");
    let path = match shell {
        Shell::Bash => data_dir.join("bash-completion/completions").join(&name),
        Shell::Zsh => home.join(".zfunc").join(format!("_{name}")),
        Shell::Fish => config.join("fish/completions").join(format!("{name}.fish")),
        Shell::Elvish => config.join("elvish/lib").join(format!("{name}.elv")),
        Shell::PowerShell => config.join("powershell/completions").join(format!("{name}.ps1")),
        other => anyhow::bail!("cannot install completions for {other}"),
    };
    Ok(path)
}

/// Append the fpath setup to `zshrc` unless it is already there.
///
/// Returns whether the file was changed.
fn ensure_zsh_fpath(zshrc: &Path) -> Result<bool> {
    if fs::read_to_string(zshrc).is_ok_and(|rc| rc.contains(ZSH_FPATH_LINE)) {
        return Ok(false);
    }

    let mut rc = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(zshrc)
        .with_context(|| format!("failed to update {}", zshrc.display()))?;
    write!(
        rc,
        "\n# {} completions\n{ZSH_FPATH_LINE}\nautoload -Uz compinit && compinit\n",
        bin_name()
    )?;
    Ok(true)
}

/// Install the completion script for `shell`, or for the login shell.
pub(crate) fn cmd_completions_install(shell: Option<Shell>) -> Result<()> {
    let shell = match shell.or_else(current_shell) {
        Some(shell) => shell,
        None => anyhow::bail!(
            "could not detect your shell, name it explicitly: {} completions --install bash",
            bin_name()
        ),
    };
    let dirs = BaseDirs::new().context("could not determine home directory")?;
    let path = install_path(shell, dirs.home_dir(), dirs.data_dir())?;

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let mut script = Vec::new();
    write_script(shell, &mut script);
    fs::write(&path, script).with_context(|| format!("failed to write {}", path.display()))?;

    eprintln!(
        "{} Installed {shell} completions to {}\n",
        style("✓").green().bold(),
        style(path.display()).yellow()
    );

    match shell {
        Shell::Bash => eprintln!(
            "New terminals pick them up automatically, or run: {}",
            style(format!("source {}", path.display())).cyan()
        ),
        Shell::Zsh => {
            let zshrc = dirs.home_dir().join(".zshrc");
            if ensure_zsh_fpath(&zshrc)? {
                eprintln!("{} Updated {}", style("✓").green().bold(), zshrc.display());
            }
            eprintln!("Restart your shell or run: {}", style("exec zsh").cyan());
        },
        Shell::PowerShell => eprintln!(
            "Load them from your profile with: {}",
            style(format!(". {}", path.display())).cyan()
        ),
        _ => eprintln!("New sessions pick them up automatically."),
    }

    Ok(())
}

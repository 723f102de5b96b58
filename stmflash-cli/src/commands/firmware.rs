//! Firmware discovery for `flash` runs without an explicit image.
//!
//! The working directory tree is scanned for S-record, Intel HEX and raw
//! binary files. A single hit is confirmed, several are offered in a menu.

use std::cmp::Reverse;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Select, theme::ColorfulTheme};
use stmflash::ImageFormat;
use stmflash::image::FIRMWARE_EXTENSIONS;

use crate::{CliError, use_fancy_output};

/// Deepest directory level scanned below the working directory.
const MAX_DEPTH: usize = 5;

const IGNORED_DIRS: &[&str] = &["target", "node_modules", "CMakeFiles"];

/// Build output directories, best first.
const PREFERRED_DIRS: &[&str] = &["output", "build", "out", "bin", "release", "firmware"];

/// A firmware file found on disk.
#[derive(Debug, Clone)]
pub struct FirmwareCandidate {
    pub path: PathBuf,
    /// Format implied by the extension.
    pub format: ImageFormat,
    pub size: u64,
    pub modified: Option<SystemTime>,
    /// Directory score, lower is better.
    pub priority: u32,
}

impl FirmwareCandidate {
    fn new(base: &Path, path: PathBuf, meta: Option<fs::Metadata>) -> Self {
        let rel = path.strip_prefix(base).unwrap_or(&path);
        let dirs: Vec<&str> = rel
            .parent()
            .into_iter()
            .flat_map(Path::components)
            .filter_map(|c| c.as_os_str().to_str())
            .collect();

        Self {
            format: ImageFormat::from_path(&path),
            size: meta.as_ref().map_or(0, fs::Metadata::len),
            modified: meta.and_then(|m| m.modified().ok()),
            priority: dir_priority(&dirs),
            path,
        }
    }

    /// Ordering: directory score, then addressed formats before raw binaries
    /// (those need `--address`), then newest, then shallowest.
    fn sort_key(&self) -> (u32, bool, Reverse<Option<SystemTime>>, usize) {
        (
            self.priority,
            self.format == ImageFormat::Binary,
            Reverse(self.modified),
            self.path.components().count(),
        )
    }

    /// File size for humans.
    #[allow(clippy::cast_precision_loss)]
    pub fn size_label(&self) -> String {
        const KIB: u64 = 1 << 10;
        const MIB: u64 = 1 << 20;
        let (scaled, unit) = match self.size {
            s if s >= MIB => (s as f64 / MIB as f64, "MB"),
            s if s >= KIB => (s as f64 / KIB as f64, "KB"),
            s => return format!("{s} B"),
        };
        format!("{scaled:.1} {unit}")
    }

    /// Menu entry, path relative to `base`.
    pub fn label(&self, base: &Path) -> String {
        format!(
            "{} ({}, {})",
            self.path.strip_prefix(base).unwrap_or(&self.path).display(),
            self.format,
            self.size_label()
        )
    }
}

#[allow(clippy::cast_possible_truncation)]
fn dir_priority(dirs: &[&str]) -> u32 {
    PREFERRED_DIRS
        .iter()
        .position(|preferred| dirs.iter().any(|d| d.eq_ignore_ascii_case(preferred)))
        .unwrap_or(PREFERRED_DIRS.len() + dirs.len()) as u32
}

fn has_firmware_extension(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(OsStr::to_str) else {
        return false;
    };
    FIRMWARE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e))
}

fn is_ignored_dir(name: &OsStr) -> bool {
    let name = name.to_string_lossy();
    name.starts_with('.') || IGNORED_DIRS.contains(&name.as_ref())
}

/// Firmware files under `base`, best candidate first.
pub fn find_firmware_files(base: &Path) -> Vec<FirmwareCandidate> {
    let mut found = Vec::new();
    let mut pending = vec![(base.to_path_buf(), 0usize)];

    while let Some((dir, depth)) = pending.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if depth < MAX_DEPTH && !is_ignored_dir(&entry.file_name()) {
                    pending.push((path, depth + 1));
                }
            } else if has_firmware_extension(&path) {
                found.push(FirmwareCandidate::new(base, path, entry.metadata().ok()));
            }
        }
    }

    found.sort_by_key(FirmwareCandidate::sort_key);
    found
}

fn cancelled() -> anyhow::Error {
    CliError::Cancelled("firmware selection cancelled".to_string()).into()
}

/// Use `firmware` when given, otherwise discover one in the working directory.
///
/// In non-interactive mode a single discovered file is taken as is and
/// several are a usage error.
pub fn resolve_firmware(
    firmware: Option<&PathBuf>,
    non_interactive: bool,
    quiet: bool,
) -> Result<PathBuf> {
    if let Some(path) = firmware {
        return Ok(path.clone());
    }

    let base = std::env::current_dir().context("failed to get current directory")?;
    let mut candidates = find_firmware_files(&base);

    match candidates.len() {
        0 => anyhow::bail!(
            "no firmware file found (looked for {} under {})",
            FIRMWARE_EXTENSIONS.join(", "),
            base.display()
        ),
        1 => confirm_single(&base, candidates.remove(0), non_interactive, quiet),
        count if non_interactive => {
            for candidate in &candidates {
                eprintln!("  {}", candidate.label(&base));
            }
            Err(CliError::Usage(format!(
                "found multiple firmware files ({count}), pass one explicitly in non-interactive mode"
            ))
            .into())
        },
        count => {
            if !quiet {
                eprintln!("{} Found {count} firmware files", style("🔍").cyan());
            }
            choose(&base, candidates)
        },
    }
}

fn confirm_single(
    base: &Path,
    candidate: FirmwareCandidate,
    non_interactive: bool,
    quiet: bool,
) -> Result<PathBuf> {
    let rel = candidate.path.strip_prefix(base).unwrap_or(&candidate.path);
    if !quiet {
        eprintln!(
            "{} Found firmware: {} ({})",
            style("📦").cyan(),
            rel.display(),
            candidate.size_label()
        );
    }
    if non_interactive {
        return Ok(candidate.path);
    }

    let accepted = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Flash {}?", rel.display()))
        .default(true)
        .interact_opt()
        .context("firmware confirmation failed")?
        .unwrap_or(false);
    if accepted {
        Ok(candidate.path)
    } else {
        Err(cancelled())
    }
}

fn choose(base: &Path, candidates: Vec<FirmwareCandidate>) -> Result<PathBuf> {
    let labels: Vec<String> = candidates.iter().map(|c| c.label(base)).collect();
    let theme = ColorfulTheme::default();
    let select = if use_fancy_output() {
        Select::with_theme(&theme)
    } else {
        Select::new()
    };

    let picked = select
        .with_prompt("Select firmware to flash")
        .items(&labels)
        .default(0)
        .interact_opt()
        .context("firmware selection failed")?
        .ok_or_else(cancelled)?;

    candidates
        .into_iter()
        .nth(picked)
        .map(|c| c.path)
        .ok_or_else(cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The working directory is process-wide.
    static CWD_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    struct InDir {
        previous: PathBuf,
    }

    impl InDir {
        fn enter(path: &Path) -> Self {
            let previous = std::env::current_dir().unwrap();
            std::env::set_current_dir(path).unwrap();
            Self { previous }
        }
    }

    impl Drop for InDir {
        fn drop(&mut self) {
            let _ = std::env::set_current_dir(&self.previous);
        }
    }

    fn touch_all(dir: &Path, files: &[&str]) {
        for file in files {
            let path = dir.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, [0u8; 64]).unwrap();
        }
    }

    fn found(files: &[&str]) -> (tempfile::TempDir, Vec<FirmwareCandidate>) {
        let tmp = tempfile::tempdir().unwrap();
        touch_all(tmp.path(), files);
        let result = find_firmware_files(tmp.path());
        (tmp, result)
    }

    fn sized(size: u64) -> FirmwareCandidate {
        FirmwareCandidate {
            path: PathBuf::from("fw/app.s19"),
            format: ImageFormat::SRecord,
            size,
            modified: None,
            priority: 0,
        }
    }

    #[test]
    fn test_ignores_other_files() {
        let (_tmp, result) = found(&["README.md", "main.c", "app.elf"]);
        assert!(result.is_empty());
    }

    #[test]
    fn test_every_firmware_extension() {
        let (_tmp, result) = found(&["a.s19", "b.srec", "c.mot", "d.hex", "e.ihx", "f.bin"]);
        assert_eq!(result.len(), 6);
    }

    #[test]
    fn test_extension_case() {
        let (_tmp, result) = found(&["APP.S19", "boot.Hex"]);
        assert_eq!(result.len(), 2);
        assert!(result.iter().any(|c| c.format == ImageFormat::IntelHex));
    }

    #[test]
    fn test_build_dirs_first() {
        let (_tmp, result) = found(&["misc/app.s19", "build/release/app.s19"]);
        assert!(result[0].path.to_string_lossy().contains("build"));
        assert_eq!(result[0].priority, 1);
    }

    #[test]
    fn test_binaries_after_addressed_formats() {
        let (_tmp, result) = found(&["out/app.bin", "out/app.s19"]);
        assert_eq!(result[0].format, ImageFormat::SRecord);
        assert_eq!(result[1].format, ImageFormat::Binary);
    }

    #[test]
    fn test_hidden_and_ignored_dirs() {
        let (_tmp, result) = found(&["app.hex", ".git/x.hex", "target/debug/y.bin"]);
        assert_eq!(result.len(), 1);
        assert!(result[0].path.ends_with("app.hex"));
    }

    #[test]
    fn test_depth_limit() {
        let (_tmp, result) = found(&["1/2/3/4/5/ok.s19", "1/2/3/4/5/6/7/deep.s19"]);
        assert_eq!(result.len(), 1);
        assert!(result[0].path.ends_with("ok.s19"));
    }

    #[test]
    fn test_size_label() {
        assert_eq!(sized(100).size_label(), "100 B");
        assert_eq!(sized(1536).size_label(), "1.5 KB");
        assert_eq!(sized(2 << 20).size_label(), "2.0 MB");
    }

    #[test]
    fn test_label_is_relative() {
        assert_eq!(sized(10).label(Path::new("fw")), "app.s19 (S-record, 10 B)");
    }

    #[test]
    fn test_explicit_path_is_used() {
        let p = PathBuf::from("/tmp/app.hex");
        assert_eq!(resolve_firmware(Some(&p), true, true).unwrap(), p);
    }

    #[test]
    fn test_non_interactive_discovery() {
        let _lock = CWD_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let empty = tempfile::tempdir().unwrap();
        {
            let _cwd = InDir::enter(empty.path());
            let err = resolve_firmware(None, true, true).unwrap_err();
            assert!(err.to_string().contains("no firmware file found"));
        }

        let one = tempfile::tempdir().unwrap();
        touch_all(one.path(), &["build/blinky.hex"]);
        {
            let _cwd = InDir::enter(one.path());
            assert!(resolve_firmware(None, true, true).unwrap().ends_with("blinky.hex"));
        }

        let two = tempfile::tempdir().unwrap();
        touch_all(two.path(), &["a.s19", "b.hex"]);
        {
            let _cwd = InDir::enter(two.path());
            let err = resolve_firmware(None, true, true).unwrap_err();
            assert!(err.to_string().contains("multiple"));
            assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::Usage(_))));
        }
    }
}

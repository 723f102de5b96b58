//! Firmware image handling.
//!
//! Two textual formats are decoded into [`MemoryRecord`]s:
//!
//! - Motorola S-record (`.s19`, `.srec`, `.mot`), see [`srec`]
//! - Intel HEX (`.hex`, `.ihx`), see [`ihex`]
//!
//! Raw binaries are accepted too, given an explicit load address.
//! [`pack`] then regroups the records into write-sized blocks.

pub mod ihex;
pub mod pack;
pub mod record;
pub mod srec;

pub use pack::pack;
pub use record::{MemoryRecord, RecordKind, data_count, data_len};

use crate::error::{Error, Result};
use log::debug;
use std::path::Path;

/// File extensions recognised as firmware images.
pub const FIRMWARE_EXTENSIONS: &[&str] = &["s19", "srec", "mot", "hex", "ihx", "bin"];

/// Firmware file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// Motorola S-record.
    SRecord,
    /// Intel HEX.
    IntelHex,
    /// Raw binary without addressing information.
    Binary,
}

impl ImageFormat {
    /// Detect the format from a file extension. Unknown extensions are binary.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "s19" | "srec" | "mot" => Self::SRecord,
            "hex" | "ihx" => Self::IntelHex,
            _ => Self::Binary,
        }
    }

    /// Short name for display.
    pub fn name(self) -> &'static str {
        match self {
            Self::SRecord => "S-record",
            Self::IntelHex => "Intel HEX",
            Self::Binary => "binary",
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse textual firmware content, optionally packing it to `pack_to` bytes.
pub fn parse(format: ImageFormat, content: &str, pack_to: Option<usize>) -> Result<Vec<MemoryRecord>> {
    match format {
        ImageFormat::SRecord => srec::parse(content, pack_to),
        ImageFormat::IntelHex => ihex::parse(content, pack_to),
        ImageFormat::Binary => Err(Error::InvalidArgument(
            "binary images have no textual encoding".to_string(),
        )),
    }
}

/// Load a firmware file and pack it into blocks of at most `block_size` bytes.
///
/// `base_address` is only used (and required) for raw binaries.
pub fn load_image<P: AsRef<Path>>(
    path: P,
    base_address: Option<u32>,
    block_size: usize,
) -> Result<Vec<MemoryRecord>> {
    let path = path.as_ref();
    let format = ImageFormat::from_path(path);
    debug!("Loading {} image from: {}", format, path.display());

    match format {
        ImageFormat::Binary => {
            let address = base_address.ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "{} is a raw binary, a load address is required",
                    path.display()
                ))
            })?;
            let data = std::fs::read(path)?;
            pack(vec![MemoryRecord::data(address, data)], block_size)
        },
        _ => {
            let content = std::fs::read_to_string(path)?;
            parse(format, &content, Some(block_size))
        },
    }
}

/// Non-empty lines with their 1-based line numbers, CR stripped.
pub(crate) fn lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .split('\n')
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
}

/// Decode a run of hex digit pairs.
pub(crate) fn decode_hex(digits: &[u8], line: usize) -> Result<Vec<u8>> {
    if digits.len() % 2 != 0 {
        return Err(Error::format(line, "odd number of hex digits"));
    }
    digits
        .chunks_exact(2)
        .map(|pair| match (nibble(pair[0]), nibble(pair[1])) {
            (Some(hi), Some(lo)) => Ok((hi << 4) | lo),
            _ => Err(Error::format(
                line,
                format!("invalid hex digits '{}'", String::from_utf8_lossy(pair)),
            )),
        })
        .collect()
}

fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_from_path() {
        assert_eq!(ImageFormat::from_path(&PathBuf::from("fw.s19")), ImageFormat::SRecord);
        assert_eq!(ImageFormat::from_path(&PathBuf::from("fw.S19")), ImageFormat::SRecord);
        assert_eq!(ImageFormat::from_path(&PathBuf::from("fw.ihx")), ImageFormat::IntelHex);
        assert_eq!(ImageFormat::from_path(&PathBuf::from("fw.HEX")), ImageFormat::IntelHex);
        assert_eq!(ImageFormat::from_path(&PathBuf::from("fw.bin")), ImageFormat::Binary);
        assert_eq!(ImageFormat::from_path(&PathBuf::from("firmware")), ImageFormat::Binary);
    }

    #[test]
    fn test_lines_skip_blank_and_strip_cr() {
        let collected: Vec<_> = lines("a\r\n\r\nb\n\nc").collect();
        assert_eq!(collected, vec![(1, "a"), (3, "b"), (5, "c")]);
    }

    #[test]
    fn test_decode_hex() {
        assert_eq!(decode_hex(b"00fFa5", 1).unwrap(), vec![0x00, 0xFF, 0xA5]);
        assert!(decode_hex(b"0", 1).is_err());
        assert!(decode_hex(b"+F", 1).is_err());
        assert!(matches!(decode_hex(b"zz", 4), Err(Error::Format { line: 4, .. })));
    }

    #[test]
    fn test_parse_binary_is_rejected() {
        assert!(parse(ImageFormat::Binary, "", None).is_err());
    }
}

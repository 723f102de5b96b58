//! Motorola S-record decoding.
//!
//! ```text
//! S <type> <count> <address> <data...> <checksum>
//! ```
//!
//! `count` covers address, data and checksum bytes. The checksum is the
//! one's complement of the low byte of the sum of count, address and data.
//! `S1`/`S9` carry 16-bit addresses, `S3`/`S7` 32-bit ones. Other record
//! types (headers, counts, 24-bit variants) are skipped.

use crate::error::{Error, Result};
use crate::image::pack::pack;
use crate::image::record::MemoryRecord;
use crate::image::{decode_hex, lines};
use log::{debug, trace};

/// Parse S-record text into memory records.
///
/// With `pack_to`, the records are packed into blocks of at most that many
/// bytes before being returned.
pub fn parse(content: &str, pack_to: Option<usize>) -> Result<Vec<MemoryRecord>> {
    let mut records = Vec::new();
    for (line_no, line) in lines(content) {
        if let Some(record) = parse_line(line, line_no)? {
            records.push(record);
        }
    }
    debug!("Parsed {} S-records", records.len());

    match pack_to {
        Some(block_size) => pack(records, block_size),
        None => Ok(records),
    }
}

fn parse_line(line: &str, line_no: usize) -> Result<Option<MemoryRecord>> {
    let bytes = line.as_bytes();
    if bytes[0] != b'S' {
        return Err(Error::format(line_no, "S-record must start with 'S'"));
    }
    let Some(&record_type) = bytes.get(1) else {
        return Err(Error::format(line_no, "missing record type"));
    };
    let (is_data, address_len) = match record_type {
        b'1' => (true, 2),
        b'3' => (true, 4),
        b'9' => (false, 2),
        b'7' => (false, 4),
        _ => {
            trace!("Line {line_no}: skipping S{} record", record_type as char);
            return Ok(None);
        },
    };

    let fields = decode_hex(&bytes[2..], line_no)?;
    let Some((&count, rest)) = fields.split_first() else {
        return Err(Error::format(line_no, "missing byte count"));
    };
    if rest.len() != usize::from(count) {
        return Err(Error::format(
            line_no,
            format!("byte count {count} does not match {} bytes on the line", rest.len()),
        ));
    }
    if rest.len() < address_len + 1 {
        return Err(Error::format(line_no, "record too short for its address"));
    }

    let (body, checksum) = fields.split_at(fields.len() - 1);
    let expected = body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)) ^ 0xFF;
    if expected != checksum[0] {
        return Err(Error::format(
            line_no,
            format!(
                "checksum mismatch: expected {expected:#04x}, found {:#04x}",
                checksum[0]
            ),
        ));
    }

    let address = rest[..address_len]
        .iter()
        .fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
    let data = &rest[address_len..rest.len() - 1];

    Ok(Some(if is_data {
        MemoryRecord::data(address, data.to_vec())
    } else {
        MemoryRecord::start_address(address)
    }))
}

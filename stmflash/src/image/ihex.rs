//! Intel HEX decoding.
//!
//! ```text
//! : <count> <offset:2> <type> <data...> <checksum>
//! ```
//!
//! All bytes of a line, checksum included, sum to zero modulo 256.
//! Supported record types:
//!
//! | type | meaning                                   |
//! |------|-------------------------------------------|
//! | 00   | data at `base + offset`                   |
//! | 04   | extended linear address, sets `base`      |
//! | 05   | start linear address (from the data)      |
//!
//! Everything else (EOF, segment records) is skipped.

use crate::error::{Error, Result};
use crate::image::pack::pack;
use crate::image::record::MemoryRecord;
use crate::image::{decode_hex, lines};
use log::{debug, trace};

const TYPE_DATA: u8 = 0x00;
const TYPE_EXTENDED_LINEAR_ADDRESS: u8 = 0x04;
const TYPE_START_LINEAR_ADDRESS: u8 = 0x05;

/// Parse Intel HEX text into memory records.
///
/// With `pack_to`, the records are packed into blocks of at most that many
/// bytes before being returned.
pub fn parse(content: &str, pack_to: Option<usize>) -> Result<Vec<MemoryRecord>> {
    let mut records = Vec::new();
    let mut base = 0u32;

    for (line_no, line) in lines(content) {
        let bytes = line.as_bytes();
        if bytes[0] != b':' {
            return Err(Error::format(line_no, "Intel HEX record must start with ':'"));
        }
        let fields = decode_hex(&bytes[1..], line_no)?;
        if fields.len() < 5 {
            return Err(Error::format(line_no, "record too short"));
        }
        let count = usize::from(fields[0]);
        if fields.len() != count + 5 {
            return Err(Error::format(
                line_no,
                format!("byte count {count} does not match the line length"),
            ));
        }
        let sum = fields.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        if sum != 0 {
            return Err(Error::format(
                line_no,
                format!("checksum mismatch: line sums to {sum:#04x}"),
            ));
        }

        let offset = u32::from(u16::from_be_bytes([fields[1], fields[2]]));
        let data = &fields[4..4 + count];
        match fields[3] {
            TYPE_DATA => records.push(MemoryRecord::data(base + offset, data.to_vec())),
            TYPE_EXTENDED_LINEAR_ADDRESS => {
                let [hi, lo] = data else {
                    return Err(Error::format(line_no, "extended linear address needs 2 data bytes"));
                };
                base = u32::from(u16::from_be_bytes([*hi, *lo])) << 16;
                trace!("Line {line_no}: base address {base:#010x}");
            },
            TYPE_START_LINEAR_ADDRESS => {
                let Ok(address) = <[u8; 4]>::try_from(data) else {
                    return Err(Error::format(line_no, "start linear address needs 4 data bytes"));
                };
                records.push(MemoryRecord::start_address(u32::from_be_bytes(address)));
            },
            other => trace!("Line {line_no}: skipping record type {other:#04x}"),
        }
    }
    debug!("Parsed {} Intel HEX records", records.len());

    match pack_to {
        Some(block_size) => pack(records, block_size),
        None => Ok(records),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::image::record::RecordKind;

    fn record(offset: u16, record_type: u8, data: &[u8]) -> String {
        let mut bytes = vec![u8::try_from(data.len()).unwrap()];
        bytes.extend_from_slice(&offset.to_be_bytes());
        bytes.push(record_type);
        bytes.extend_from_slice(data);
        let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        bytes.push(sum.wrapping_neg());
        let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
        format!(":{hex}")
    }

    #[test]
    fn test_parse_data() {
        let records = parse(":0400000012345678E8\n:00000001FF\n", None).unwrap();
        assert_eq!(records, vec![MemoryRecord::data(0, vec![0x12, 0x34, 0x56, 0x78])]);
    }

    #[test]
    fn test_extended_linear_address_and_start() {
        let content = ":020000040800F2\r\n:0400100001020304E2\r\n:0400000508000121CD\r\n:00000001FF\r\n";
        let records = parse(content, None).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], MemoryRecord::data(0x0800_0010, vec![1, 2, 3, 4]));
        assert_eq!(records[1].kind, RecordKind::StartAddress);
        assert_eq!(records[1].address, 0x0800_0121);
    }

    #[test]
    fn test_checksum_mismatch() {
        let err = parse(":020000040800F2\n:0400000012345679E8\n", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(matches!(err, Error::Format { line: 2, .. }));
    }

    #[test]
    fn test_must_start_with_colon() {
        let err = parse("S9030000FC", None).unwrap_err();
        assert!(matches!(err, Error::Format { line: 1, .. }));
    }

    #[test]
    fn test_length_mismatch() {
        assert!(parse(":0500000012345678E7", None).is_err());
    }

    #[test]
    fn test_other_types_skipped() {
        let content = format!("{}\n{}\n", record(0, 0x02, &[0x10, 0x00]), record(0, 0x03, &[0, 0, 0, 0]));
        assert!(parse(&content, None).unwrap().is_empty());
    }

    #[test]
    fn test_parse_and_pack() {
        let content = [
            record(0, 0x04, &[0x08, 0x00]),
            record(0x0000, 0x00, &[0xAA; 16]),
            record(0x0010, 0x00, &[0xBB; 16]),
            record(0x0020, 0x00, &[0xCC; 16]),
            record(0, 0x05, &[0x08, 0x00, 0x00, 0x00]),
            record(0, 0x01, &[]),
        ]
        .join("\n");
        let records = parse(&content, Some(32)).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], MemoryRecord::start_address(0x0800_0000));
        assert_eq!(records[1].address, 0x0800_0000);
        assert_eq!(records[1].len(), 32);
        assert_eq!(records[2].address, 0x0800_0020);
        assert_eq!(records[2].data, vec![0xCC; 16]);
    }
}

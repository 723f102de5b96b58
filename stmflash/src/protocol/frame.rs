//! Frame builders.
//!
//! Pure functions; nothing here touches the transport.

use crate::protocol::command::Command;
use byteorder::{BigEndian, ByteOrder};

/// XOR of all bytes.
pub fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Build a command frame: opcode followed by its complement.
pub fn command_frame(command: Command) -> [u8; 2] {
    [command.opcode(), command.complement()]
}

/// Build an address frame: big-endian address followed by its XOR checksum.
pub fn address_frame(address: u32) -> Vec<u8> {
    let mut frame = vec![0; 5];
    BigEndian::write_u32(&mut frame[..4], address);
    frame[4] = xor_checksum(&frame[..4]);
    frame
}

/// Build a data frame: `len - 1`, the payload, then `xor(payload) ^ (len - 1)`.
///
/// Returns `None` for an empty payload or one longer than 256 bytes, neither
/// of which can be encoded in the length byte.
pub fn data_frame(data: &[u8]) -> Option<Vec<u8>> {
    let n = u8::try_from(data.len().checked_sub(1)?).ok()?;
    let mut frame = Vec::with_capacity(data.len() + 2);
    frame.push(n);
    frame.extend_from_slice(data);
    frame.push(xor_checksum(data) ^ n);
    Some(frame)
}

/// Build the byte-count frame of a READ: `[count - 1, (count - 1) ^ 0xFF]`.
///
/// Returns `None` when `count` is outside `1..=256`.
pub fn count_frame(count: usize) -> Option<[u8; 2]> {
    let n = u8::try_from(count.checked_sub(1)?).ok()?;
    Some([n, n ^ 0xFF])
}

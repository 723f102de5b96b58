//! STM8/STM32 UART bootloader wire protocol.
//!
//! The bootloader speaks a half-duplex request/response protocol at 8 data
//! bits. Every exchange is a host frame followed by a single response read:
//!
//! ```text
//! command:  [opcode, 0xFF ^ opcode]
//! address:  [a31..a24, a23..a16, a15..a8, a7..a0, xor(a)]
//! data:     [len - 1, d0 .. dn, xor(d) ^ (len - 1)]
//! ```
//!
//! The device answers `ACK` (0x79) or `NACK` (0x1F).

pub mod command;
pub mod frame;

pub use command::{ACK, Command, NACK, SYNC};
pub use frame::{address_frame, command_frame, count_frame, data_frame, xor_checksum};

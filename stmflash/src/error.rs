//! Error types for stmflash.

use std::io;
use thiserror::Error;

/// Result type for stmflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`].
///
/// Callers that only need to decide how to recover (re-parse the file,
/// reconnect the target, fix the configuration) can match on this instead of
/// the individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed firmware image.
    Format,
    /// The bootloader answered something other than what was expected.
    Protocol,
    /// The operation is not allowed in the current session state.
    State,
    /// The serial transport failed.
    Transport,
    /// Invalid device or engine configuration.
    Config,
    /// Invalid argument passed by the caller.
    Argument,
    /// The embedding application asked to stop.
    Interrupted,
}

/// Error type for stmflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Transport failure reported by a [`Port`](crate::port::Port) implementation.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed or checksum-mismatched firmware line.
    #[error("Line {line}: {reason}")]
    Format {
        /// 1-based line number in the source file.
        line: usize,
        /// What is wrong with the line.
        reason: String,
    },

    /// Two data records claim the same start address.
    #[error("Duplicate data record at address {0:#010x}")]
    DuplicateAddress(u32),

    /// The bootloader answered NACK.
    #[error("NACK received during {step}")]
    Nack {
        /// Protocol step that was refused.
        step: &'static str,
    },

    /// The bootloader answered neither ACK nor NACK.
    #[error("Unexpected response during {step}: {}", describe_byte(*.byte))]
    UnexpectedResponse {
        /// Protocol step being executed.
        step: &'static str,
        /// Leading byte received, `None` if the response was empty.
        byte: Option<u8>,
    },

    /// Command not offered by the connected bootloader.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Operation issued in the wrong session state.
    #[error("Invalid state: {0}")]
    State(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Erase/write routine blob could not be loaded.
    #[error("Cannot load routines {name}: {source}")]
    Asset {
        /// Routine file name.
        name: String,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// One chunk of a chunked write failed; later chunks were not attempted.
    #[error("Write of block {}/{total} at {address:#010x} failed: {source}", .block + 1)]
    WriteFailed {
        /// 0-based index of the failing block.
        block: usize,
        /// Number of blocks in the write.
        total: usize,
        /// Target address of the failing block.
        address: u32,
        /// Cause of the failure.
        #[source]
        source: Box<Error>,
    },

    /// Interrupted by the embedding application.
    #[error("Operation interrupted")]
    Interrupted,
}

fn describe_byte(byte: Option<u8>) -> String {
    match byte {
        Some(b) => format!("{b:#04x}"),
        None => "no data".to_string(),
    }
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Format { .. } | Self::DuplicateAddress(_) => ErrorKind::Format,
            Self::Nack { .. } | Self::UnexpectedResponse { .. } | Self::Unsupported(_) => {
                ErrorKind::Protocol
            },
            Self::State(_) => ErrorKind::State,
            Self::Io(_) | Self::Transport(_) => ErrorKind::Transport,
            #[cfg(feature = "native")]
            Self::Serial(_) => ErrorKind::Transport,
            Self::Config(_) | Self::Asset { .. } => ErrorKind::Config,
            Self::InvalidArgument(_) => ErrorKind::Argument,
            Self::WriteFailed { source, .. } => source.kind(),
            Self::Interrupted => ErrorKind::Interrupted,
        }
    }

    pub(crate) fn format(line: usize, reason: impl Into<String>) -> Self {
        Self::Format {
            line,
            reason: reason.into(),
        }
    }
}

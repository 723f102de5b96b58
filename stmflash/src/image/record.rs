//! Memory records produced by the firmware parsers.

/// What a [`MemoryRecord`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum RecordKind {
    /// Bytes to be written at `address`.
    Data,
    /// Entry point of the image. Carries no data.
    StartAddress,
}

/// One decoded unit of a firmware image.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MemoryRecord {
    /// Record kind.
    pub kind: RecordKind,
    /// Target address (load address for data, entry point otherwise).
    pub address: u32,
    /// Payload, empty for start addresses.
    pub data: Vec<u8>,
}

impl MemoryRecord {
    /// Create a data record.
    pub fn data(address: u32, data: Vec<u8>) -> Self {
        Self {
            kind: RecordKind::Data,
            address,
            data,
        }
    }

    /// Create a start address record.
    pub fn start_address(address: u32) -> Self {
        Self {
            kind: RecordKind::StartAddress,
            address,
            data: Vec::new(),
        }
    }

    /// Whether this is a data record.
    pub fn is_data(&self) -> bool {
        self.kind == RecordKind::Data
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Number of data records in `records`.
pub fn data_count(records: &[MemoryRecord]) -> usize {
    records.iter().filter(|r| r.is_data()).count()
}

/// Total payload bytes of the data records in `records`.
pub fn data_len(records: &[MemoryRecord]) -> usize {
    records.iter().filter(|r| r.is_data()).map(MemoryRecord::len).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_skip_start_address() {
        let records = vec![
            MemoryRecord::start_address(0x0800_0000),
            MemoryRecord::data(0x0800_0000, vec![1, 2, 3]),
            MemoryRecord::data(0x0800_0100, vec![4]),
        ];
        assert_eq!(data_count(&records), 2);
        assert_eq!(data_len(&records), 4);
        assert!(records[0].is_empty());
    }
}

//! Record packing.
//!
//! Parsed images usually consist of many short records (16 or 32 bytes per
//! line). The bootloader accepts up to one write block per WRITE command, so
//! contiguous records are merged into blocks of at most `block_size` bytes
//! before programming.

use crate::error::{Error, Result};
use crate::image::record::{MemoryRecord, RecordKind};
use log::debug;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// Merge data records into contiguous blocks no longer than `block_size`.
///
/// Start address records come first, in input order. Data blocks follow in
/// ascending address order: each block starts at the lowest address not yet
/// emitted and absorbs records that continue exactly where the block ends,
/// as long as the whole record still fits. A gap or an overflowing record
/// closes the block. A single record longer than `block_size` is split.
///
/// Empty data records are dropped. Two data records starting at the same
/// address are rejected.
pub fn pack(records: Vec<MemoryRecord>, block_size: usize) -> Result<Vec<MemoryRecord>> {
    if block_size == 0 {
        return Err(Error::InvalidArgument("block size must be non-zero".to_string()));
    }

    let mut packed = Vec::new();
    let mut pending: BTreeMap<u32, Vec<u8>> = BTreeMap::new();

    for record in records {
        match record.kind {
            RecordKind::StartAddress => packed.push(record),
            RecordKind::Data if record.data.is_empty() => {},
            RecordKind::Data => insert_unique(&mut pending, record.address, record.data)?,
        }
    }

    while let Some((base, mut block)) = pending.pop_first() {
        if block.len() > block_size {
            let rest = block.split_off(block_size);
            let next = end_address(base, block.len()).ok_or_else(|| {
                Error::InvalidArgument(format!("record at {base:#010x} runs past the 32-bit address space"))
            })?;
            insert_unique(&mut pending, next, rest)?;
        }

        while let Some(next) = end_address(base, block.len()) {
            match pending.get(&next) {
                Some(data) if block.len() + data.len() <= block_size => {
                    if let Some(data) = pending.remove(&next) {
                        block.extend(data);
                    }
                },
                _ => break,
            }
        }

        packed.push(MemoryRecord::data(base, block));
    }

    debug!(
        "Packed into {} records (block size {})",
        packed.len(),
        block_size
    );
    Ok(packed)
}

fn insert_unique(pending: &mut BTreeMap<u32, Vec<u8>>, address: u32, data: Vec<u8>) -> Result<()> {
    match pending.entry(address) {
        Entry::Occupied(_) => Err(Error::DuplicateAddress(address)),
        Entry::Vacant(slot) => {
            slot.insert(data);
            Ok(())
        },
    }
}

/// First address after `len` bytes at `base`, if it fits in 32 bits.
fn end_address(base: u32, len: usize) -> Option<u32> {
    u32::try_from(len).ok().and_then(|len| base.checked_add(len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::image::record::data_len;

    fn data(address: u32, len: usize, fill: u8) -> MemoryRecord {
        MemoryRecord::data(address, vec![fill; len])
    }

    #[test]
    fn test_merges_adjacent_records() {
        let records = vec![data(0x100, 16, 1), data(0x110, 16, 2), data(0x120, 16, 3)];
        let packed = pack(records, 128).unwrap();
        assert_eq!(packed.len(), 1);
        assert_eq!(packed[0].address, 0x100);
        assert_eq!(packed[0].len(), 48);
        assert_eq!(packed[0].data[16], 2);
        assert_eq!(packed[0].data[47], 3);
    }

    #[test]
    fn test_block_size_bound() {
        let records: Vec<_> = (0..10).map(|i| data(0x8000 + i * 16, 16, 0)).collect();
        let packed = pack(records, 64).unwrap();
        let lens: Vec<_> = packed.iter().map(MemoryRecord::len).collect();
        assert_eq!(lens, vec![64, 64, 32]);
        assert_eq!(packed[1].address, 0x8040);
        assert_eq!(packed[2].address, 0x8080);
    }

    #[test]
    fn test_record_that_would_overflow_starts_new_block() {
        let records = vec![data(0, 100, 0), data(100, 60, 0)];
        let packed = pack(records, 128).unwrap();
        let lens: Vec<_> = packed.iter().map(MemoryRecord::len).collect();
        assert_eq!(lens, vec![100, 60]);
        assert_eq!(packed[1].address, 100);
    }

    #[test]
    fn test_gap_splits_blocks_and_sorts() {
        let records = vec![data(0x200, 8, 2), data(0x100, 8, 1), data(0x108, 8, 1)];
        let packed = pack(records, 128).unwrap();
        assert_eq!(packed.len(), 2);
        assert_eq!(packed[0].address, 0x100);
        assert_eq!(packed[0].len(), 16);
        assert_eq!(packed[1].address, 0x200);
    }

    #[test]
    fn test_start_address_first_in_order() {
        let records = vec![
            data(0x100, 8, 0),
            MemoryRecord::start_address(0x8000),
            data(0x108, 8, 0),
            MemoryRecord::start_address(0x9000),
        ];
        let packed = pack(records, 128).unwrap();
        assert_eq!(packed[0], MemoryRecord::start_address(0x8000));
        assert_eq!(packed[1], MemoryRecord::start_address(0x9000));
        assert!(packed[2].is_data());
    }

    #[test]
    fn test_length_preserved_and_bounded() {
        let mut records = Vec::new();
        let mut address = 0x0800_0000u32;
        for i in 0..200usize {
            let len = 1 + (i * 7) % 33;
            records.push(data(address, len, 0x5A));
            // leave a hole every 17 records
            address += u32::try_from(len).unwrap() + if i % 17 == 0 { 4 } else { 0 };
        }
        let total = data_len(&records);
        for block_size in [1, 16, 100, 128, 256] {
            let packed = pack(records.clone(), block_size).unwrap();
            assert_eq!(data_len(&packed), total);
            assert!(packed.iter().all(|r| r.len() <= block_size));
        }
    }

    #[test]
    fn test_oversized_record_is_split() {
        let packed = pack(vec![data(0x1000, 300, 7)], 128).unwrap();
        let shape: Vec<_> = packed.iter().map(|r| (r.address, r.len())).collect();
        assert_eq!(shape, vec![(0x1000, 128), (0x1080, 128), (0x1100, 44)]);
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let err = pack(vec![data(0x10, 4, 0), data(0x10, 4, 1)], 128).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(matches!(err, Error::DuplicateAddress(0x10)));
    }

    #[test]
    fn test_empty_records_dropped() {
        let packed = pack(vec![data(0x10, 0, 0), data(0x10, 4, 0)], 128).unwrap();
        assert_eq!(packed.len(), 1);
    }

    #[test]
    fn test_zero_block_size_rejected() {
        assert!(pack(vec![data(0, 4, 0)], 0).is_err());
    }
}

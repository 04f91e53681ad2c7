//! Snapshot file format
//!
//! A collection snapshot (`index.bin`) holds the slot registry and the
//! exported ANN index side by side, so the two are always restored as a
//! pair. Layout, all little-endian:
//!
//! ```text
//! ┌────────┬─────────┬────────┬────────────┬──────────────────┬──────────┬─────────────┐
//! │ Magic  │ Version │ CRC32  │ SlotCount  │ Registry         │ IndexLen │ Index bytes │
//! │ 4 bytes│ 4 bytes │ 4 bytes│ 4 bytes    │ SlotCount × 4    │ 8 bytes  │ IndexLen    │
//! └────────┴─────────┴────────┴────────────┴──────────────────┴──────────┴─────────────┘
//! ```
//!
//! The CRC covers everything after the CRC field.

use crate::error::StoreError;
use crate::registry::Registry;

pub const SNAPSHOT_MAGIC: u32 = 0x5344_4256; // "VBDS"
pub const SNAPSHOT_VERSION: u32 = 1;
pub const SNAPSHOT_HEADER_SIZE: usize = 16;

/// Decoded snapshot contents.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub registry: Registry,
    pub index: Vec<u8>,
}

/// Serialize a registry and an exported index into one blob.
pub fn encode(registry: &Registry, index: &[u8]) -> Vec<u8> {
    let registry_bytes = registry.to_bytes();
    let total = SNAPSHOT_HEADER_SIZE + registry_bytes.len() + 8 + index.len();
    let mut buffer = Vec::with_capacity(total);

    buffer.extend_from_slice(&SNAPSHOT_MAGIC.to_le_bytes());
    buffer.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    // CRC placeholder, filled below
    buffer.extend_from_slice(&0u32.to_le_bytes());
    buffer.extend_from_slice(&(registry.capacity() as u32).to_le_bytes());
    buffer.extend_from_slice(&registry_bytes);
    buffer.extend_from_slice(&(index.len() as u64).to_le_bytes());
    buffer.extend_from_slice(index);

    let crc = crc32fast::hash(&buffer[12..]);
    buffer[8..12].copy_from_slice(&crc.to_le_bytes());
    buffer
}

fn corrupt(reason: impl Into<String>) -> StoreError {
    StoreError::CorruptSnapshot(reason.into())
}

fn read_u32(data: &[u8], start: usize) -> Result<u32, StoreError> {
    data.get(start..start + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| corrupt("truncated header"))
}

fn read_u64(data: &[u8], start: usize) -> Result<u64, StoreError> {
    data.get(start..start + 8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or_else(|| corrupt("truncated index length"))
}

/// Parse a snapshot blob, verifying magic, version, checksum and lengths.
pub fn decode(data: &[u8]) -> Result<Snapshot, StoreError> {
    if read_u32(data, 0)? != SNAPSHOT_MAGIC {
        return Err(corrupt("bad magic"));
    }

    let version = read_u32(data, 4)?;
    if version != SNAPSHOT_VERSION {
        return Err(corrupt(format!("unsupported version {}", version)));
    }

    let stored_crc = read_u32(data, 8)?;
    if stored_crc != crc32fast::hash(&data[12..]) {
        return Err(corrupt("checksum mismatch"));
    }

    let slot_count = read_u32(data, 12)? as usize;
    let registry_end = SNAPSHOT_HEADER_SIZE + slot_count * 4;
    let registry_bytes = data
        .get(SNAPSHOT_HEADER_SIZE..registry_end)
        .ok_or_else(|| corrupt("truncated registry"))?;
    let registry = Registry::from_bytes(registry_bytes)?;

    let index_len = read_u64(data, registry_end)? as usize;
    let index_start = registry_end + 8;
    let index = data
        .get(index_start..)
        .filter(|rest| rest.len() == index_len)
        .ok_or_else(|| corrupt("index length does not match payload"))?
        .to_vec();

    Ok(Snapshot { registry, index })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SlotFlags;

    fn sample() -> (Registry, Vec<u8>) {
        let mut registry = Registry::new(4);
        registry.set(1, SlotFlags::VALID | SlotFlags::HAS_FILE);
        registry.set(3, SlotFlags::VALID);
        (registry, vec![9, 8, 7, 6, 5])
    }

    #[test]
    fn test_encode_decode() {
        let (registry, index) = sample();
        let blob = encode(&registry, &index);
        assert_eq!(blob.len(), SNAPSHOT_HEADER_SIZE + 16 + 8 + 5);

        let snapshot = decode(&blob).unwrap();
        assert_eq!(snapshot.registry, registry);
        assert_eq!(snapshot.index, index);
    }

    #[test]
    fn test_empty_index() {
        let registry = Registry::new(2);
        let snapshot = decode(&encode(&registry, &[])).unwrap();
        assert_eq!(snapshot.registry.capacity(), 2);
        assert!(snapshot.index.is_empty());
    }

    #[test]
    fn test_corruption_detection() {
        let (registry, index) = sample();
        let mut blob = encode(&registry, &index);
        let last = blob.len() - 1;
        blob[last] ^= 0xFF;
        let err = decode(&blob).unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn test_bad_magic_and_truncation() {
        let (registry, index) = sample();
        let blob = encode(&registry, &index);

        let mut bad = blob.clone();
        bad[0] = 0;
        assert!(decode(&bad).unwrap_err().to_string().contains("magic"));

        assert!(matches!(
            decode(&blob[..10]),
            Err(StoreError::CorruptSnapshot(_))
        ));
        assert!(matches!(decode(&[]), Err(StoreError::CorruptSnapshot(_))));
    }

    #[test]
    fn test_unsupported_version() {
        let (registry, index) = sample();
        let mut blob = encode(&registry, &index);
        blob[4..8].copy_from_slice(&7u32.to_le_bytes());
        assert!(decode(&blob).unwrap_err().to_string().contains("version 7"));
    }
}

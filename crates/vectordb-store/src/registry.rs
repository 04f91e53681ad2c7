//! Persistent slot registry.
//!
//! One [`SlotFlags`] word per slot, serialized verbatim as little-endian
//! `u32`s. This is the source of truth for which slots are live and which
//! have a block file on disk.

use bitflags::bitflags;

use crate::error::StoreError;
use crate::SlotId;

bitflags! {
    /// Per-slot state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SlotFlags: u32 {
        /// Slot holds a live item
        const VALID = 1 << 0;
        /// A block file exists for this slot
        const HAS_FILE = 1 << 1;
    }
}

impl SlotFlags {
    pub fn is_valid(self) -> bool {
        self.contains(SlotFlags::VALID)
    }

    pub fn has_file(self) -> bool {
        self.contains(SlotFlags::HAS_FILE)
    }
}

/// Fixed-length array of slot flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    slots: Vec<SlotFlags>,
}

impl Registry {
    /// All-free registry with `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![SlotFlags::empty(); capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Flags for `id`; out-of-range ids read as empty.
    pub fn get(&self, id: SlotId) -> SlotFlags {
        self.slots
            .get(id as usize)
            .copied()
            .unwrap_or_else(SlotFlags::empty)
    }

    /// Overwrite the flags for `id`. Out-of-range ids are ignored; callers
    /// validate ids before mutating.
    pub fn set(&mut self, id: SlotId, flags: SlotFlags) {
        if let Some(slot) = self.slots.get_mut(id as usize) {
            *slot = flags;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotId, SlotFlags)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, flags)| (i as SlotId, *flags))
    }

    pub fn valid_count(&self) -> usize {
        self.slots.iter().filter(|f| f.is_valid()).count()
    }

    /// Encode as little-endian `u32` words.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.slots.len() * 4);
        for flags in &self.slots {
            out.extend_from_slice(&flags.bits().to_le_bytes());
        }
        out
    }

    /// Decode from little-endian `u32` words. Unknown bits are rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        if bytes.len() % 4 != 0 {
            return Err(StoreError::CorruptSnapshot(format!(
                "registry length {} is not a multiple of 4",
                bytes.len()
            )));
        }

        let slots = bytes
            .chunks_exact(4)
            .enumerate()
            .map(|(i, chunk)| {
                let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                SlotFlags::from_bits(word).ok_or_else(|| {
                    StoreError::CorruptSnapshot(format!(
                        "slot {} has unknown flag bits {:#x}",
                        i, word
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { slots })
    }
}

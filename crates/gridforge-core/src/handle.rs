//! Value handles into the grid world.
//!
//! Handles are plain copyable values. A [`CellRef`] captures the generation of
//! the partition slot it was taken from, so a reference that outlives its
//! partition fails validation instead of silently aliasing a newer partition
//! that reused the same slot.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Dense, reusable index of a registered partition.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct PartitionHandle(pub u16);

impl PartitionHandle {
    /// Slot index in the registry
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PartitionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Generation-checked reference to a single cell.
///
/// Format: partition slot, linear cell index, slot generation at capture time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRef {
    partition: PartitionHandle,
    index: u32,
    generation: u32,
}

impl CellRef {
    /// Create a new reference. Only the world hands these out.
    #[inline]
    pub const fn new(partition: PartitionHandle, index: u32, generation: u32) -> Self {
        Self {
            partition,
            index,
            generation,
        }
    }

    /// Partition the cell belonged to when captured
    #[inline]
    pub const fn partition(self) -> PartitionHandle {
        self.partition
    }

    /// Linear index inside the partition's cell array
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation captured with the reference
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Pack into 64 bits (for save files and network messages).
    ///
    /// Format: [16-bit partition | 24-bit index | 24-bit generation]
    #[inline]
    pub const fn to_bits(self) -> u64 {
        ((self.partition.0 as u64) << 48)
            | (((self.index & 0x00FF_FFFF) as u64) << 24)
            | (self.generation & 0x00FF_FFFF) as u64
    }

    /// Unpack from [`CellRef::to_bits`]
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            partition: PartitionHandle((bits >> 48) as u16),
            index: ((bits >> 24) & 0x00FF_FFFF) as u32,
            generation: (bits & 0x00FF_FFFF) as u32,
        }
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}@{}",
            self.partition, self.index, self.generation
        )
    }
}

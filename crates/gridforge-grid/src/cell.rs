//! Cell data and its occupancy/blocking state machine.
//!
//! Occupancy and blocking are independent axes. Blocking has two sources:
//! the manual `BLOCKED` flag (idempotent on/off) and a reference count held by
//! blockers, so overlapping blockers can be removed independently without
//! clearing a cell another blocker still covers.

use bitflags::bitflags;
use gridforge_core::{CellCoord, CellRef, PartitionHandle, Vector3d};

bitflags! {
    /// Per-cell state bits.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CellFlags: u8 {
        /// An entity has been placed in the cell.
        const OCCUPIED = 1 << 0;
        /// The cell was marked impassable directly, not through a blocker.
        const BLOCKED = 1 << 1;
    }
}

/// Observable state of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellState {
    /// Neither occupied nor blocked.
    Empty,
    /// Occupied, not blocked.
    Occupied,
    /// Blocked, not occupied.
    Blocked,
    /// Both occupied and blocked.
    OccupiedBlocked,
}

impl Default for CellState {
    fn default() -> Self {
        Self::Empty
    }
}

/// One partition unit.
#[derive(Clone, Debug)]
pub struct Cell {
    coord: CellCoord,
    position: Vector3d,
    partition: PartitionHandle,
    index: u32,
    generation: u32,
    flags: CellFlags,
    blocker_count: u16,
}

impl Cell {
    pub(crate) const fn new(
        coord: CellCoord,
        position: Vector3d,
        partition: PartitionHandle,
        index: u32,
        generation: u32,
    ) -> Self {
        Self {
            coord,
            position,
            partition,
            index,
            generation,
            flags: CellFlags::empty(),
            blocker_count: 0,
        }
    }

    /// Local coordinates inside the owning partition
    #[inline]
    pub const fn coord(&self) -> CellCoord {
        self.coord
    }

    /// World-space center of the cell
    #[inline]
    pub const fn world_position(&self) -> Vector3d {
        self.position
    }

    /// Owning partition
    #[inline]
    pub const fn partition(&self) -> PartitionHandle {
        self.partition
    }

    /// Linear index in the owning partition
    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the partition slot this cell was created in
    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    /// Generation-checked handle to this cell
    #[inline]
    pub const fn cell_ref(&self) -> CellRef {
        CellRef::new(self.partition, self.index, self.generation)
    }

    /// Raw state bits
    #[inline]
    pub const fn flags(&self) -> CellFlags {
        self.flags
    }

    /// True while an occupant is registered on the cell.
    #[inline]
    pub const fn is_occupied(&self) -> bool {
        self.flags.contains(CellFlags::OCCUPIED)
    }

    /// True if blocked manually or by at least one blocker.
    #[inline]
    pub const fn is_blocked(&self) -> bool {
        self.flags.contains(CellFlags::BLOCKED) || self.blocker_count > 0
    }

    /// Number of applied blockers covering this cell
    #[inline]
    pub const fn blocker_count(&self) -> u16 {
        self.blocker_count
    }

    /// Neither blocked nor occupied.
    #[inline]
    pub const fn is_walkable(&self) -> bool {
        !self.is_blocked() && !self.is_occupied()
    }

    /// Combined observable state.
    pub const fn state(&self) -> CellState {
        match (self.is_occupied(), self.is_blocked()) {
            (false, false) => CellState::Empty,
            (true, false) => CellState::Occupied,
            (false, true) => CellState::Blocked,
            (true, true) => CellState::OccupiedBlocked,
        }
    }

    /// Set the occupied flag. Returns true if it changed.
    pub(crate) fn set_occupied(&mut self, occupied: bool) -> bool {
        if self.is_occupied() == occupied {
            return false;
        }
        self.flags.set(CellFlags::OCCUPIED, occupied);
        true
    }

    /// Set the manual blocked flag. Returns true if [`Cell::is_blocked`] changed.
    pub(crate) fn set_blocked(&mut self, blocked: bool) -> bool {
        let before = self.is_blocked();
        self.flags.set(CellFlags::BLOCKED, blocked);
        before != self.is_blocked()
    }

    /// Count one more blocker. Returns true if the cell became blocked.
    pub(crate) fn add_blocker(&mut self) -> bool {
        let before = self.is_blocked();
        self.blocker_count = self.blocker_count.saturating_add(1);
        !before
    }

    /// Release one blocker. Returns true if the cell became unblocked.
    ///
    /// Saturates at zero.
    pub(crate) fn remove_blocker(&mut self) -> bool {
        let before = self.is_blocked();
        self.blocker_count = self.blocker_count.saturating_sub(1);
        before && !self.is_blocked()
    }
}

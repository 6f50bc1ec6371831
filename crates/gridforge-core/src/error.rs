//! Error types for the grid world.

use thiserror::Error;

use crate::coords::CellCoord;
use crate::fixed::Fixed64;
use crate::handle::{CellRef, PartitionHandle};
use crate::vector::Vector3d;

/// Grid-wide error type.
///
/// Nothing here is fatal: every failure is local and leaves prior state
/// unmodified.
#[derive(Error, Debug)]
pub enum GridError {
    /// The world has not been set up yet (or was reset).
    #[error("grid world is not set up")]
    NotInitialized,

    /// `setup` was called on a world that is already active.
    #[error("grid world is already set up")]
    AlreadyInitialized,

    /// Cell size must be strictly positive.
    #[error("cell size must be positive, got {0}")]
    InvalidCellSize(Fixed64),

    /// Spatial hash bucket size must be strictly positive.
    #[error("spatial hash cell size must be positive, got {0}")]
    InvalidSpatialHashSize(i32),

    /// Bounds with `max < min` on some axis.
    #[error("invalid bounds: max {max} is below min {min} on some axis")]
    InvalidBounds { min: Vector3d, max: Vector3d },

    /// No partition is registered under this handle.
    #[error("unknown partition handle {0}")]
    UnknownHandle(PartitionHandle),

    /// No partition contains the position. Expected for queries outside any grid.
    #[error("no partition contains {0}")]
    NotFound(Vector3d),

    /// The cell reference was captured from a partition that has since been removed.
    #[error("stale cell reference {cell}: current generation is {current}")]
    StaleGeneration { cell: CellRef, current: u32 },

    /// Local coordinates outside the partition.
    #[error("cell {0} is out of bounds")]
    OutOfBounds(CellCoord),

    /// Registration would exceed a fixed capacity (cells per partition or partition count).
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GridError {
    /// True for outcomes that callers treat as "nothing there" rather than a failure.
    #[inline]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// True if the caller must re-resolve its cell reference.
    #[inline]
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::StaleGeneration { .. })
    }
}

/// Result type alias using our error type.
pub type Result<T> = std::result::Result<T, GridError>;

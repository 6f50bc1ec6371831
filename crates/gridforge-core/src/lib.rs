//! Core types for the GridForge spatial partitioning engine.
//!
//! This crate provides the foundational types shared by the grid world:
//! - Deterministic Q32.32 fixed-point scalars and vectors
//! - Bounding volumes
//! - Coordinate systems (world, local cell, spatial-hash bucket)
//! - Generation-checked value handles
//! - The common error type

pub mod bounds;
pub mod coords;
pub mod error;
pub mod fixed;
pub mod handle;
pub mod vector;

pub use bounds::BoundingArea;
pub use coords::{CellCoord, SpatialKey};
pub use error::{GridError, Result};
pub use fixed::Fixed64;
pub use handle::{CellRef, PartitionHandle};
pub use vector::Vector3d;

/// Engine-wide constants
pub mod constants {
    use crate::fixed::Fixed64;

    /// Cell edge length used when the host does not pick one
    pub const DEFAULT_CELL_SIZE: Fixed64 = Fixed64::ONE;
    /// Spatial hash bucket edge length in world units
    pub const DEFAULT_SPATIAL_HASH_CELL_SIZE: i32 = 50;
    /// Scan cell edge length (in cells) substituted for non-positive requests
    pub const DEFAULT_SCAN_CELL_SIZE: i32 = 8;
    /// Upper bound on cells per partition (cell indices pack into 24 bits)
    pub const MAX_CELLS_PER_PARTITION: usize = 1 << 22;
    /// Upper bound on spatial hash buckets a single partition may span
    pub const MAX_HASH_BUCKETS_PER_PARTITION: u64 = 1 << 20;
    /// Upper bound on live partitions (handles are 16 bits)
    pub const MAX_PARTITIONS: usize = u16::MAX as usize;
    /// Extra steps a line trace may take beyond the manhattan distance
    pub const TRACE_STEP_SLACK: u32 = 3;
}

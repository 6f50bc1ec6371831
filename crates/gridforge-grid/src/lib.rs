//! Spatial partitioning for GridForge.
//!
//! A [`GridWorld`] owns a set of independently registered, bounded 3D grids
//! ([`Partition`]s) and resolves world positions to cells through a coarse
//! spatial hash. On top of that resolution primitive sit:
//! - [`Blocker`]s, which mark the cells a region covers as impassable
//! - the line tracer ([`trace_line`]), which enumerates the cells a segment
//!   passes through across partitions
//! - [`ConfigurationSet`], the persisted list of partitions to register
//!
//! All coordinate math is fixed point, so results are identical on every
//! platform given identical inputs.

pub mod blocker;
pub mod cell;
pub mod config;
pub mod partition;
mod spatial_hash;
pub mod tracer;
pub mod world;

pub use blocker::{Blocker, BlockerKind};
pub use cell::{Cell, CellFlags, CellState};
pub use config::{ConfigurationSet, GridConfiguration};
pub use partition::Partition;
pub use tracer::{line_of_sight, trace_cells, trace_line, trace_lines_par, CoveredCells, GridTrace};
pub use world::{GridWorld, WorldConfig};

pub use gridforge_core::{
    BoundingArea, CellCoord, CellRef, Fixed64, GridError, PartitionHandle, Result, Vector3d,
};

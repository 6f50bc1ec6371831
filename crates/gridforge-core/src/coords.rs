//! Integer coordinate systems: local cell coordinates and spatial-hash keys.

use std::fmt;
use std::ops::{Add, Sub};

use bytemuck::{Pod, Zeroable};
use glam::IVec3;
use serde::{Deserialize, Serialize};

use crate::vector::Vector3d;

/// Integer coordinates of a cell inside a partition.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize,
)]
#[repr(C)]
pub struct CellCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl CellCoord {
    /// Origin cell
    pub const ZERO: Self = Self::new(0, 0, 0);

    /// Create a new cell coordinate
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Component by axis index (0 = x, 1 = y, anything else = z).
    #[inline]
    pub const fn axis(self, axis: usize) -> i32 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    /// Copy with one axis replaced.
    #[inline]
    pub const fn with_axis(mut self, axis: usize, value: i32) -> Self {
        match axis {
            0 => self.x = value,
            1 => self.y = value,
            _ => self.z = value,
        }
        self
    }

    /// Sum of absolute per-axis differences.
    #[inline]
    pub const fn manhattan_distance(self, other: Self) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y) + self.z.abs_diff(other.z)
    }

    /// Convert to glam IVec3
    #[inline]
    pub const fn to_ivec3(self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z)
    }
}

impl From<IVec3> for CellCoord {
    fn from(v: IVec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl Add for CellCoord {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(
            self.x.wrapping_add(rhs.x),
            self.y.wrapping_add(rhs.y),
            self.z.wrapping_add(rhs.z),
        )
    }
}

impl Sub for CellCoord {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(
            self.x.wrapping_sub(rhs.x),
            self.y.wrapping_sub(rhs.y),
            self.z.wrapping_sub(rhs.z),
        )
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.x, self.y, self.z)
    }
}

/// Bucket coordinate in the coarse spatial hash.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpatialKey {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl SpatialKey {
    /// Create a new key
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Bucket containing `pos` for a hash of `bucket_size` world units.
    ///
    /// `floor(floor(p) / s)` equals `floor(p / s)` for a positive integer `s`,
    /// so this stays in integer arithmetic.
    #[inline]
    pub const fn from_position(pos: Vector3d, bucket_size: i32) -> Self {
        Self::new(
            pos.x.floor_to_int().div_euclid(bucket_size),
            pos.y.floor_to_int().div_euclid(bucket_size),
            pos.z.floor_to_int().div_euclid(bucket_size),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manhattan_distance() {
        let a = CellCoord::new(0, 0, 0);
        let b = CellCoord::new(3, -2, 5);
        assert_eq!(a.manhattan_distance(b), 10);
        assert_eq!(b.manhattan_distance(a), 10);
    }

    #[test]
    fn with_axis_replaces_single_component() {
        let c = CellCoord::new(1, 2, 3);
        assert_eq!(c.with_axis(0, 9), CellCoord::new(9, 2, 3));
        assert_eq!(c.with_axis(1, 9), CellCoord::new(1, 9, 3));
        assert_eq!(c.with_axis(2, 9), CellCoord::new(1, 2, 9));
    }

    #[test]
    fn spatial_key_floors_negative_positions() {
        let key = SpatialKey::from_position(Vector3d::from_f64(-0.5, 49.9, 50.0), 50);
        assert_eq!(key, SpatialKey::new(-1, 0, 1));
    }
}

//! Axis-aligned bounding volumes in world space.

use serde::{Deserialize, Serialize};

use crate::fixed::Fixed64;
use crate::vector::Vector3d;

/// Axis-aligned bounding box with inclusive corners.
///
/// Construction does not reorder the corners: a box with `max < min` on some
/// axis is representable so that registration can reject it with a typed
/// error instead of silently fixing it up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingArea {
    /// Minimum corner
    pub min: Vector3d,
    /// Maximum corner
    pub max: Vector3d,
}

impl BoundingArea {
    /// Create a new box from min and max corners
    #[inline]
    pub const fn new(min: Vector3d, max: Vector3d) -> Self {
        Self { min, max }
    }

    /// Create a box spanning two arbitrary corners, ordering them per axis.
    #[inline]
    pub fn from_corners(a: Vector3d, b: Vector3d) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// True if `max >= min` on every axis.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.max.all_ge(self.min)
    }

    /// Size of the box per axis
    #[inline]
    pub fn size(&self) -> Vector3d {
        self.max - self.min
    }

    /// Center of the box
    #[inline]
    pub fn center(&self) -> Vector3d {
        (self.min + self.max) * Fixed64::HALF
    }

    /// Check if a point is inside the box (faces included)
    #[inline]
    pub fn contains(&self, point: Vector3d) -> bool {
        point.all_ge(self.min) && self.max.all_ge(point)
    }

    /// Check if this box touches or overlaps another
    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Overlapping region of two boxes, if any.
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        self.intersects(other).then(|| Self {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        })
    }

    /// Smallest box containing both
    #[inline]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

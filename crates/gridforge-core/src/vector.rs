//! Fixed-point 3D vector.

use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::fixed::Fixed64;

/// World-space position or offset in fixed-point precision.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize,
)]
#[repr(C)]
pub struct Vector3d {
    pub x: Fixed64,
    pub y: Fixed64,
    pub z: Fixed64,
}

impl Vector3d {
    /// All components zero
    pub const ZERO: Self = Self::splat(Fixed64::ZERO);
    /// All components one
    pub const ONE: Self = Self::splat(Fixed64::ONE);

    /// Create a new vector
    #[inline]
    pub const fn new(x: Fixed64, y: Fixed64, z: Fixed64) -> Self {
        Self { x, y, z }
    }

    /// Create a vector with all components set to `v`
    #[inline]
    pub const fn splat(v: Fixed64) -> Self {
        Self { x: v, y: v, z: v }
    }

    /// Create from integer components
    #[inline]
    pub const fn from_ints(x: i32, y: i32, z: i32) -> Self {
        Self::new(Fixed64::from_int(x), Fixed64::from_int(y), Fixed64::from_int(z))
    }

    /// Create from float components (host boundary only)
    #[inline]
    pub fn from_f64(x: f64, y: f64, z: f64) -> Self {
        Self::new(Fixed64::from_f64(x), Fixed64::from_f64(y), Fixed64::from_f64(z))
    }

    /// Component by axis index (0 = x, 1 = y, anything else = z).
    #[inline]
    pub const fn axis(self, axis: usize) -> Fixed64 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    /// Components as an array
    #[inline]
    pub const fn to_array(self) -> [Fixed64; 3] {
        [self.x, self.y, self.z]
    }

    /// Component-wise minimum
    #[inline]
    pub fn min(self, other: Self) -> Self {
        Self::new(
            self.x.min(other.x),
            self.y.min(other.y),
            self.z.min(other.z),
        )
    }

    /// Component-wise maximum
    #[inline]
    pub fn max(self, other: Self) -> Self {
        Self::new(
            self.x.max(other.x),
            self.y.max(other.y),
            self.z.max(other.z),
        )
    }

    /// Component-wise floor
    #[inline]
    pub const fn floor(self) -> Self {
        Self::new(self.x.floor(), self.y.floor(), self.z.floor())
    }

    /// Component-wise absolute value
    #[inline]
    pub const fn abs(self) -> Self {
        Self::new(self.x.abs(), self.y.abs(), self.z.abs())
    }

    /// True if every component of `self` is >= the matching one of `other`.
    #[inline]
    pub fn all_ge(self, other: Self) -> bool {
        self.x >= other.x && self.y >= other.y && self.z >= other.z
    }

    /// Convert to glam Vec3 (lossy)
    #[inline]
    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(
            self.x.to_f64() as f32,
            self.y.to_f64() as f32,
            self.z.to_f64() as f32,
        )
    }
}

impl From<Vec3> for Vector3d {
    fn from(v: Vec3) -> Self {
        Self::from_f64(f64::from(v.x), f64::from(v.y), f64::from(v.z))
    }
}

impl Add for Vector3d {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vector3d {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Vector3d {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl SubAssign for Vector3d {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Mul<Fixed64> for Vector3d {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Fixed64) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Div<Fixed64> for Vector3d {
    type Output = Self;

    #[inline]
    fn div(self, rhs: Fixed64) -> Self {
        Self::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl Neg for Vector3d {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl fmt::Display for Vector3d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

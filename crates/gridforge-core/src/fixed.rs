//! Deterministic fixed-point scalar.
//!
//! All world-space arithmetic in GridForge runs on [`Fixed64`], a signed
//! Q32.32 number. Multiplication and division widen to `i128`, so the same
//! inputs give bit-identical results on every host. Floating point only
//! appears at the host boundary ([`Fixed64::from_f64`], [`Fixed64::to_f64`]).

use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Signed Q32.32 fixed-point number.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Pod,
    Zeroable,
    Serialize,
    Deserialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Fixed64(i64);

impl Fixed64 {
    /// Number of fractional bits.
    pub const FRACTION_BITS: u32 = 32;

    const ONE_RAW: i64 = 1 << Self::FRACTION_BITS;
    const FRACTION_MASK: i64 = Self::ONE_RAW - 1;

    /// Zero
    pub const ZERO: Self = Self(0);
    /// One
    pub const ONE: Self = Self(Self::ONE_RAW);
    /// One half
    pub const HALF: Self = Self(Self::ONE_RAW >> 1);
    /// Smallest representable positive step.
    pub const EPSILON: Self = Self(1);
    /// Largest representable value.
    pub const MAX: Self = Self(i64::MAX);
    /// Smallest representable value.
    pub const MIN: Self = Self(i64::MIN);

    /// Create from the raw Q32.32 bit pattern.
    #[inline]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw Q32.32 bit pattern.
    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Create from an integer.
    #[inline]
    pub const fn from_int(value: i32) -> Self {
        Self((value as i64) << Self::FRACTION_BITS)
    }

    /// Convert from a float, rounding to the nearest representable value.
    ///
    /// Only meant for host input; out-of-range values saturate.
    #[inline]
    pub fn from_f64(value: f64) -> Self {
        Self((value * Self::ONE_RAW as f64).round() as i64)
    }

    /// Convert to a float for display or host output.
    #[inline]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::ONE_RAW as f64
    }

    /// Largest integer value not greater than `self`.
    #[inline]
    pub const fn floor(self) -> Self {
        Self(self.0 & !Self::FRACTION_MASK)
    }

    /// Smallest integer value not less than `self`.
    #[inline]
    pub const fn ceil(self) -> Self {
        if self.0 & Self::FRACTION_MASK == 0 {
            self
        } else {
            Self((self.0 & !Self::FRACTION_MASK).saturating_add(Self::ONE_RAW))
        }
    }

    /// Floor as an integer. The arithmetic shift floors negative values too.
    #[inline]
    pub const fn floor_to_int(self) -> i32 {
        (self.0 >> Self::FRACTION_BITS) as i32
    }

    /// True if the value has no fractional part.
    #[inline]
    pub const fn is_integer(self) -> bool {
        self.0 & Self::FRACTION_MASK == 0
    }

    /// Absolute value, saturating at [`Fixed64::MAX`].
    #[inline]
    pub const fn abs(self) -> Self {
        Self(self.0.saturating_abs())
    }

    /// -1, 0 or 1 depending on the sign.
    #[inline]
    pub const fn signum(self) -> i32 {
        self.0.signum() as i32
    }

    /// True if the value is strictly negative.
    #[inline]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// True if the value is strictly positive.
    #[inline]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Division that returns `None` on a zero divisor or overflow.
    pub fn checked_div(self, rhs: Self) -> Option<Self> {
        if rhs.0 == 0 {
            return None;
        }
        let quotient = (i128::from(self.0) << Self::FRACTION_BITS) / i128::from(rhs.0);
        i64::try_from(quotient).ok().map(Self)
    }

    /// Division that clamps to [`Fixed64::MIN`]/[`Fixed64::MAX`] instead of
    /// failing. Dividing by zero yields the limit matching the dividend's sign.
    pub fn saturating_div(self, rhs: Self) -> Self {
        if rhs.0 == 0 {
            return if self.0 < 0 { Self::MIN } else { Self::MAX };
        }
        let quotient = (i128::from(self.0) << Self::FRACTION_BITS) / i128::from(rhs.0);
        Self(clamp_i128(quotient))
    }
}

#[inline]
fn clamp_i128(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

impl From<i32> for Fixed64 {
    #[inline]
    fn from(value: i32) -> Self {
        Self::from_int(value)
    }
}

impl Add for Fixed64 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Fixed64 {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Fixed64 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for Fixed64 {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Mul for Fixed64 {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        let product = (i128::from(self.0) * i128::from(rhs.0)) >> Self::FRACTION_BITS;
        Self(clamp_i128(product))
    }
}

impl Mul<i32> for Fixed64 {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: i32) -> Self {
        Self(clamp_i128(i128::from(self.0) * i128::from(rhs)))
    }
}

impl Div for Fixed64 {
    type Output = Self;

    /// Saturating division, see [`Fixed64::saturating_div`].
    #[inline]
    fn div(self, rhs: Self) -> Self {
        self.saturating_div(rhs)
    }
}

impl Neg for Fixed64 {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self(self.0.saturating_neg())
    }
}

impl fmt::Display for Fixed64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_f64())
    }
}

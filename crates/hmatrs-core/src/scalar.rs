//! Scalar trait shared by all dense and low-rank algebra.

use num_complex::{Complex32, Complex64};
use num_traits::{Float, NumAssign, One, Zero};
use std::fmt::Debug;
use std::ops::Neg;

/// Trait for scalar types used by the engine.
///
/// Implemented for `f32`, `f64`, `Complex32` and `Complex64`. The absolute
/// value and squared modulus are always reported as `f64` so that pivot
/// comparisons and norm accumulations are precision-independent.
pub trait Scalar:
    Copy
    + Clone
    + Debug
    + PartialEq
    + Zero
    + One
    + NumAssign
    + Neg<Output = Self>
    + bytemuck::Pod
    + Send
    + Sync
    + 'static
{
    /// Complex conjugate (identity for real types).
    fn conj(self) -> Self;

    /// Modulus |x|.
    fn abs(self) -> f64;

    /// Squared modulus |x|^2.
    fn abs_sq(self) -> f64;

    /// Principal square root.
    fn sqrt(self) -> Self;

    /// Multiplicative inverse.
    fn inv(self) -> Self;

    /// Embed a real value.
    fn from_real(r: f64) -> Self;

    /// Real part.
    fn real_part(self) -> f64;

    /// True if any component is NaN.
    fn is_nan(self) -> bool;

    /// True for complex scalar types.
    fn is_complex() -> bool;
}

impl Scalar for f64 {
    fn conj(self) -> Self {
        self
    }

    fn abs(self) -> f64 {
        Float::abs(self)
    }

    fn abs_sq(self) -> f64 {
        self * self
    }

    fn sqrt(self) -> Self {
        Float::sqrt(self)
    }

    fn inv(self) -> Self {
        1.0 / self
    }

    fn from_real(r: f64) -> Self {
        r
    }

    fn real_part(self) -> f64 {
        self
    }

    fn is_nan(self) -> bool {
        Float::is_nan(self)
    }

    fn is_complex() -> bool {
        false
    }
}

impl Scalar for f32 {
    fn conj(self) -> Self {
        self
    }

    fn abs(self) -> f64 {
        Float::abs(self) as f64
    }

    fn abs_sq(self) -> f64 {
        (self * self) as f64
    }

    fn sqrt(self) -> Self {
        Float::sqrt(self)
    }

    fn inv(self) -> Self {
        1.0 / self
    }

    fn from_real(r: f64) -> Self {
        r as f32
    }

    fn real_part(self) -> f64 {
        self as f64
    }

    fn is_nan(self) -> bool {
        Float::is_nan(self)
    }

    fn is_complex() -> bool {
        false
    }
}

impl Scalar for Complex64 {
    fn conj(self) -> Self {
        Complex64::conj(&self)
    }

    fn abs(self) -> f64 {
        self.norm()
    }

    fn abs_sq(self) -> f64 {
        self.norm_sqr()
    }

    fn sqrt(self) -> Self {
        self.sqrt()
    }

    fn inv(self) -> Self {
        Self::one() / self
    }

    fn from_real(r: f64) -> Self {
        Complex64::new(r, 0.0)
    }

    fn real_part(self) -> f64 {
        self.re
    }

    fn is_nan(self) -> bool {
        self.re.is_nan() || self.im.is_nan()
    }

    fn is_complex() -> bool {
        true
    }
}

impl Scalar for Complex32 {
    fn conj(self) -> Self {
        Complex32::conj(&self)
    }

    fn abs(self) -> f64 {
        self.norm() as f64
    }

    fn abs_sq(self) -> f64 {
        self.norm_sqr() as f64
    }

    fn sqrt(self) -> Self {
        self.sqrt()
    }

    fn inv(self) -> Self {
        Self::one() / self
    }

    fn from_real(r: f64) -> Self {
        Complex32::new(r as f32, 0.0)
    }

    fn real_part(self) -> f64 {
        self.re as f64
    }

    fn is_nan(self) -> bool {
        self.re.is_nan() || self.im.is_nan()
    }

    fn is_complex() -> bool {
        true
    }
}

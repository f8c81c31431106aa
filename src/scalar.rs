//! The [`Scalar`] trait for writing AD-generic numeric code.
//!
//! A parameterization written as `fn apply<T: Scalar>(theta: &[T], v: &[T]) -> Vec<T>`
//! runs unchanged on plain `f64` (forward application), on `Dual<f64>`
//! (Jacobian-vector products) and on `Reverse<f64>` (vector-Jacobian products).

use std::fmt::{Debug, Display};
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

use crate::float::Float;
use crate::tape::TapeThreadLocal;

/// The central trait for AD-generic numeric code.
///
/// Only the operations differentiable parameterizations actually need are
/// exposed. Nonsmooth operations (`abs`, `max`, `min`) are supported, but a
/// reverse-mode recording that evaluates them exactly at a kink is flagged as
/// non-differentiable.
pub trait Scalar:
    Copy
    + Debug
    + Display
    + Default
    + Send
    + PartialEq
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + 'static
{
    /// The underlying primitive float type.
    type Float: Float;

    /// Lift a plain float to this scalar (constant, zero derivative).
    fn from_f(val: Self::Float) -> Self;

    /// Extract the primal value.
    fn value(&self) -> Self::Float;

    /// Lift an `f64` literal, rounded to the working precision.
    #[inline]
    fn from_lit(v: f64) -> Self {
        Self::from_f(<Self::Float as Float>::lit(v))
    }

    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn tanh(self) -> Self;
    fn sqrt(self) -> Self;
    fn powi(self, n: i32) -> Self;
    fn recip(self) -> Self;
    fn abs(self) -> Self;
    fn max(self, other: Self) -> Self;
    fn min(self, other: Self) -> Self;
}

macro_rules! impl_scalar_primitive {
    ($f:ty) => {
        impl Scalar for $f {
            type Float = $f;

            #[inline]
            fn from_f(val: $f) -> Self {
                val
            }

            #[inline]
            fn value(&self) -> $f {
                *self
            }

            #[inline]
            fn exp(self) -> Self {
                <$f>::exp(self)
            }

            #[inline]
            fn ln(self) -> Self {
                <$f>::ln(self)
            }

            #[inline]
            fn sin(self) -> Self {
                <$f>::sin(self)
            }

            #[inline]
            fn cos(self) -> Self {
                <$f>::cos(self)
            }

            #[inline]
            fn tanh(self) -> Self {
                <$f>::tanh(self)
            }

            #[inline]
            fn sqrt(self) -> Self {
                <$f>::sqrt(self)
            }

            #[inline]
            fn powi(self, n: i32) -> Self {
                <$f>::powi(self, n)
            }

            #[inline]
            fn recip(self) -> Self {
                <$f>::recip(self)
            }

            #[inline]
            fn abs(self) -> Self {
                <$f>::abs(self)
            }

            #[inline]
            fn max(self, other: Self) -> Self {
                <$f>::max(self, other)
            }

            #[inline]
            fn min(self, other: Self) -> Self {
                <$f>::min(self, other)
            }
        }
    };
}

impl_scalar_primitive!(f32);
impl_scalar_primitive!(f64);

/// The working precision of code that both evaluates and differentiates:
/// a primitive float that is also its own [`Scalar`] and owns a thread-local
/// reverse-mode tape.
///
/// Implemented for `f32` and `f64`.
pub trait Real: Float + TapeThreadLocal + Scalar<Float = Self> {}

impl<F> Real for F where F: Float + TapeThreadLocal + Scalar<Float = F> {}


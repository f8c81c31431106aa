use std::fmt::{Debug, Display};

use num_traits::{Float as NumFloat, FromPrimitive, ToPrimitive};

/// Marker trait for the primitive floating-point types (`f32`, `f64`) that
/// carry primal values and derivatives.
///
/// AD wrapper types do not implement this; they implement [`crate::Scalar`].
pub trait Float:
    NumFloat + FromPrimitive + ToPrimitive + Copy + Send + Sync + Default + Debug + Display + 'static
{
    /// Convert an `f64` literal into this precision.
    fn lit(v: f64) -> Self;

    /// Widen to `f64` for diagnostics. Non-representable values map to NaN.
    #[inline]
    fn as_f64(self) -> f64 {
        self.to_f64().unwrap_or(f64::NAN)
    }
}

impl Float for f32 {
    #[inline]
    fn lit(v: f64) -> Self {
        v as f32
    }
}

impl Float for f64 {
    #[inline]
    fn lit(v: f64) -> Self {
        v
    }
}

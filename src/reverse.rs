use std::fmt::{self, Display};

use crate::tape::CONSTANT;
use crate::Float;

/// Reverse-mode AD variable.
///
/// A value plus its node index on the thread-local tape. `Copy` because the
/// tape lives in a thread-local, not inside this struct. Constants carry the
/// [`CONSTANT`] index and never touch the tape.
#[derive(Clone, Copy, Debug)]
pub struct Reverse<F: Float> {
    pub(crate) value: F,
    pub(crate) index: u32,
}

impl<F: Float> Reverse<F> {
    /// Create a constant (not tracked on tape).
    #[inline]
    pub fn constant(value: F) -> Self {
        Reverse {
            value,
            index: CONSTANT,
        }
    }

    /// Create a reverse variable from a tape allocation.
    #[inline]
    pub fn from_tape(value: F, index: u32) -> Self {
        Reverse { value, index }
    }

    /// Tape index, or [`CONSTANT`].
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// True if this value does not depend on any tape input.
    #[inline]
    pub fn is_constant(&self) -> bool {
        self.index == CONSTANT
    }
}

impl<F: Float> Display for Reverse<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<F: Float> Default for Reverse<F> {
    fn default() -> Self {
        Reverse::constant(F::zero())
    }
}

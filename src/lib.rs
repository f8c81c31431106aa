//! Minimal forward- and reverse-mode automatic differentiation.
//!
//! Functions are written once against the AD-generic [`Scalar`] trait and
//! differentiated with [`grad`] / [`vjp`] (reverse mode, thread-local tape) or
//! [`jvp`] (forward mode, dual numbers). Reverse-mode recordings that pass
//! through a kink or produce a non-finite partial are rejected with an
//! [`AdError`] instead of returning a meaningless derivative.

pub mod api;
pub mod dual;
pub mod error;
pub mod float;
pub mod reverse;
pub mod scalar;
pub mod tape;
mod traits;

pub use api::{grad, jvp, vjp};
pub use dual::Dual;
pub use error::AdError;
pub use float::Float;
pub use reverse::Reverse;
pub use scalar::{Real, Scalar};

/// Type alias for forward-mode dual numbers over `f64`.
pub type Dual64 = Dual<f64>;
/// Type alias for reverse-mode variables over `f64`.
pub type Reverse64 = Reverse<f64>;

//! Solve configuration and the small vector kernels shared by the solvers.

use adjoint::Float;

use crate::error::{ImplicitError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Convergence tolerance and iteration budget for one linear solve.
///
/// The same parameters drive the forward solve and the adjoint solve, so an
/// adjoint is never solved more loosely than the primal it differentiates.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolveParams<F> {
    /// Absolute residual tolerance: success requires `||A x - b|| <= tol`.
    pub tol: F,
    /// Maximum number of matrix-vector products spent on the iteration.
    #[cfg_attr(feature = "serde", serde(default = "default_max_iters"))]
    pub max_iters: usize,
}

#[cfg(feature = "serde")]
fn default_max_iters() -> usize {
    1000
}

impl Default for SolveParams<f64> {
    fn default() -> Self {
        SolveParams {
            tol: 1e-10,
            max_iters: 1000,
        }
    }
}

impl Default for SolveParams<f32> {
    fn default() -> Self {
        SolveParams {
            tol: 1e-5,
            max_iters: 1000,
        }
    }
}

impl<F: Float> SolveParams<F> {
    pub fn new(tol: F, max_iters: usize) -> Self {
        SolveParams { tol, max_iters }
    }

    /// Reject non-positive or non-finite tolerances and an empty budget.
    pub fn validate(&self) -> Result<()> {
        if !(self.tol.is_finite() && self.tol > F::zero()) {
            return Err(ImplicitError::InvalidParams {
                reason: format!("tol must be positive and finite, got {}", self.tol),
            });
        }
        if self.max_iters == 0 {
            return Err(ImplicitError::InvalidParams {
                reason: "max_iters must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Which Krylov method performs the forward and adjoint solves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "method", rename_all = "snake_case"))]
pub enum SolverKind {
    /// Conjugate gradient; requires a symmetric positive-definite operator.
    Cg,
    /// BiCGSTAB for general nonsymmetric operators.
    BiCgStab,
    /// Restarted GMRES with the given Krylov subspace dimension.
    Gmres { restart: usize },
}

impl Default for SolverKind {
    fn default() -> Self {
        SolverKind::Gmres { restart: 30 }
    }
}

/// Complete configuration of the implicit backward pass.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BackwardConfig<F> {
    pub params: SolveParams<F>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub solver: SolverKind,
}

impl<F> Default for BackwardConfig<F>
where
    SolveParams<F>: Default,
{
    fn default() -> Self {
        BackwardConfig {
            params: SolveParams::default(),
            solver: SolverKind::default(),
        }
    }
}

/// Compute the L2 norm of a vector.
pub fn norm<F: Float>(v: &[F]) -> F {
    dot(v, v).sqrt()
}

/// Compute the dot product of two vectors.
pub fn dot<F: Float>(a: &[F], b: &[F]) -> F {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .fold(F::zero(), |acc, (&x, &y)| acc + x * y)
}

/// `y <- y + alpha * x`.
pub fn axpy<F: Float>(alpha: F, x: &[F], y: &mut [F]) {
    debug_assert_eq!(x.len(), y.len());
    for (yi, &xi) in y.iter_mut().zip(x.iter()) {
        *yi = *yi + alpha * xi;
    }
}

/// `b - a`, elementwise.
pub(crate) fn residual<F: Float>(b: &[F], ax: &[F]) -> Vec<F> {
    b.iter().zip(ax.iter()).map(|(&bi, &ai)| bi - ai).collect()
}

//! Matrix-free Krylov solvers for `A x = b`.
//!
//! The operator is only ever seen through a `matvec` callback, so each method
//! allocates O(N) vectors (GMRES: O(N·restart)) and never a matrix. All
//! solvers start from `x = 0`, measure convergence on the absolute residual
//! `||b - A x||`, and confirm the true residual before reporting success.

pub mod bicgstab;
pub mod cg;
pub mod gmres;

use adjoint::Float;

use crate::convergence::{norm, residual, SolveParams, SolverKind};
use crate::error::{ImplicitError, Result};

pub use bicgstab::BiCgStab;
pub use cg::ConjugateGradient;
pub use gmres::Gmres;

/// Matrix-free `v ↦ A v`.
pub type MatVec<'a, F> = dyn Fn(&[F]) -> Result<Vec<F>> + 'a;

/// A converged solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome<F> {
    /// Solution `x` with `||A x - b|| <= tol`.
    pub x: Vec<F>,
    /// Matrix-vector products spent inside the iteration.
    pub iterations: usize,
    /// True residual norm `||b - A x||` at `x`.
    pub residual_norm: F,
}

/// An iterative linear solver.
///
/// Implementations must be pure with respect to their inputs: the same
/// `(matvec, rhs, params)` always yields the same outcome, and no state is
/// kept between calls.
pub trait LinearSolver<F: Float> {
    /// Solve `A x = rhs` to `params.tol`, failing with
    /// [`ImplicitError::DidNotConverge`] when `params.max_iters` is exhausted
    /// and [`ImplicitError::SingularOperator`] on breakdown.
    fn solve(&self, matvec: &MatVec<'_, F>, rhs: &[F], params: &SolveParams<F>)
        -> Result<SolveOutcome<F>>;
}

impl<F: Float> LinearSolver<F> for SolverKind {
    fn solve(
        &self,
        matvec: &MatVec<'_, F>,
        rhs: &[F],
        params: &SolveParams<F>,
    ) -> Result<SolveOutcome<F>> {
        match *self {
            SolverKind::Cg => ConjugateGradient.solve(matvec, rhs, params),
            SolverKind::BiCgStab => BiCgStab.solve(matvec, rhs, params),
            SolverKind::Gmres { restart } => Gmres::new(restart).solve(matvec, rhs, params),
        }
    }
}

impl<F: Float, S: LinearSolver<F> + ?Sized> LinearSolver<F> for &S {
    fn solve(
        &self,
        matvec: &MatVec<'_, F>,
        rhs: &[F],
        params: &SolveParams<F>,
    ) -> Result<SolveOutcome<F>> {
        (**self).solve(matvec, rhs, params)
    }
}

/// Apply `matvec` and insist it preserves the dimension.
pub(crate) fn apply<F: Float>(matvec: &MatVec<'_, F>, v: &[F]) -> Result<Vec<F>> {
    let out = matvec(v)?;
    if out.len() != v.len() {
        return Err(ImplicitError::DimensionMismatch {
            what: "matvec output",
            expected: v.len(),
            found: out.len(),
        });
    }
    Ok(out)
}

/// `(b - A x, ||b - A x||)`.
pub(crate) fn true_residual<F: Float>(
    matvec: &MatVec<'_, F>,
    b: &[F],
    x: &[F],
) -> Result<(Vec<F>, F)> {
    let ax = apply(matvec, x)?;
    let r = residual(b, &ax);
    let r_norm = norm(&r);
    Ok((r, r_norm))
}

pub(crate) fn singular<F: Float>(reason: &'static str, iteration: usize, residual: F) -> ImplicitError {
    tracing::warn!(reason, iteration, residual = residual.as_f64(), "krylov breakdown");
    ImplicitError::SingularOperator {
        reason,
        iteration,
        residual: residual.as_f64(),
    }
}

pub(crate) fn not_converged<F: Float>(iterations: usize, residual: F) -> ImplicitError {
    tracing::warn!(iterations, residual = residual.as_f64(), "iteration budget exhausted");
    ImplicitError::DidNotConverge {
        residual: residual.as_f64(),
        iterations,
    }
}

/// Shared entry checks. Returns the trivial solution for a zero right-hand side.
pub(crate) fn prepare<F: Float>(rhs: &[F], params: &SolveParams<F>) -> Result<Option<SolveOutcome<F>>> {
    params.validate()?;
    let b_norm = norm(rhs);
    if !b_norm.is_finite() {
        return Err(ImplicitError::InvalidParams {
            reason: "right-hand side contains non-finite entries".into(),
        });
    }
    if b_norm == F::zero() {
        return Ok(Some(SolveOutcome {
            x: vec![F::zero(); rhs.len()],
            iterations: 0,
            residual_norm: F::zero(),
        }));
    }
    Ok(None)
}

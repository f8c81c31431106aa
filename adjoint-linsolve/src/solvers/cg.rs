use adjoint::Float;

use crate::convergence::{axpy, dot, SolveParams};
use crate::error::Result;

use super::{apply, not_converged, prepare, singular, true_residual, LinearSolver, MatVec, SolveOutcome};

/// Conjugate gradient for symmetric positive-definite operators.
///
/// A vanishing curvature `pᵀ A p` is reported as a singular operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConjugateGradient;

impl<F: Float> LinearSolver<F> for ConjugateGradient {
    fn solve(
        &self,
        matvec: &MatVec<'_, F>,
        rhs: &[F],
        params: &SolveParams<F>,
    ) -> Result<SolveOutcome<F>> {
        if let Some(trivial) = prepare(rhs, params)? {
            return Ok(trivial);
        }
        let n = rhs.len();
        let tol_sq = params.tol * params.tol;

        let mut x = vec![F::zero(); n];
        let mut r = rhs.to_vec();
        let mut p = r.clone();
        let mut rs = dot(&r, &r);

        for k in 1..=params.max_iters {
            let ap = apply(matvec, &p)?;
            let pap = dot(&p, &ap);
            if pap == F::zero() || !pap.is_finite() {
                return Err(singular("zero curvature pᵀAp", k, rs.sqrt()));
            }

            let alpha = rs / pap;
            axpy(alpha, &p, &mut x);
            axpy(-alpha, &ap, &mut r);
            let mut rs_new = dot(&r, &r);
            if !rs_new.is_finite() {
                return Err(singular("non-finite residual", k, rs_new));
            }

            if rs_new <= tol_sq {
                // The recursive residual drifts from b - Ax; restart from the
                // true residual if they disagree.
                let (r_true, r_norm) = true_residual(matvec, rhs, &x)?;
                if r_norm <= params.tol {
                    tracing::debug!(iterations = k, residual = r_norm.as_f64(), "cg converged");
                    return Ok(SolveOutcome {
                        x,
                        iterations: k,
                        residual_norm: r_norm,
                    });
                }
                r = r_true;
                rs_new = r_norm * r_norm;
                p = r.clone();
                rs = rs_new;
                continue;
            }

            let beta = rs_new / rs;
            for (pi, &ri) in p.iter_mut().zip(r.iter()) {
                *pi = ri + beta * *pi;
            }
            rs = rs_new;
        }

        let (_, r_norm) = true_residual(matvec, rhs, &x)?;
        Err(not_converged(params.max_iters, r_norm))
    }
}

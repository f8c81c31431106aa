use adjoint::Float;

use crate::convergence::{axpy, dot, norm, SolveParams};
use crate::error::Result;

use super::{apply, not_converged, prepare, singular, true_residual, LinearSolver, MatVec, SolveOutcome};

/// Stabilized bi-conjugate gradient for general nonsymmetric operators.
///
/// Each iteration costs two matrix-vector products, both counted against the
/// budget. Loss of bi-orthogonality (`r̂ᵀ r = 0` or `r̂ᵀ A p = 0`) and a vanishing
/// stabilization step are reported as a singular operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BiCgStab;

impl<F: Float> LinearSolver<F> for BiCgStab {
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

        let mut x = vec![F::zero(); n];
        let mut r = rhs.to_vec();
        let mut r_hat = r.clone();
        let mut p = vec![F::zero(); n];
        let mut v = vec![F::zero(); n];
        let mut rho = F::one();
        let mut alpha = F::one();
        let mut omega = F::one();
        let mut matvecs = 0;

        while matvecs < params.max_iters {
            let r_norm = norm(&r);
            let rho_new = dot(&r_hat, &r);
            if rho_new == F::zero() || !rho_new.is_finite() {
                return Err(singular("r̂ᵀr vanished", matvecs, r_norm));
            }

            let beta = (rho_new / rho) * (alpha / omega);
            for i in 0..n {
                p[i] = r[i] + beta * (p[i] - omega * v[i]);
            }
            v = apply(matvec, &p)?;
            matvecs += 1;

            let r_hat_v = dot(&r_hat, &v);
            if r_hat_v == F::zero() || !r_hat_v.is_finite() {
                return Err(singular("r̂ᵀAp vanished", matvecs, r_norm));
            }
            alpha = rho_new / r_hat_v;

            let mut s = r.clone();
            axpy(-alpha, &v, &mut s);
            if norm(&s) <= params.tol {
                axpy(alpha, &p, &mut x);
                let (r_true, r_norm) = true_residual(matvec, rhs, &x)?;
                if r_norm <= params.tol {
                    return Ok(done(x, matvecs, r_norm));
                }
                // Recursive residual drifted; restart the shadow space.
                r_hat = r_true.clone();
                r = r_true;
                rho = F::one();
                alpha = F::one();
                omega = F::one();
                p.iter_mut().for_each(|pi| *pi = F::zero());
                v.iter_mut().for_each(|vi| *vi = F::zero());
                continue;
            }
            if matvecs >= params.max_iters {
                axpy(alpha, &p, &mut x);
                break;
            }

            let t = apply(matvec, &s)?;
            matvecs += 1;
            let tt = dot(&t, &t);
            if tt == F::zero() || !tt.is_finite() {
                return Err(singular("As vanished", matvecs, norm(&s)));
            }
            omega = dot(&t, &s) / tt;

            axpy(alpha, &p, &mut x);
            axpy(omega, &s, &mut x);
            r = s;
            axpy(-omega, &t, &mut r);
            rho = rho_new;

            if norm(&r) <= params.tol {
                let (r_true, r_norm) = true_residual(matvec, rhs, &x)?;
                if r_norm <= params.tol {
                    return Ok(done(x, matvecs, r_norm));
                }
                r_hat = r_true.clone();
                r = r_true;
                rho = F::one();
                alpha = F::one();
                omega = F::one();
                p.iter_mut().for_each(|pi| *pi = F::zero());
                v.iter_mut().for_each(|vi| *vi = F::zero());
                continue;
            }
            if omega == F::zero() {
                return Err(singular("stabilization step vanished", matvecs, norm(&r)));
            }
        }

        let (_, r_norm) = true_residual(matvec, rhs, &x)?;
        if r_norm <= params.tol {
            return Ok(done(x, matvecs, r_norm));
        }
        Err(not_converged(matvecs, r_norm))
    }
}

fn done<F: Float>(x: Vec<F>, iterations: usize, residual_norm: F) -> SolveOutcome<F> {
    tracing::debug!(iterations, residual = residual_norm.as_f64(), "bicgstab converged");
    SolveOutcome {
        x,
        iterations,
        residual_norm,
    }
}

use adjoint::Float;

use crate::convergence::{axpy, dot, norm, SolveParams};
use crate::error::{ImplicitError, Result};

use super::{apply, not_converged, prepare, singular, true_residual, LinearSolver, MatVec, SolveOutcome};

/// Restarted GMRES(m) with modified Gram-Schmidt and Givens rotations.
///
/// Works for any nonsingular operator. Memory is `restart + 1` basis vectors
/// of length N plus an `(m+1) × m` Hessenberg matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gmres {
    pub restart: usize,
}

impl Default for Gmres {
    fn default() -> Self {
        Gmres { restart: 30 }
    }
}

impl Gmres {
    pub fn new(restart: usize) -> Self {
        Gmres { restart }
    }
}

/// Givens rotation `(c, s)` that zeroes `b` in `[a, b]`, and the resulting norm.
fn givens<F: Float>(a: F, b: F) -> (F, F, F) {
    let r = a.hypot(b);
    if r == F::zero() {
        (F::one(), F::zero(), F::zero())
    } else {
        (a / r, b / r, r)
    }
}

impl<F: Float> LinearSolver<F> for Gmres {
    fn solve(
        &self,
        matvec: &MatVec<'_, F>,
        rhs: &[F],
        params: &SolveParams<F>,
    ) -> Result<SolveOutcome<F>> {
        if self.restart == 0 {
            return Err(ImplicitError::InvalidParams {
                reason: "gmres restart must be at least 1".into(),
            });
        }
        if let Some(trivial) = prepare(rhs, params)? {
            return Ok(trivial);
        }
        let n = rhs.len();
        let m = self.restart.min(n);

        let mut x = vec![F::zero(); n];
        let mut r = rhs.to_vec();
        let mut beta = norm(&r);
        let mut total = 0;

        loop {
            if beta <= params.tol {
                return Ok(done(x, total, beta));
            }
            if total >= params.max_iters {
                return Err(not_converged(total, beta));
            }

            let mut basis: Vec<Vec<F>> = Vec::with_capacity(m + 1);
            basis.push(r.iter().map(|&ri| ri / beta).collect());
            let mut h = vec![vec![F::zero(); m]; m + 1];
            let mut cs = vec![F::zero(); m];
            let mut sn = vec![F::zero(); m];
            let mut g = vec![F::zero(); m + 1];
            g[0] = beta;

            let mut k = 0;
            let mut invariant = false;
            while k < m && total < params.max_iters {
                let mut w = apply(matvec, &basis[k])?;
                total += 1;

                for (i, vi) in basis.iter().enumerate() {
                    h[i][k] = dot(&w, vi);
                    axpy(-h[i][k], vi, &mut w);
                }
                let h_next = norm(&w);
                h[k + 1][k] = h_next;

                for i in 0..k {
                    let upper = h[i][k];
                    let lower = h[i + 1][k];
                    h[i][k] = cs[i] * upper + sn[i] * lower;
                    h[i + 1][k] = cs[i] * lower - sn[i] * upper;
                }
                let (c, s, diag) = givens(h[k][k], h[k + 1][k]);
                if diag == F::zero() || !diag.is_finite() {
                    return Err(singular("zero Arnoldi pivot", total, g[k].abs()));
                }
                cs[k] = c;
                sn[k] = s;
                h[k][k] = diag;
                h[k + 1][k] = F::zero();
                g[k + 1] = -s * g[k];
                g[k] = c * g[k];
                k += 1;

                if g[k].abs() <= params.tol {
                    break;
                }
                // Krylov space became A-invariant: the projected solution is
                // the best this restart cycle can do.
                if h_next <= F::epsilon() * beta {
                    invariant = true;
                    break;
                }
                basis.push(w.iter().map(|&wi| wi / h_next).collect());
            }

            // Back substitution on the k × k upper-triangular system.
            let mut y = vec![F::zero(); k];
            for i in (0..k).rev() {
                let mut sum = g[i];
                for j in (i + 1)..k {
                    sum = sum - h[i][j] * y[j];
                }
                y[i] = sum / h[i][i];
            }
            for (yi, vi) in y.iter().zip(basis.iter()) {
                axpy(*yi, vi, &mut x);
            }

            let (r_true, r_norm) = true_residual(matvec, rhs, &x)?;
            if !r_norm.is_finite() {
                return Err(singular("non-finite residual", total, r_norm));
            }
            // An invariant cycle solved its projected problem exactly. Rounding
            // can leave the true residual above tol, which the next cycle
            // refines; a cycle that fails to halve the residual means rhs has
            // a component outside the range of A.
            if invariant && r_norm > params.tol && r_norm > beta * F::lit(0.5) {
                return Err(singular("invariant Krylov subspace without progress", total, r_norm));
            }
            r = r_true;
            beta = r_norm;
        }
    }
}

fn done<F: Float>(x: Vec<F>, iterations: usize, residual_norm: F) -> SolveOutcome<F> {
    tracing::debug!(iterations, residual = residual_norm.as_f64(), "gmres converged");
    SolveOutcome {
        x,
        iterations,
        residual_norm,
    }
}

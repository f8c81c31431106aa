//! Implicit differentiation of `x̄ = K(θ)⁻¹ b`.
//!
//! Given the forward solution x̄ and an upstream gradient `g = ∂L/∂x̄`:
//!
//! - `∂L/∂b = y` where `Kᵀ y = g` (the adjoint system), and
//! - `∂L/∂θ = ∂/∂θ ⟨K(θ) x̄, y⟩` with x̄ and y frozen.
//!
//! Neither step differentiates through the iterations of the forward solver,
//! and neither forms `K` or `∂K/∂θ` as a matrix.

use adjoint::Real;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::convergence::{BackwardConfig, SolveParams, SolverKind};
use crate::error::{check_len, ImplicitError, Result};
use crate::operator::{param_count, LinearOperator};
use crate::solvers::LinearSolver;

/// `x̄` with `||K x̄ - b|| <= tol`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardSolution<F> {
    pub x: Vec<F>,
    pub iterations: usize,
    pub residual_norm: F,
}

/// `y = ∂L/∂b` with `||Kᵀ y - g|| <= tol`.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjointSolution<F> {
    pub y: Vec<F>,
    pub iterations: usize,
    pub residual_norm: F,
}

/// `∂L/∂θ`, flattened row-major with the shape of θ.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamGradient<F> {
    pub values: Vec<F>,
    pub shape: Vec<usize>,
}

impl<F: Copy> ParamGradient<F> {
    /// Entry at a multi-index, or `None` if the index is out of bounds or has
    /// the wrong rank.
    pub fn at(&self, index: &[usize]) -> Option<F> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut flat = 0;
        for (&i, &extent) in index.iter().zip(&self.shape) {
            if i >= extent {
                return None;
            }
            flat = flat * extent + i;
        }
        self.values.get(flat).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_vec(self) -> Vec<F> {
        self.values
    }
}

/// Result of one backward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients<F> {
    /// `∂L/∂b`, length N.
    pub grad_b: Vec<F>,
    /// `∂L/∂θ`, shaped like θ.
    pub grad_theta: ParamGradient<F>,
    /// Matrix-vector products spent on the adjoint solve.
    pub adjoint_iterations: usize,
    /// True residual `||Kᵀ grad_b - g||`.
    pub adjoint_residual: F,
}

/// One independent `(K, x̄, g)` triple for [`ImplicitGradientSolver::backward_many`].
#[derive(Debug, Clone, Copy)]
pub struct BackwardRequest<'a, F, O: ?Sized> {
    pub op: &'a O,
    pub x_bar: &'a [F],
    pub g: &'a [F],
}

impl<'a, F, O: ?Sized> BackwardRequest<'a, F, O> {
    pub fn new(op: &'a O, x_bar: &'a [F], g: &'a [F]) -> Self {
        BackwardRequest { op, x_bar, g }
    }
}

/// Implicit gradient engine for matrix-free linear solves.
///
/// The same solver and [`SolveParams`] serve the forward solve and the
/// adjoint solve. The engine holds no state between calls, so one instance
/// can be shared across threads.
///
/// ```
/// use adjoint_linsolve::{
///     DiffusionStencil, ImplicitGradientSolver, MatrixFreeOperator, SolveParams, SolverKind,
/// };
///
/// let op = MatrixFreeOperator::new(DiffusionStencil::new(4), vec![0.0; 4]).unwrap();
/// let engine = ImplicitGradientSolver::new(SolverKind::Cg, SolveParams::new(1e-12, 100));
///
/// let fwd = engine.forward(&op, &[1.0, 0.0, 0.0, 1.0]).unwrap();
/// let grads = engine.backward(&op, &fwd.x, &[0.25; 4]).unwrap();
/// assert_eq!(grads.grad_b.len(), 4);
/// assert_eq!(grads.grad_theta.shape, vec![4]);
/// ```
#[derive(Debug, Clone)]
pub struct ImplicitGradientSolver<F, S = SolverKind> {
    solver: S,
    params: SolveParams<F>,
}

impl<F: Real> ImplicitGradientSolver<F, SolverKind> {
    pub fn from_config(config: BackwardConfig<F>) -> Self {
        ImplicitGradientSolver {
            solver: config.solver,
            params: config.params,
        }
    }
}

impl<F: Real, S: LinearSolver<F>> ImplicitGradientSolver<F, S> {
    pub fn new(solver: S, params: SolveParams<F>) -> Self {
        ImplicitGradientSolver { solver, params }
    }

    pub fn params(&self) -> &SolveParams<F> {
        &self.params
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// Solve `K x̄ = b`.
    #[tracing::instrument(level = "debug", skip_all, fields(n = op.dim()))]
    pub fn forward<O>(&self, op: &O, b: &[F]) -> Result<ForwardSolution<F>>
    where
        O: LinearOperator<F> + ?Sized,
    {
        check_len("right-hand side", op.dim(), b.len())?;
        let out = self
            .solver
            .solve(&|v: &[F]| op.apply(v), b, &self.params)?;
        tracing::debug!(
            iterations = out.iterations,
            residual = out.residual_norm.as_f64(),
            "forward solve converged"
        );
        Ok(ForwardSolution {
            x: out.x,
            iterations: out.iterations,
            residual_norm: out.residual_norm,
        })
    }

    /// Solve the adjoint system `Kᵀ y = g`; `y` is `∂L/∂b`.
    #[tracing::instrument(level = "debug", skip_all, fields(n = op.dim(), path = ?op.transpose_path()))]
    pub fn grad_b<O>(&self, op: &O, g: &[F]) -> Result<AdjointSolution<F>>
    where
        O: LinearOperator<F> + ?Sized,
    {
        check_len("upstream gradient", op.dim(), g.len())?;
        let out = self
            .solver
            .solve(&|v: &[F]| op.apply_transpose(v), g, &self.params)
            .map_err(|err| match err {
                ImplicitError::DidNotConverge {
                    residual,
                    iterations,
                } => ImplicitError::AdjointSolveDidNotConverge {
                    residual,
                    iterations,
                },
                other => other,
            })?;
        tracing::debug!(
            iterations = out.iterations,
            residual = out.residual_norm.as_f64(),
            "adjoint solve converged"
        );
        Ok(AdjointSolution {
            y: out.x,
            iterations: out.iterations,
            residual_norm: out.residual_norm,
        })
    }

    /// `∂/∂θ ⟨K(θ) x̄, y⟩` with x̄ and y frozen. Never touches the solver.
    pub fn grad_theta<O>(&self, op: &O, x_bar: &[F], y: &[F]) -> Result<ParamGradient<F>>
    where
        O: LinearOperator<F> + ?Sized,
    {
        let n = op.dim();
        check_len("forward solution", n, x_bar.len())?;
        check_len("adjoint solution", n, y.len())?;

        let shape = op.param_shape().to_vec();
        let values = op.param_vjp(x_bar, y)?;
        check_len("parameter gradient", param_count(&shape), values.len())?;
        Ok(ParamGradient { values, shape })
    }

    /// `(∂L/∂b, ∂L/∂θ)` for `x̄ = K⁻¹ b` and `g = ∂L/∂x̄`.
    ///
    /// Lengths and solve parameters are validated before any solve runs.
    #[tracing::instrument(level = "debug", skip_all, fields(n = op.dim()))]
    pub fn backward<O>(&self, op: &O, x_bar: &[F], g: &[F]) -> Result<Gradients<F>>
    where
        O: LinearOperator<F> + ?Sized,
    {
        let n = op.dim();
        check_len("forward solution", n, x_bar.len())?;
        check_len("upstream gradient", n, g.len())?;
        self.params.validate()?;

        let adjoint = self.grad_b(op, g)?;
        let grad_theta = self.grad_theta(op, x_bar, &adjoint.y)?;
        Ok(Gradients {
            grad_b: adjoint.y,
            grad_theta,
            adjoint_iterations: adjoint.iterations,
            adjoint_residual: adjoint.residual_norm,
        })
    }

    /// Run [`backward`](Self::backward) over independent requests.
    ///
    /// With the `parallel` feature the requests are distributed over the rayon
    /// pool; results come back in request order either way.
    pub fn backward_many<O>(&self, requests: &[BackwardRequest<'_, F, O>]) -> Vec<Result<Gradients<F>>>
    where
        O: LinearOperator<F> + Sync + ?Sized,
        S: Sync,
    {
        #[cfg(feature = "parallel")]
        {
            requests
                .par_iter()
                .map(|r| self.backward(r.op, r.x_bar, r.g))
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            requests
                .iter()
                .map(|r| self.backward(r.op, r.x_bar, r.g))
                .collect()
        }
    }
}

/// One-shot backward pass with restarted GMRES.
///
/// GMRES assumes nothing about `K` beyond non-singularity, which makes it the
/// safe default when the caller has not picked a method.
pub fn backward<F, O>(op: &O, x_bar: &[F], g: &[F], params: &SolveParams<F>) -> Result<Gradients<F>>
where
    F: Real,
    O: LinearOperator<F> + ?Sized,
{
    ImplicitGradientSolver::new(SolverKind::default(), *params).backward(op, x_bar, g)
}

//! Matrix-free linear operators `K(θ)`.
//!
//! An operator is only ever available through forward application `v ↦ K v`
//! and transpose application `v ↦ Kᵀ v`; no matrix is stored. Operators built
//! from a [`Parameterization`] can additionally differentiate `K(θ) x̄` with
//! respect to θ through the reverse-mode tape of [`adjoint`].

use std::fmt;

use adjoint::{Real, Reverse, Scalar};

use crate::error::{check_len, ImplicitError, Result};

/// How an operator produces `Kᵀ v`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransposePath {
    /// A hand-written adjoint supplied with the operator.
    Explicit,
    /// The vector-Jacobian product of `v ↦ K v`, which equals `Kᵀ w` for
    /// linear `K` regardless of the linearization point.
    Autodiff,
}

/// A square linear map of dimension N, applied matrix-free.
///
/// Implementations hold no mutable state: `apply` and `apply_transpose` may be
/// called repeatedly, in any order, and from several threads at once.
pub trait LinearOperator<F: Real> {
    /// Dimension N (K is N × N).
    fn dim(&self) -> usize;

    /// `K v`. Fails with [`ImplicitError::DimensionMismatch`] if `v.len() != N`.
    fn apply(&self, v: &[F]) -> Result<Vec<F>>;

    /// `Kᵀ v`. Fails with [`ImplicitError::DimensionMismatch`] if `v.len() != N`.
    fn apply_transpose(&self, v: &[F]) -> Result<Vec<F>>;

    /// Which mechanism backs [`apply_transpose`](Self::apply_transpose).
    fn transpose_path(&self) -> TransposePath;

    /// Shape of the parameter tensor θ. Empty means the operator has no
    /// parameters, and [`param_vjp`](Self::param_vjp) then returns an empty vector.
    fn param_shape(&self) -> &[usize] {
        &[]
    }

    /// `∂/∂θ ⟨K(θ) x̄, seed⟩` with `x̄` and `seed` held constant, flattened in
    /// row-major order of [`param_shape`](Self::param_shape).
    ///
    /// The default reports that θ-gradients are unavailable.
    fn param_vjp(&self, _x_bar: &[F], _seed: &[F]) -> Result<Vec<F>> {
        Err(ImplicitError::AutodiffUnsupportedOperator {
            reason: "operator exposes no differentiable parameterization".into(),
        })
    }
}

/// A differentiable parameterization `θ ↦ K(θ)`, written once for every
/// [`Scalar`] type.
///
/// `apply` must be linear in `v` and must not branch on values of `θ` in a way
/// that changes the recorded expression between nearby points.
pub trait Parameterization<F: Real> {
    /// Dimension N of the operator.
    fn dim(&self) -> usize;

    /// Shape of θ. The flattened length is `∏ shape`, or 0 for an empty shape.
    fn param_shape(&self) -> Vec<usize>;

    /// `K(θ) v`.
    fn apply<T: Scalar<Float = F>>(&self, theta: &[T], v: &[T]) -> Vec<T>;

    /// `K(θ)ᵀ v`, if a hand-written adjoint exists.
    fn apply_transpose(&self, _theta: &[F], _v: &[F]) -> Option<Vec<F>> {
        None
    }

    /// Whether [`apply_transpose`](Self::apply_transpose) is implemented.
    fn has_explicit_transpose(&self) -> bool {
        false
    }
}

/// Number of scalars in a θ of the given shape. An empty shape holds none.
pub(crate) fn param_count(shape: &[usize]) -> usize {
    if shape.is_empty() {
        0
    } else {
        shape.iter().product()
    }
}

/// `K(θ)` at a fixed θ, backed by a [`Parameterization`].
///
/// Constructed once per forward pass and immutable afterwards.
#[derive(Debug, Clone)]
pub struct MatrixFreeOperator<F, P> {
    param: P,
    theta: Vec<F>,
    shape: Vec<usize>,
}

impl<F: Real, P: Parameterization<F>> MatrixFreeOperator<F, P> {
    /// Bind `param` to `theta`, checking its length against `param_shape()`.
    ///
    /// Fails with [`ImplicitError::InvalidParams`] for a zero-dimensional operator.
    pub fn new(param: P, theta: Vec<F>) -> Result<Self> {
        if param.dim() == 0 {
            return Err(ImplicitError::InvalidParams {
                reason: "operator dimension must be at least 1".into(),
            });
        }
        let shape = param.param_shape();
        check_len("theta", param_count(&shape), theta.len())?;
        Ok(MatrixFreeOperator {
            param,
            theta,
            shape,
        })
    }

    pub fn theta(&self) -> &[F] {
        &self.theta
    }

    pub fn parameterization(&self) -> &P {
        &self.param
    }

    /// Rebind the same parameterization to a different θ.
    pub fn with_theta(&self, theta: Vec<F>) -> Result<Self>
    where
        P: Clone,
    {
        Self::new(self.param.clone(), theta)
    }
}

impl<F: Real, P: Parameterization<F>> LinearOperator<F> for MatrixFreeOperator<F, P> {
    fn dim(&self) -> usize {
        self.param.dim()
    }

    fn apply(&self, v: &[F]) -> Result<Vec<F>> {
        check_len("apply input", self.dim(), v.len())?;
        Ok(self.param.apply(&self.theta, v))
    }

    fn apply_transpose(&self, v: &[F]) -> Result<Vec<F>> {
        let n = self.dim();
        check_len("apply_transpose input", n, v.len())?;
        if let Some(out) = self.param.apply_transpose(&self.theta, v) {
            check_len("explicit transpose output", n, out.len())?;
            return Ok(out);
        }
        // Kᵀ v = (∂(K u)/∂u)ᵀ v at any u; θ enters as tape constants.
        let theta: Vec<Reverse<F>> = self.theta.iter().map(|&t| Reverse::constant(t)).collect();
        let origin = vec![F::zero(); n];
        let (_, kt_v) = adjoint::vjp(|u| self.param.apply(&theta, u), &origin, v)?;
        Ok(kt_v)
    }

    fn transpose_path(&self) -> TransposePath {
        if self.param.has_explicit_transpose() {
            TransposePath::Explicit
        } else {
            TransposePath::Autodiff
        }
    }

    fn param_shape(&self) -> &[usize] {
        &self.shape
    }

    fn param_vjp(&self, x_bar: &[F], seed: &[F]) -> Result<Vec<F>> {
        let n = self.dim();
        check_len("forward solution", n, x_bar.len())?;
        check_len("adjoint seed", n, seed.len())?;

        // x̄ and the seed are frozen: they enter the recording as constants,
        // so nothing flows back into the forward solve.
        let x_c: Vec<Reverse<F>> = x_bar.iter().map(|&v| Reverse::constant(v)).collect();
        let y_c: Vec<Reverse<F>> = seed.iter().map(|&v| Reverse::constant(v)).collect();
        let grad = adjoint::grad(
            |theta| {
                let kx = self.param.apply(theta, &x_c);
                kx.iter()
                    .zip(y_c.iter())
                    .fold(Reverse::from_lit(0.0), |acc, (&k, &y)| acc + k * y)
            },
            &self.theta,
        )?;
        Ok(grad)
    }
}

type ApplyFn<F> = Box<dyn Fn(&[F]) -> Vec<F> + Send + Sync>;

/// An operator given only as a forward/adjoint closure pair over plain floats.
///
/// Closures over `F` cannot be replayed on the tape, so the transpose must be
/// supplied and θ-gradients are unavailable.
pub struct ClosureOperator<F> {
    dim: usize,
    forward: ApplyFn<F>,
    adjoint: ApplyFn<F>,
}

impl<F: Real> ClosureOperator<F> {
    pub fn new(
        dim: usize,
        forward: impl Fn(&[F]) -> Vec<F> + Send + Sync + 'static,
        adjoint: impl Fn(&[F]) -> Vec<F> + Send + Sync + 'static,
    ) -> Self {
        ClosureOperator {
            dim,
            forward: Box::new(forward),
            adjoint: Box::new(adjoint),
        }
    }

    /// A symmetric operator: the forward closure doubles as its own adjoint.
    pub fn symmetric(
        dim: usize,
        forward: impl Fn(&[F]) -> Vec<F> + Send + Sync + Clone + 'static,
    ) -> Self {
        Self::new(dim, forward.clone(), forward)
    }
}

impl<F> fmt::Debug for ClosureOperator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureOperator").field("dim", &self.dim).finish_non_exhaustive()
    }
}

impl<F: Real> LinearOperator<F> for ClosureOperator<F> {
    fn dim(&self) -> usize {
        self.dim
    }

    fn apply(&self, v: &[F]) -> Result<Vec<F>> {
        check_len("apply input", self.dim, v.len())?;
        let out = (self.forward)(v);
        check_len("apply output", self.dim, out.len())?;
        Ok(out)
    }

    fn apply_transpose(&self, v: &[F]) -> Result<Vec<F>> {
        check_len("apply_transpose input", self.dim, v.len())?;
        let out = (self.adjoint)(v);
        check_len("apply_transpose output", self.dim, out.len())?;
        Ok(out)
    }

    fn transpose_path(&self) -> TransposePath {
        TransposePath::Explicit
    }

    fn param_vjp(&self, _x_bar: &[F], _seed: &[F]) -> Result<Vec<F>> {
        Err(ImplicitError::AutodiffUnsupportedOperator {
            reason: "closure operators are opaque to the autodiff tape".into(),
        })
    }
}

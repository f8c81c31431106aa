//! Concrete parameterizations `θ ↦ K(θ)`.
//!
//! Each one is written once over [`Scalar`], so the same code performs the
//! forward apply on plain floats and records `K(θ) x̄` on the reverse tape.

use adjoint::{Real, Scalar};

use crate::operator::Parameterization;

/// `K = scale · Θ` with Θ a dense `n × n` matrix stored row-major in θ.
///
/// Linear in θ. No hand-written transpose: `Kᵀ v` goes through autodiff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DenseScaled {
    pub n: usize,
    pub scale: f64,
}

impl DenseScaled {
    pub fn new(n: usize, scale: f64) -> Self {
        DenseScaled { n, scale }
    }
}

impl<F: Real> Parameterization<F> for DenseScaled {
    fn dim(&self) -> usize {
        self.n
    }

    fn param_shape(&self) -> Vec<usize> {
        vec![self.n, self.n]
    }

    fn apply<T: Scalar<Float = F>>(&self, theta: &[T], v: &[T]) -> Vec<T> {
        if self.n == 0 {
            return Vec::new();
        }
        let scale = T::from_lit(self.scale);
        theta
            .chunks_exact(self.n)
            .map(|row| {
                let dot = row
                    .iter()
                    .zip(v)
                    .fold(T::from_lit(0.0), |acc, (&a, &x)| acc + a * x);
                scale * dot
            })
            .collect()
    }
}

/// 1-D reaction–diffusion stencil with zero boundary:
/// `(K v)ᵢ = (2 + exp θᵢ) vᵢ − vᵢ₋₁ − vᵢ₊₁`.
///
/// Nonlinear in θ. K is symmetric positive definite for every θ, so the
/// explicit transpose is the forward stencil itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffusionStencil {
    pub n: usize,
}

impl DiffusionStencil {
    pub fn new(n: usize) -> Self {
        DiffusionStencil { n }
    }
}

impl<F: Real> Parameterization<F> for DiffusionStencil {
    fn dim(&self) -> usize {
        self.n
    }

    fn param_shape(&self) -> Vec<usize> {
        vec![self.n]
    }

    fn apply<T: Scalar<Float = F>>(&self, theta: &[T], v: &[T]) -> Vec<T> {
        let n = self.n;
        let two = T::from_lit(2.0);
        (0..n)
            .map(|i| {
                let mut out = (two + theta[i].exp()) * v[i];
                if i > 0 {
                    out -= v[i - 1];
                }
                if i + 1 < n {
                    out -= v[i + 1];
                }
                out
            })
            .collect()
    }

    fn apply_transpose(&self, theta: &[F], v: &[F]) -> Option<Vec<F>> {
        Some(<Self as Parameterization<F>>::apply::<F>(self, theta, v))
    }

    fn has_explicit_transpose(&self) -> bool {
        true
    }
}

/// Circular convolution with a `taps`-long kernel θ:
/// `(K v)ᵢ = Σₖ θₖ v₍ᵢ₋ₖ₎ mod n`.
///
/// Linear in θ. The transpose is circular correlation with the same kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircularConvolution {
    pub n: usize,
    pub taps: usize,
}

impl CircularConvolution {
    pub fn new(n: usize, taps: usize) -> Self {
        CircularConvolution { n, taps }
    }
}

impl<F: Real> Parameterization<F> for CircularConvolution {
    fn dim(&self) -> usize {
        self.n
    }

    fn param_shape(&self) -> Vec<usize> {
        vec![self.taps]
    }

    fn apply<T: Scalar<Float = F>>(&self, theta: &[T], v: &[T]) -> Vec<T> {
        let n = self.n;
        (0..n)
            .map(|i| {
                theta.iter().enumerate().fold(T::from_lit(0.0), |acc, (k, &t)| {
                    acc + t * v[(i + n - k % n) % n]
                })
            })
            .collect()
    }

    fn apply_transpose(&self, theta: &[F], v: &[F]) -> Option<Vec<F>> {
        let n = self.n;
        let out = (0..n)
            .map(|j| {
                theta
                    .iter()
                    .enumerate()
                    .fold(F::zero(), |acc, (k, &t)| acc + t * v[(j + k) % n])
            })
            .collect();
        Some(out)
    }

    fn has_explicit_transpose(&self) -> bool {
        true
    }
}

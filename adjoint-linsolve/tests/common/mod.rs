//! Shared helpers for the integration tests.
//!
//! The dense path in here (materialized K, LU solve recorded on the tape) is
//! the verification reference only. It is O(N²) by construction.

#![allow(dead_code)]

use adjoint::{Reverse, Scalar};
use num_traits::Float as _;
use adjoint_linsolve::Parameterization;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn uniform(rng: &mut StdRng, n: usize, lo: f64, hi: f64) -> Vec<f64> {
    (0..n).map(|_| rng.gen_range(lo..hi)).collect()
}

/// Random n×n matrix, row-major, with `shift` added to the diagonal.
pub fn random_matrix(rng: &mut StdRng, n: usize, shift: f64) -> Vec<f64> {
    let mut theta = uniform(rng, n * n, -1.0, 1.0);
    for i in 0..n {
        theta[i * n + i] += shift;
    }
    theta
}

pub fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

/// `K(θ)` as a dense matrix, one column per unit vector.
pub fn dense_matrix<T, P>(param: &P, theta: &[T]) -> Vec<Vec<T>>
where
    T: Scalar<Float = f64>,
    P: Parameterization<f64>,
{
    let n = param.dim();
    let mut k = vec![vec![T::from_lit(0.0); n]; n];
    for j in 0..n {
        let mut e = vec![T::from_lit(0.0); n];
        e[j] = T::from_lit(1.0);
        let col = param.apply(theta, &e);
        for (i, v) in col.into_iter().enumerate() {
            k[i][j] = v;
        }
    }
    k
}

/// Gaussian elimination with partial pivoting, generic over the scalar so it
/// can be recorded on the reverse tape.
#[allow(clippy::needless_range_loop)]
pub fn lu_solve<T: Scalar>(mut a: Vec<Vec<T>>, mut b: Vec<T>) -> Vec<T> {
    let n = b.len();
    for col in 0..n {
        let mut pivot_row = col;
        for row in col + 1..n {
            if a[row][col].value().abs() > a[pivot_row][col].value().abs() {
                pivot_row = row;
            }
        }
        assert!(
            a[pivot_row][col].value().abs() > <T::Float as adjoint::Float>::lit(0.0),
            "reference matrix is singular"
        );
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for j in col..n {
                let upper = a[col][j];
                a[row][j] -= factor * upper;
            }
            let upper = b[col];
            b[row] -= factor * upper;
        }
    }

    let mut x = vec![T::from_lit(0.0); n];
    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in i + 1..n {
            sum -= a[i][j] * x[j];
        }
        x[i] = sum / a[i][i];
    }
    x
}

pub fn transpose<T: Copy>(a: &[Vec<T>]) -> Vec<Vec<T>> {
    let n = a.len();
    (0..n).map(|j| (0..n).map(|i| a[i][j]).collect()).collect()
}

/// `‖K‖∞ ‖K⁻¹‖∞`, with the inverse built column by column through [`lu_solve`].
pub fn condition_inf(k: &[Vec<f64>]) -> f64 {
    let n = k.len();
    let row_sum_max = |m: &[Vec<f64>]| {
        m.iter()
            .map(|row| row.iter().map(|v| v.abs()).sum::<f64>())
            .fold(0.0, f64::max)
    };
    let columns: Vec<Vec<f64>> = (0..n)
        .map(|j| {
            let mut e = vec![0.0; n];
            e[j] = 1.0;
            lu_solve(k.to_vec(), e)
        })
        .collect();
    row_sum_max(k) * row_sum_max(&transpose(&columns))
}

/// `(∂L/∂θ, ∂L/∂b)` by reverse-mode differentiation straight through a dense
/// LU solve of `K(θ) x = b`.
pub fn autodiff_through_dense_solve<P, L>(param: &P, theta: &[f64], b: &[f64], loss: L) -> (Vec<f64>, Vec<f64>)
where
    P: Parameterization<f64>,
    L: Fn(&[Reverse<f64>]) -> Reverse<f64>,
{
    let m = theta.len();
    let mut z = theta.to_vec();
    z.extend_from_slice(b);
    let g = adjoint::grad(
        |z| {
            let (t, rhs) = z.split_at(m);
            let k = dense_matrix(param, t);
            let x = lu_solve(k, rhs.to_vec());
            loss(&x)
        },
        &z,
    )
    .expect("dense reference is smooth");
    let (g_theta, g_b) = g.split_at(m);
    (g_theta.to_vec(), g_b.to_vec())
}

/// `mean(x)`.
pub fn mean_loss<T: Scalar>(x: &[T]) -> T {
    let n = T::from_lit(x.len() as f64);
    x.iter().fold(T::from_lit(0.0), |acc, &v| acc + v) / n
}

/// `Σ wᵢ xᵢ²` with fixed weights.
pub fn weighted_square_loss<T: Scalar>(x: &[T]) -> T {
    x.iter().enumerate().fold(T::from_lit(0.0), |acc, (i, &v)| {
        acc + T::from_lit(1.0 + 0.25 * i as f64) * v * v
    })
}

//! Finite-difference validation of implicit gradients.
//!
//! Every perturbed point is re-solved matrix-free, so the check itself never
//! forms a Jacobian and scales to the same operators as the engine.
//!
//! Central differences of a solve are only as accurate as the solve: the
//! error in each difference quotient is about `tol · ||K⁻¹|| / epsilon`. Use a
//! solver tolerance several orders below `epsilon · atol`.

use adjoint::{Real, Reverse};

use crate::error::{check_len, Result};
use crate::implicit::ImplicitGradientSolver;
use crate::operator::{LinearOperator, MatrixFreeOperator, Parameterization};
use crate::solvers::LinearSolver;

/// Step size and pass/fail tolerances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradCheckConfig {
    /// Central-difference half step (default: 1e-6).
    pub epsilon: f64,
    /// Absolute tolerance (default: 1e-5).
    pub atol: f64,
    /// Relative tolerance (default: 1e-4).
    pub rtol: f64,
}

impl Default for GradCheckConfig {
    fn default() -> Self {
        GradCheckConfig {
            epsilon: 1e-6,
            atol: 1e-5,
            rtol: 1e-4,
        }
    }
}

/// Summary of an analytic-versus-numeric comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct GradCheckReport {
    pub max_abs_diff: f64,
    pub max_rel_diff: f64,
    pub num_checked: usize,
    /// Entries with `|a - n| > atol + rtol · |n|`.
    pub num_failures: usize,
    pub passed: bool,
}

/// Central differences `(f(x + εeᵢ) - f(x - εeᵢ)) / 2ε` for every coordinate.
pub fn finite_difference<F, Fun>(f: Fun, x: &[F], epsilon: f64) -> Result<Vec<F>>
where
    F: Real,
    Fun: Fn(&[F]) -> Result<F>,
{
    let h = F::lit(epsilon);
    let two_h = h + h;
    let mut probe = x.to_vec();
    let mut out = Vec::with_capacity(x.len());
    for i in 0..x.len() {
        probe[i] = x[i] + h;
        let plus = f(&probe)?;
        probe[i] = x[i] - h;
        let minus = f(&probe)?;
        probe[i] = x[i];
        out.push((plus - minus) / two_h);
    }
    Ok(out)
}

/// Compare two gradients entrywise.
pub fn compare<F: Real>(analytic: &[F], numeric: &[F], config: &GradCheckConfig) -> Result<GradCheckReport> {
    check_len("numeric gradient", analytic.len(), numeric.len())?;
    let mut report = GradCheckReport {
        max_abs_diff: 0.0,
        max_rel_diff: 0.0,
        num_checked: analytic.len(),
        num_failures: 0,
        passed: true,
    };
    for (a, n) in analytic.iter().zip(numeric) {
        let (a, n) = (a.as_f64(), n.as_f64());
        let abs_diff = (a - n).abs();
        let scale = a.abs().max(n.abs()).max(f64::MIN_POSITIVE);
        report.max_abs_diff = report.max_abs_diff.max(abs_diff);
        report.max_rel_diff = report.max_rel_diff.max(abs_diff / scale);
        let within = abs_diff <= config.atol + config.rtol * n.abs();
        // NaN compares false and so always fails.
        if !within {
            report.num_failures += 1;
        }
    }
    report.passed = report.num_failures == 0;
    Ok(report)
}

/// `(L(x), ∂L/∂x)` for a loss written against reverse-mode scalars.
pub fn loss_and_grad<F, L>(loss: &L, x: &[F]) -> Result<(F, Vec<F>)>
where
    F: Real,
    L: Fn(&[Reverse<F>]) -> Reverse<F>,
{
    let (value, grad) = adjoint::vjp(|v| vec![loss(v)], x, &[F::one()])?;
    Ok((value[0], grad))
}

/// Check `∂L/∂b` from `backward` against finite differences of
/// `b ↦ L(Solve(K, b))`.
pub fn check_grad_b<F, S, O, L>(
    engine: &ImplicitGradientSolver<F, S>,
    op: &O,
    b: &[F],
    loss: L,
    config: &GradCheckConfig,
) -> Result<GradCheckReport>
where
    F: Real,
    S: LinearSolver<F>,
    O: LinearOperator<F> + ?Sized,
    L: Fn(&[Reverse<F>]) -> Reverse<F>,
{
    let x_bar = engine.forward(op, b)?.x;
    let (_, g) = loss_and_grad(&loss, &x_bar)?;
    let analytic = engine.backward(op, &x_bar, &g)?.grad_b;

    let numeric = finite_difference(
        |b_probe| {
            let x = engine.forward(op, b_probe)?.x;
            Ok(loss_and_grad(&loss, &x)?.0)
        },
        b,
        config.epsilon,
    )?;
    let report = compare(&analytic, &numeric, config)?;
    tracing::debug!(?report, "grad_b check");
    Ok(report)
}

/// Check `∂L/∂θ` from `backward` against finite differences of
/// `θ ↦ L(Solve(K(θ), b))`.
pub fn check_grad_theta<F, S, P, L>(
    engine: &ImplicitGradientSolver<F, S>,
    parameterization: &P,
    theta: &[F],
    b: &[F],
    loss: L,
    config: &GradCheckConfig,
) -> Result<GradCheckReport>
where
    F: Real,
    S: LinearSolver<F>,
    P: Parameterization<F> + Clone,
    L: Fn(&[Reverse<F>]) -> Reverse<F>,
{
    let op = MatrixFreeOperator::new(parameterization.clone(), theta.to_vec())?;
    let x_bar = engine.forward(&op, b)?.x;
    let (_, g) = loss_and_grad(&loss, &x_bar)?;
    let analytic = engine.backward(&op, &x_bar, &g)?.grad_theta.values;

    let numeric = finite_difference(
        |theta_probe| {
            let probe = op.with_theta(theta_probe.to_vec())?;
            let x = engine.forward(&probe, b)?.x;
            Ok(loss_and_grad(&loss, &x)?.0)
        },
        theta,
        config.epsilon,
    )?;
    let report = compare(&analytic, &numeric, config)?;
    tracing::debug!(?report, "grad_theta check");
    Ok(report)
}

use crate::dual::Dual;
use crate::error::AdError;
use crate::float::Float;
use crate::reverse::Reverse;
use crate::tape::{Tape, TapeGuard, TapeThreadLocal};

/// Register `x` as tape inputs `0..x.len()`.
fn register_inputs<F: Float>(tape: &mut Tape<F>, x: &[F]) -> Vec<Reverse<F>> {
    x.iter()
        .map(|&val| {
            let (idx, v) = tape.new_variable(val);
            Reverse::from_tape(v, idx)
        })
        .collect()
}

/// Compute the gradient of a scalar function `f : R^n → R` using reverse mode.
///
/// Fails if the recording hit a kink or a non-finite partial derivative.
///
/// ```
/// let g = adjoint::grad(|x: &[adjoint::Reverse<f64>]| {
///     x[0] * x[0] + x[1] * x[1]
/// }, &[3.0, 4.0]).unwrap();
/// assert!((g[0] - 6.0).abs() < 1e-10);
/// assert!((g[1] - 8.0).abs() < 1e-10);
/// ```
pub fn grad<F: TapeThreadLocal>(
    f: impl FnOnce(&[Reverse<F>]) -> Reverse<F>,
    x: &[F],
) -> Result<Vec<F>, AdError> {
    let n = x.len();
    let mut tape = Tape::with_capacity(n * 10);
    let inputs = register_inputs(&mut tape, x);

    let output = {
        let _guard = TapeGuard::new(&mut tape);
        f(&inputs)
    };
    if let Some(fault) = tape.fault() {
        return Err(fault.into());
    }

    // Output independent of every input: zero gradient.
    if output.is_constant() {
        return Ok(vec![F::zero(); n]);
    }
    let adjoints = tape.reverse(output.index);
    Ok(adjoints[..n].to_vec())
}

/// Vector-Jacobian product (reverse mode): `(f(x), wᵀ·J)`.
///
/// Evaluates `f` at `x` and computes the adjoint product with weights `w`
/// in a single reverse sweep, without forming `J`.
pub fn vjp<F: TapeThreadLocal>(
    f: impl FnOnce(&[Reverse<F>]) -> Vec<Reverse<F>>,
    x: &[F],
    w: &[F],
) -> Result<(Vec<F>, Vec<F>), AdError> {
    let n = x.len();
    let mut tape = Tape::with_capacity(n * 10);
    let inputs = register_inputs(&mut tape, x);

    let outputs = {
        let _guard = TapeGuard::new(&mut tape);
        f(&inputs)
    };
    if outputs.len() != w.len() {
        return Err(AdError::LengthMismatch {
            what: "vjp weights",
            expected: outputs.len(),
            found: w.len(),
        });
    }
    if let Some(fault) = tape.fault() {
        return Err(fault.into());
    }

    let values: Vec<F> = outputs.iter().map(|r| r.value).collect();
    let seeds: Vec<(u32, F)> = outputs
        .iter()
        .zip(w.iter())
        .map(|(r, &wi)| (r.index, wi))
        .collect();
    let adjoints = tape.reverse_seeded(&seeds);

    Ok((values, adjoints[..n].to_vec()))
}

/// Jacobian-vector product (forward mode): `(f(x), J·v)`.
///
/// Evaluates `f` at `x` and computes the directional derivative in direction `v`.
pub fn jvp<F: Float>(
    f: impl FnOnce(&[Dual<F>]) -> Vec<Dual<F>>,
    x: &[F],
    v: &[F],
) -> Result<(Vec<F>, Vec<F>), AdError> {
    if x.len() != v.len() {
        return Err(AdError::LengthMismatch {
            what: "jvp direction",
            expected: x.len(),
            found: v.len(),
        });
    }
    let inputs: Vec<Dual<F>> = x
        .iter()
        .zip(v.iter())
        .map(|(&xi, &vi)| Dual::new(xi, vi))
        .collect();
    let outputs = f(&inputs);
    let values = outputs.iter().map(|d| d.re).collect();
    let tangents = outputs.iter().map(|d| d.eps).collect();
    Ok((values, tangents))
}

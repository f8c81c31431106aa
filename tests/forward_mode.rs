use adjoint::{Dual, Dual64, Scalar};
use approx::assert_relative_eq;

/// Central finite difference: (f(x+h) - f(x-h)) / 2h
fn finite_diff(f: impl Fn(f64) -> f64, x: f64) -> f64 {
    let h = 1e-7;
    (f(x + h) - f(x - h)) / (2.0 * h)
}

/// Test a dual elemental against finite differences.
fn check_elemental(f_dual: impl Fn(Dual64) -> Dual64, f_f64: impl Fn(f64) -> f64, x: f64) {
    let d = f_dual(Dual::variable(x));
    assert_relative_eq!(d.re, f_f64(x), max_relative = 1e-12);
    assert_relative_eq!(d.eps, finite_diff(&f_f64, x), max_relative = 1e-6);
}

#[test]
fn product_rule() {
    // (3 + ε)(4 + ε) = 12 + 7ε
    let c = Dual::new(3.0, 1.0) * Dual::new(4.0, 1.0);
    assert_relative_eq!(c.re, 12.0);
    assert_relative_eq!(c.eps, 7.0);
}

#[test]
fn quotient_rule() {
    // d/dx (x / (x+1)) at x=2: 1/(x+1)^2 = 1/9
    let x = Dual::variable(2.0);
    let y = x / (x + Dual::constant(1.0));
    assert_relative_eq!(y.re, 2.0 / 3.0, max_relative = 1e-12);
    assert_relative_eq!(y.eps, 1.0 / 9.0, max_relative = 1e-12);
}

#[test]
fn elementals() {
    check_elemental(|x| x.exp(), f64::exp, 0.7);
    check_elemental(|x| x.ln(), f64::ln, 2.0);
    check_elemental(|x| x.sin(), f64::sin, 1.1);
    check_elemental(|x| x.cos(), f64::cos, 1.1);
    check_elemental(|x| x.tanh(), f64::tanh, -0.4);
    check_elemental(|x| x.sqrt(), f64::sqrt, 4.0);
    check_elemental(|x| x.recip(), f64::recip, 2.5);
    check_elemental(|x| x.powi(4), |x| x.powi(4), 1.3);
    check_elemental(|x| x.abs(), f64::abs, -2.0);
}

#[test]
fn literals_are_constants() {
    let x = Dual::variable(3.0);
    let y = x * Dual64::from_lit(2.0) + Dual64::from_lit(1.0);
    assert_eq!(y.re, 7.0);
    assert_eq!(y.eps, 2.0);
}

#[test]
fn forward_matches_reverse_on_a_stencil() {
    // (K v)_i = (2 + exp θ_i) v_i - v_{i-1} - v_{i+1}
    fn stencil<T: Scalar<Float = f64>>(theta: &[T], v: &[T]) -> Vec<T> {
        let n = v.len();
        (0..n)
            .map(|i| {
                let mut out = (T::from_lit(2.0) + theta[i].exp()) * v[i];
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

    let theta = [0.1, -0.3, 0.5, 0.0];
    let v = [1.0, 2.0, -1.0, 0.5];
    let dir = [0.3, 1.0, -0.2, 0.7];
    let w = [1.0, -1.0, 0.5, 2.0];

    let (_, jv) = adjoint::jvp(
        |t| {
            let vc: Vec<Dual64> = v.iter().map(|&x| Dual::constant(x)).collect();
            stencil(t, &vc)
        },
        &theta,
        &dir,
    )
    .unwrap();
    let (_, jtw) = adjoint::vjp(
        |t| {
            let vc: Vec<adjoint::Reverse64> = v.iter().map(|&x| adjoint::Reverse::constant(x)).collect();
            stencil(t, &vc)
        },
        &theta,
        &w,
    )
    .unwrap();

    let lhs: f64 = w.iter().zip(&jv).map(|(a, b)| a * b).sum();
    let rhs: f64 = jtw.iter().zip(&dir).map(|(a, b)| a * b).sum();
    assert_relative_eq!(lhs, rhs, max_relative = 1e-12);
}

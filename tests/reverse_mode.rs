use adjoint::tape::{Tape, TapeGuard};
use adjoint::{Reverse, Scalar};
use approx::assert_relative_eq;

/// Run a single-variable reverse-mode differentiation.
fn reverse_grad(f: impl FnOnce(Reverse<f64>) -> Reverse<f64>, x_val: f64) -> f64 {
    let mut tape = Tape::new();
    let (idx, val) = tape.new_variable(x_val);
    let x = Reverse::from_tape(val, idx);
    let y = {
        let _guard = TapeGuard::new(&mut tape);
        f(x)
    };
    let adjoints = tape.reverse(y.index());
    adjoints[0]
}

/// Central finite difference for comparison.
fn finite_diff(f: impl Fn(f64) -> f64, x: f64) -> f64 {
    let h = 1e-7;
    (f(x + h) - f(x - h)) / (2.0 * h)
}

fn check_reverse_elemental(
    f_rev: impl FnOnce(Reverse<f64>) -> Reverse<f64>,
    f_f64: impl Fn(f64) -> f64,
    x: f64,
    tol: f64,
) {
    let grad = reverse_grad(f_rev, x);
    let expected = finite_diff(&f_f64, x);
    assert_relative_eq!(grad, expected, max_relative = tol);
}

// ── Arithmetic ──

#[test]
fn x_squared() {
    let grad = reverse_grad(|x| x * x, 3.0);
    assert_relative_eq!(grad, 6.0, max_relative = 1e-12);
}

#[test]
fn x_times_y() {
    let mut tape = Tape::new();
    let (xi, xv) = tape.new_variable(3.0);
    let (yi, yv) = tape.new_variable(4.0);
    let x = Reverse::from_tape(xv, xi);
    let y = Reverse::from_tape(yv, yi);
    let z = {
        let _guard = TapeGuard::new(&mut tape);
        x * y
    };
    let adjoints = tape.reverse(z.index());
    assert_relative_eq!(adjoints[0], 4.0, max_relative = 1e-12);
    assert_relative_eq!(adjoints[1], 3.0, max_relative = 1e-12);
}

#[test]
fn quotient() {
    // d/dx (1 / (x + 1)) = -1 / (x + 1)^2
    let grad = reverse_grad(|x| Reverse::constant(1.0) / (x + Reverse::constant(1.0)), 1.0);
    assert_relative_eq!(grad, -0.25, max_relative = 1e-12);
}

#[test]
fn diamond_pattern() {
    // dz/dx = 2x + 3x²
    let grad = reverse_grad(|x| x * x + x * x * x, 2.0);
    assert_relative_eq!(grad, 4.0 + 12.0, max_relative = 1e-12);
}

#[test]
fn compound_assignment_records() {
    let grad = reverse_grad(
        |x| {
            let mut acc = x;
            acc *= x;
            acc -= x;
            acc += Reverse::constant(7.0);
            acc
        },
        3.0,
    );
    assert_relative_eq!(grad, 5.0, max_relative = 1e-12);
}

// ── Elementals ──

#[test]
fn sin() {
    check_reverse_elemental(|x| x.sin(), |x| x.sin(), 1.0, 1e-6);
}

#[test]
fn cos() {
    check_reverse_elemental(|x| x.cos(), |x| x.cos(), 1.0, 1e-6);
}

#[test]
fn exp() {
    check_reverse_elemental(|x| x.exp(), |x| x.exp(), 1.0, 1e-6);
}

#[test]
fn ln() {
    check_reverse_elemental(|x| x.ln(), |x| x.ln(), 2.0, 1e-6);
}

#[test]
fn sqrt() {
    check_reverse_elemental(|x| x.sqrt(), |x| x.sqrt(), 4.0, 1e-6);
}

#[test]
fn tanh() {
    check_reverse_elemental(|x| x.tanh(), |x| x.tanh(), 0.7, 1e-6);
}

#[test]
fn recip() {
    check_reverse_elemental(|x| x.recip(), |x| x.recip(), 2.5, 1e-6);
}

#[test]
fn powi() {
    check_reverse_elemental(|x| x.powi(3), |x| x.powi(3), 2.0, 1e-6);
}

#[test]
fn abs_away_from_kink() {
    assert_relative_eq!(reverse_grad(|x| x.abs(), 3.0), 1.0, max_relative = 1e-12);
    assert_relative_eq!(reverse_grad(|x| x.abs(), -3.0), -1.0, max_relative = 1e-12);
}

#[test]
fn max_selects_larger_branch() {
    let grad = reverse_grad(|x| x.max(Reverse::constant(1.0)) * x, 2.0);
    assert_relative_eq!(grad, 4.0, max_relative = 1e-12);
    let grad = reverse_grad(|x| x.max(Reverse::constant(1.0)) * x, 0.5);
    assert_relative_eq!(grad, 1.0, max_relative = 1e-12);
}

// ── Compositions ──

#[test]
fn sin_of_exp() {
    let x_val: f64 = 0.5;
    let grad = reverse_grad(|x| x.exp().sin(), x_val);
    let expected = x_val.exp().cos() * x_val.exp();
    assert_relative_eq!(grad, expected, max_relative = 1e-10);
}

#[test]
fn complex_composition() {
    // f(x) = x * sin(x) + cos(x²)
    let x_val: f64 = 1.5;
    let grad = reverse_grad(|x| x * x.sin() + (x * x).cos(), x_val);
    let expected = x_val.sin() + x_val * x_val.cos() - 2.0 * x_val * (x_val * x_val).sin();
    assert_relative_eq!(grad, expected, max_relative = 1e-10);
}

// ── Nesting ──

#[test]
fn guards_restore_the_outer_tape() {
    let mut outer = Tape::<f64>::new();
    let (xi, xv) = outer.new_variable(2.0);
    let x = Reverse::from_tape(xv, xi);
    let y = {
        let _outer_guard = TapeGuard::new(&mut outer);
        let inner = adjoint::grad(|v| v[0] * v[0] * v[0], &[3.0]).unwrap();
        assert_relative_eq!(inner[0], 27.0, max_relative = 1e-12);
        x * x
    };
    let adjoints = outer.reverse(y.index());
    assert_relative_eq!(adjoints[0], 4.0, max_relative = 1e-12);
}

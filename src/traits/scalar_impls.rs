//! [`Scalar`] implementations for the AD number types.

use crate::dual::Dual;
use crate::float::Float;
use crate::reverse::Reverse;
use crate::scalar::Scalar;
use crate::tape::{self, TapeThreadLocal, CONSTANT};

// ──────────────────────────────────────────────
//  Dual<F>
// ──────────────────────────────────────────────

impl<F: Float> Scalar for Dual<F> {
    type Float = F;

    #[inline]
    fn from_f(val: F) -> Self {
        Dual::constant(val)
    }

    #[inline]
    fn value(&self) -> F {
        self.re
    }

    #[inline]
    fn exp(self) -> Self {
        let e = self.re.exp();
        self.chain(e, e)
    }

    #[inline]
    fn ln(self) -> Self {
        self.chain(self.re.ln(), F::one() / self.re)
    }

    #[inline]
    fn sin(self) -> Self {
        self.chain(self.re.sin(), self.re.cos())
    }

    #[inline]
    fn cos(self) -> Self {
        self.chain(self.re.cos(), -self.re.sin())
    }

    #[inline]
    fn tanh(self) -> Self {
        let t = self.re.tanh();
        self.chain(t, F::one() - t * t)
    }

    #[inline]
    fn sqrt(self) -> Self {
        let s = self.re.sqrt();
        self.chain(s, F::one() / (F::lit(2.0) * s))
    }

    #[inline]
    fn powi(self, n: i32) -> Self {
        let deriv = F::lit(f64::from(n)) * self.re.powi(n - 1);
        self.chain(self.re.powi(n), deriv)
    }

    #[inline]
    fn recip(self) -> Self {
        let inv = F::one() / self.re;
        self.chain(inv, -inv * inv)
    }

    #[inline]
    fn abs(self) -> Self {
        if self.re < F::zero() {
            -self
        } else {
            self
        }
    }

    #[inline]
    fn max(self, other: Self) -> Self {
        if other.re > self.re {
            other
        } else {
            self
        }
    }

    #[inline]
    fn min(self, other: Self) -> Self {
        if other.re < self.re {
            other
        } else {
            self
        }
    }
}

// ──────────────────────────────────────────────
//  Reverse<F>
// ──────────────────────────────────────────────

/// Record `f(x)` with `f'(x) = deriv` on the active tape.
#[inline]
fn chain<F: TapeThreadLocal>(x: Reverse<F>, op: &'static str, value: F, deriv: F) -> Reverse<F> {
    if x.index == CONSTANT {
        return Reverse::constant(value);
    }
    let index = tape::with_active_tape(|t| t.push_unary(op, x.index, deriv));
    Reverse { value, index }
}

/// Select `chosen` from a two-way branch, flagging a kink when the branch
/// condition is tied and either side is tracked.
#[inline]
fn select<F: TapeThreadLocal>(
    op: &'static str,
    chosen: Reverse<F>,
    a: Reverse<F>,
    b: Reverse<F>,
) -> Reverse<F> {
    if a.value == b.value && (a.index != CONSTANT || b.index != CONSTANT) {
        tape::with_active_tape(|t: &mut tape::Tape<F>| t.flag_kink(op));
    }
    chosen
}

impl<F: TapeThreadLocal> Scalar for Reverse<F> {
    type Float = F;

    #[inline]
    fn from_f(val: F) -> Self {
        Reverse::constant(val)
    }

    #[inline]
    fn value(&self) -> F {
        self.value
    }

    #[inline]
    fn exp(self) -> Self {
        let e = self.value.exp();
        chain(self, "exp", e, e)
    }

    #[inline]
    fn ln(self) -> Self {
        chain(self, "ln", self.value.ln(), F::one() / self.value)
    }

    #[inline]
    fn sin(self) -> Self {
        chain(self, "sin", self.value.sin(), self.value.cos())
    }

    #[inline]
    fn cos(self) -> Self {
        chain(self, "cos", self.value.cos(), -self.value.sin())
    }

    #[inline]
    fn tanh(self) -> Self {
        let t = self.value.tanh();
        chain(self, "tanh", t, F::one() - t * t)
    }

    #[inline]
    fn sqrt(self) -> Self {
        let s = self.value.sqrt();
        chain(self, "sqrt", s, F::one() / (F::lit(2.0) * s))
    }

    #[inline]
    fn powi(self, n: i32) -> Self {
        let deriv = F::lit(f64::from(n)) * self.value.powi(n - 1);
        chain(self, "powi", self.value.powi(n), deriv)
    }

    #[inline]
    fn recip(self) -> Self {
        let inv = F::one() / self.value;
        chain(self, "recip", inv, -inv * inv)
    }

    #[inline]
    fn abs(self) -> Self {
        let zero = Reverse::constant(F::zero());
        if self.value < F::zero() {
            -self
        } else {
            select("abs", self, self, zero)
        }
    }

    #[inline]
    fn max(self, other: Self) -> Self {
        let chosen = if other.value > self.value { other } else { self };
        select("max", chosen, self, other)
    }

    #[inline]
    fn min(self, other: Self) -> Self {
        let chosen = if other.value < self.value { other } else { self };
        select("min", chosen, self, other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dual_tanh_derivative() {
        let x = Dual::variable(0.3_f64).tanh();
        let t = 0.3_f64.tanh();
        assert!((x.eps - (1.0 - t * t)).abs() < 1e-15);
    }

    #[test]
    fn dual_powi_negative_exponent() {
        let x = Dual::variable(2.0_f64).powi(-2);
        assert!((x.re - 0.25).abs() < 1e-15);
        assert!((x.eps + 0.25).abs() < 1e-15);
    }

    #[test]
    fn constant_reverse_math_needs_no_tape() {
        let x = Reverse::constant(4.0_f64);
        let y = x.sqrt() * x.exp().ln();
        assert!(y.is_constant());
        assert!((y.value - 8.0).abs() < 1e-12);
    }
}

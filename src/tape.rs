//! Wengert-list tape for reverse-mode AD.
//!
//! Every recorded operation becomes one [`Node`] holding up to two operand
//! indices together with the partial derivatives of the result with respect to
//! them, computed during the forward evaluation. The reverse sweep is a single
//! backward pass of multiply-accumulates. Used internally by [`crate::Reverse`].
//!
//! The tape also remembers the first [`Fault`] seen while recording: an
//! operation evaluated exactly at a kink, or one whose partial derivative is
//! not finite. A faulted recording does not describe a differentiable function
//! at the recorded point, and the [`crate::api`] entry points refuse it.

use std::cell::Cell;

use crate::Float;

/// Sentinel index indicating a constant (not recorded on tape).
pub const CONSTANT: u32 = u32::MAX;

#[derive(Clone, Copy, Debug)]
struct Node<F> {
    args: [u32; 2],
    partials: [F; 2],
}

/// Why a recording is not differentiable at its evaluation point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    /// A nonsmooth operation (`abs`, `max`, `min`) was evaluated at its kink.
    Kink { op: &'static str, node: u32 },
    /// A partial derivative evaluated to NaN or infinity.
    NonFinite { op: &'static str, node: u32 },
}

/// Reverse-mode tape.
pub struct Tape<F: Float> {
    nodes: Vec<Node<F>>,
    num_inputs: u32,
    fault: Option<Fault>,
}

impl<F: Float> Default for Tape<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> Tape<F> {
    /// Create an empty tape.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a tape with room for `est_ops` recorded operations.
    pub fn with_capacity(est_ops: usize) -> Self {
        Tape {
            nodes: Vec::with_capacity(est_ops),
            num_inputs: 0,
            fault: None,
        }
    }

    /// Register a new independent variable. Returns `(index, value)`.
    ///
    /// Inputs must be registered before any operation is recorded so that
    /// their indices are `0..num_inputs`.
    #[inline]
    pub fn new_variable(&mut self, value: F) -> (u32, F) {
        debug_assert_eq!(
            self.nodes.len() as u32,
            self.num_inputs,
            "inputs must be registered before recording operations"
        );
        let idx = self.push(Node {
            args: [CONSTANT, CONSTANT],
            partials: [F::zero(), F::zero()],
        });
        self.num_inputs += 1;
        (idx, value)
    }

    /// Number of registered inputs.
    #[inline]
    pub fn num_inputs(&self) -> usize {
        self.num_inputs as usize
    }

    /// Number of nodes (inputs plus recorded operations).
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// First fault observed while recording, if any.
    #[inline]
    pub fn fault(&self) -> Option<Fault> {
        self.fault
    }

    /// Record a unary operation `result = f(operand)` with `partial = df/d(operand)`.
    ///
    /// Returns [`CONSTANT`] without recording when the operand is a constant.
    #[inline]
    pub fn push_unary(&mut self, op: &'static str, operand: u32, partial: F) -> u32 {
        if operand == CONSTANT {
            return CONSTANT;
        }
        self.check_partial(op, partial);
        self.push(Node {
            args: [operand, CONSTANT],
            partials: [partial, F::zero()],
        })
    }

    /// Record a binary operation with precomputed partial derivatives.
    #[inline]
    pub fn push_binary(
        &mut self,
        op: &'static str,
        lhs: u32,
        lhs_partial: F,
        rhs: u32,
        rhs_partial: F,
    ) -> u32 {
        match (lhs == CONSTANT, rhs == CONSTANT) {
            (true, true) => CONSTANT,
            (false, true) => self.push_unary(op, lhs, lhs_partial),
            (true, false) => self.push_unary(op, rhs, rhs_partial),
            (false, false) => {
                self.check_partial(op, lhs_partial);
                self.check_partial(op, rhs_partial);
                self.push(Node {
                    args: [lhs, rhs],
                    partials: [lhs_partial, rhs_partial],
                })
            }
        }
    }

    /// Mark the next node as the site of a kink in `op`.
    ///
    /// Only the first fault is kept.
    #[inline]
    pub fn flag_kink(&mut self, op: &'static str) {
        if self.fault.is_none() {
            self.fault = Some(Fault::Kink {
                op,
                node: self.nodes.len() as u32,
            });
        }
    }

    /// Run the reverse sweep, seeding the adjoint of `seed_index` with 1.
    pub fn reverse(&self, seed_index: u32) -> Vec<F> {
        self.reverse_seeded(&[(seed_index, F::one())])
    }

    /// Run the reverse sweep with custom adjoint seeds and return the full
    /// adjoint vector. Seeds on [`CONSTANT`] are ignored.
    pub fn reverse_seeded(&self, seeds: &[(u32, F)]) -> Vec<F> {
        let mut adjoints = vec![F::zero(); self.nodes.len()];
        for &(idx, seed) in seeds {
            if idx != CONSTANT {
                adjoints[idx as usize] = adjoints[idx as usize] + seed;
            }
        }

        for i in (self.num_inputs as usize..self.nodes.len()).rev() {
            let a = adjoints[i];
            if a == F::zero() {
                continue;
            }
            let node = self.nodes[i];
            for (&arg, &partial) in node.args.iter().zip(node.partials.iter()) {
                if arg != CONSTANT {
                    adjoints[arg as usize] = adjoints[arg as usize] + partial * a;
                }
            }
        }
        adjoints
    }

    #[inline]
    fn push(&mut self, node: Node<F>) -> u32 {
        let idx = self.nodes.len() as u32;
        self.nodes.push(node);
        idx
    }

    #[inline]
    fn check_partial(&mut self, op: &'static str, partial: F) {
        if self.fault.is_none() && !partial.is_finite() {
            self.fault = Some(Fault::NonFinite {
                op,
                node: self.nodes.len() as u32,
            });
        }
    }
}

// Thread-local active tape pointer.
thread_local! {
    static TAPE_F32: Cell<*mut Tape<f32>> = const { Cell::new(std::ptr::null_mut()) };
    static TAPE_F64: Cell<*mut Tape<f64>> = const { Cell::new(std::ptr::null_mut()) };
}

/// Selects the thread-local tape slot for a given float type.
pub trait TapeThreadLocal: Float {
    fn cell() -> &'static std::thread::LocalKey<Cell<*mut Tape<Self>>>;
}

impl TapeThreadLocal for f32 {
    fn cell() -> &'static std::thread::LocalKey<Cell<*mut Tape<Self>>> {
        &TAPE_F32
    }
}

impl TapeThreadLocal for f64 {
    fn cell() -> &'static std::thread::LocalKey<Cell<*mut Tape<Self>>> {
        &TAPE_F64
    }
}

/// Access the active tape for the current thread.
///
/// Panics if no tape is active: `Reverse` values that are not constants only
/// exist inside a [`crate::grad`] / [`crate::vjp`] scope.
#[inline]
pub fn with_active_tape<F: TapeThreadLocal, R>(f: impl FnOnce(&mut Tape<F>) -> R) -> R {
    F::cell().with(|cell| {
        let ptr = cell.get();
        assert!(
            !ptr.is_null(),
            "no active tape; tracked Reverse values only exist inside adjoint::grad or adjoint::vjp"
        );
        // SAFETY: the pointer was installed by a live `TapeGuard`, which holds
        // the unique `&mut Tape` for its whole scope, and the slot is
        // thread-local so no other thread can observe it.
        let tape = unsafe { &mut *ptr };
        f(tape)
    })
}

/// RAII guard that installs a tape as the thread-local active tape and
/// restores the previous one on drop, so recordings can nest.
pub struct TapeGuard<F: TapeThreadLocal> {
    prev: *mut Tape<F>,
}

impl<F: TapeThreadLocal> TapeGuard<F> {
    pub fn new(tape: &mut Tape<F>) -> Self {
        let prev = F::cell().with(|cell| {
            let prev = cell.get();
            cell.set(tape as *mut Tape<F>);
            prev
        });
        TapeGuard { prev }
    }
}

impl<F: TapeThreadLocal> Drop for TapeGuard<F> {
    fn drop(&mut self) {
        F::cell().with(|cell| {
            cell.set(self.prev);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_operands_are_not_recorded() {
        let mut tape = Tape::<f64>::new();
        assert_eq!(tape.push_unary("neg", CONSTANT, -1.0), CONSTANT);
        assert_eq!(tape.push_binary("mul", CONSTANT, 2.0, CONSTANT, 3.0), CONSTANT);
        assert!(tape.is_empty());
    }

    #[test]
    fn binary_with_one_constant_side_records_one_operand() {
        let mut tape = Tape::<f64>::new();
        let (x, _) = tape.new_variable(2.0);
        let y = tape.push_binary("mul", x, 5.0, CONSTANT, 2.0);
        assert_eq!(tape.len(), 2);
        let adj = tape.reverse(y);
        assert_eq!(adj[x as usize], 5.0);
    }

    #[test]
    fn reverse_accumulates_over_shared_operands() {
        // z = x * y + x
        let mut tape = Tape::<f64>::new();
        let (x, _) = tape.new_variable(3.0);
        let (y, _) = tape.new_variable(4.0);
        let xy = tape.push_binary("mul", x, 4.0, y, 3.0);
        let z = tape.push_binary("add", xy, 1.0, x, 1.0);
        let adj = tape.reverse(z);
        assert_eq!(adj[x as usize], 5.0);
        assert_eq!(adj[y as usize], 3.0);
    }

    #[test]
    fn first_fault_is_kept() {
        let mut tape = Tape::<f64>::new();
        let (x, _) = tape.new_variable(0.0);
        tape.flag_kink("abs");
        let _ = tape.push_unary("abs", x, 1.0);
        let _ = tape.push_unary("sqrt", x, f64::INFINITY);
        assert_eq!(tape.fault(), Some(Fault::Kink { op: "abs", node: 1 }));
    }

    #[test]
    fn non_finite_partial_is_a_fault() {
        let mut tape = Tape::<f64>::new();
        let (x, _) = tape.new_variable(0.0);
        let _ = tape.push_unary("ln", x, f64::INFINITY);
        assert_eq!(tape.fault(), Some(Fault::NonFinite { op: "ln", node: 1 }));
    }
}

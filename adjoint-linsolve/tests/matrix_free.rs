//! Memory ceiling for large operators.
//!
//! A counting global allocator tracks the largest single allocation and the
//! peak live heap while a forward/backward pair runs at N = 10 000. A dense
//! K would need N² · 8 = 800 MB; the engine must stay orders of magnitude
//! below that. This binary holds a single test so no other test's
//! allocations land in the counters.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

use adjoint::Scalar;
use adjoint_linsolve::{
    DiffusionStencil, ImplicitGradientSolver, LinearOperator, MatrixFreeOperator, Parameterization,
    SolveParams, SolverKind, TransposePath,
};

struct Counting;

static CURRENT: AtomicUsize = AtomicUsize::new(0);
static PEAK: AtomicUsize = AtomicUsize::new(0);
static LARGEST: AtomicUsize = AtomicUsize::new(0);

unsafe impl GlobalAlloc for Counting {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            let size = layout.size();
            let now = CURRENT.fetch_add(size, Ordering::Relaxed) + size;
            PEAK.fetch_max(now, Ordering::Relaxed);
            LARGEST.fetch_max(size, Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        CURRENT.fetch_sub(layout.size(), Ordering::Relaxed);
    }
}

#[global_allocator]
static ALLOC: Counting = Counting;

const N: usize = 10_000;
const DENSE_BYTES: usize = N * N * std::mem::size_of::<f64>();
const LARGEST_CEILING: usize = 16 << 20;
const PEAK_CEILING: usize = 64 << 20;

/// Start a fresh measurement window.
fn reset() -> usize {
    let base = CURRENT.load(Ordering::Relaxed);
    PEAK.store(base, Ordering::Relaxed);
    LARGEST.store(0, Ordering::Relaxed);
    base
}

/// The stencil with its hand-written transpose hidden, forcing `Kᵀ v`
/// through a reverse-mode sweep on every adjoint iteration.
#[derive(Clone, Copy)]
struct TapeTransposed(DiffusionStencil);

impl Parameterization<f64> for TapeTransposed {
    fn dim(&self) -> usize {
        self.0.n
    }

    fn param_shape(&self) -> Vec<usize> {
        vec![self.0.n]
    }

    fn apply<T: Scalar<Float = f64>>(&self, theta: &[T], v: &[T]) -> Vec<T> {
        <DiffusionStencil as Parameterization<f64>>::apply(&self.0, theta, v)
    }
}

fn run<P: Parameterization<f64>>(param: P, solver: SolverKind) -> (usize, usize) {
    let theta: Vec<f64> = (0..N).map(|i| 0.5 * (i as f64 * 1e-3).sin()).collect();
    let b: Vec<f64> = (0..N).map(|i| ((i % 17) as f64 - 8.0) / 8.0).collect();
    let g = vec![1.0 / N as f64; N];
    let op = MatrixFreeOperator::new(param, theta).unwrap();
    let engine = ImplicitGradientSolver::new(solver, SolveParams::new(1e-8, 2000));

    let base = reset();
    let x_bar = engine.forward(&op, &b).unwrap().x;
    let grads = engine.backward(&op, &x_bar, &g).unwrap();
    let peak = PEAK.load(Ordering::Relaxed) - base;
    let largest = LARGEST.load(Ordering::Relaxed);

    assert_eq!(grads.grad_b.len(), N);
    assert_eq!(grads.grad_theta.shape, vec![N]);
    (largest, peak)
}

#[test]
fn large_operator_stays_matrix_free() {
    let stencil = DiffusionStencil::new(N);
    let explicit = MatrixFreeOperator::<f64, _>::new(stencil, vec![0.0; N]).unwrap();
    assert_eq!(explicit.transpose_path(), TransposePath::Explicit);
    let (largest, peak) = run(stencil, SolverKind::Cg);
    assert!(largest < LARGEST_CEILING, "largest allocation {largest} B");
    assert!(peak < PEAK_CEILING, "peak live heap {peak} B");
    assert!(peak < DENSE_BYTES / 100);

    let taped = MatrixFreeOperator::<f64, _>::new(TapeTransposed(stencil), vec![0.0; N]).unwrap();
    assert_eq!(taped.transpose_path(), TransposePath::Autodiff);
    let (largest, peak) = run(TapeTransposed(stencil), SolverKind::Gmres { restart: 20 });
    assert!(largest < LARGEST_CEILING, "largest allocation {largest} B");
    assert!(peak < PEAK_CEILING, "peak live heap {peak} B");
    assert!(peak < DENSE_BYTES / 100);
}

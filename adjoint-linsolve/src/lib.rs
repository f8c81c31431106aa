//! Implicit differentiation for matrix-free linear solves.
//!
//! Given `x̄ = K(θ)⁻¹ b`, where `K` is available only as `v ↦ K v` and
//! `v ↦ Kᵀ v`, the [`ImplicitGradientSolver`] turns an upstream gradient
//! `∂L/∂x̄` into `∂L/∂b` (one transposed solve) and `∂L/∂θ` (one reverse-mode
//! sweep over `K(θ) x̄` with x̄ frozen). Neither the solver iterations nor any
//! matrix are ever differentiated or stored.
//!
//! # Modules
//!
//! - [`operator`]: [`LinearOperator`], [`Parameterization`], [`MatrixFreeOperator`]
//! - [`parameterizations`]: ready-made `θ ↦ K(θ)` maps
//! - [`solvers`]: matrix-free CG, BiCGSTAB and restarted GMRES
//! - [`implicit`]: the gradient engine
//! - [`gradcheck`]: finite-difference validation
//!
//! # Features
//!
//! - `serde`: `Serialize`/`Deserialize` for the solve configuration
//! - `parallel`: [`ImplicitGradientSolver::backward_many`] on the rayon pool

pub mod convergence;
pub mod error;
pub mod gradcheck;
pub mod implicit;
pub mod operator;
pub mod parameterizations;
pub mod solvers;

pub use convergence::{BackwardConfig, SolveParams, SolverKind};
pub use error::{ImplicitError, Result};
pub use gradcheck::{GradCheckConfig, GradCheckReport};
pub use implicit::{
    backward, AdjointSolution, BackwardRequest, ForwardSolution, Gradients, ImplicitGradientSolver,
    ParamGradient,
};
pub use operator::{ClosureOperator, LinearOperator, MatrixFreeOperator, Parameterization, TransposePath};
pub use parameterizations::{CircularConvolution, DenseScaled, DiffusionStencil};
pub use solvers::{BiCgStab, ConjugateGradient, Gmres, LinearSolver, SolveOutcome};

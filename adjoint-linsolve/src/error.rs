use adjoint::AdError;
use thiserror::Error;

/// Result type for solves and gradient computations.
pub type Result<T, E = ImplicitError> = std::result::Result<T, E>;

/// Errors surfaced by the forward solve and the implicit backward pass.
///
/// Nothing is retried or relaxed internally: an under-converged gradient is
/// reported, never returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImplicitError {
    /// An input vector or parameter array does not match the operator.
    #[error("dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// A forward solve exhausted its iteration budget.
    #[error("linear solve did not converge after {iterations} iterations (residual {residual:e})")]
    DidNotConverge { residual: f64, iterations: usize },

    /// The transposed solve `Kᵀ y = g` exhausted its iteration budget.
    #[error("adjoint solve did not converge after {iterations} iterations (residual {residual:e})")]
    AdjointSolveDidNotConverge { residual: f64, iterations: usize },

    /// The Krylov iteration broke down, which for these methods means the
    /// operator is (numerically) singular on the generated subspace.
    #[error("operator is singular: {reason} at iteration {iteration} (residual {residual:e})")]
    SingularOperator {
        reason: &'static str,
        iteration: usize,
        residual: f64,
    },

    /// The forward-apply expression cannot be differentiated with respect to θ.
    #[error("operator does not support autodiff: {reason}")]
    AutodiffUnsupportedOperator { reason: String },

    /// Solver configuration or operator construction is unusable.
    #[error("invalid parameters: {reason}")]
    InvalidParams { reason: String },
}

impl From<AdError> for ImplicitError {
    fn from(err: AdError) -> Self {
        match err {
            AdError::LengthMismatch {
                what,
                expected,
                found,
            } => ImplicitError::DimensionMismatch {
                what,
                expected,
                found,
            },
            other => ImplicitError::AutodiffUnsupportedOperator {
                reason: other.to_string(),
            },
        }
    }
}

/// Fail with [`ImplicitError::DimensionMismatch`] unless `found == expected`.
#[inline]
pub(crate) fn check_len(what: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(ImplicitError::DimensionMismatch {
            what,
            expected,
            found,
        })
    }
}

use thiserror::Error;

use crate::tape::Fault;

/// Errors reported by the differentiation entry points in [`crate::api`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdError {
    /// A nonsmooth operation was evaluated exactly at its kink.
    #[error("`{op}` evaluated at a kink (tape node {node}); function is not differentiable here")]
    NonDifferentiable { op: &'static str, node: u32 },

    /// A partial derivative evaluated to NaN or infinity.
    #[error("`{op}` produced a non-finite derivative (tape node {node})")]
    NonFiniteDerivative { op: &'static str, node: u32 },

    /// Input, direction, or weight vectors disagree in length.
    #[error("{what}: expected length {expected}, got {found}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
}

impl From<Fault> for AdError {
    fn from(fault: Fault) -> Self {
        match fault {
            Fault::Kink { op, node } => AdError::NonDifferentiable { op, node },
            Fault::NonFinite { op, node } => AdError::NonFiniteDerivative { op, node },
        }
    }
}

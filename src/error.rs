//! Error types for the multibody engine.

use crate::core::stage::Stage;
use thiserror::Error;

/// Errors produced while building, realizing, or solving a multibody system.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// A structural mutation or allocation happened after the point where it is legal.
    #[error("ordering error: {0}")]
    Ordering(String),

    /// An illegal stage transition was requested.
    #[error("stage error: cannot advance from {current} to {requested}")]
    Stage {
        /// Stage the state was at.
        current: Stage,
        /// Stage that was requested.
        requested: Stage,
    },

    /// A quantity was read before the state reached the stage that produces it.
    #[error("{what} is not available: requires stage {required}, state is at {current}")]
    NotRealized {
        /// What was being read.
        what: String,
        /// Stage at which the quantity becomes valid.
        required: Stage,
        /// Stage the state was at.
        current: Stage,
    },

    /// Constraint assembly did not reach the tolerance in the allowed iterations.
    #[error(
        "constraint assembly did not converge after {iterations} iterations \
         (max error {max_error:e}, tolerance {tolerance:e})"
    )]
    Convergence {
        /// Iterations performed.
        iterations: u32,
        /// Largest remaining scalar constraint error.
        max_error: f64,
        /// Requested tolerance.
        tolerance: f64,
    },

    /// A joint's articulated inertia is not positive-definite.
    #[error("singular mass matrix: articulated inertia at body {body} is not positive-definite")]
    SingularMassMatrix {
        /// Body whose joint produced the singular block.
        body: usize,
    },

    /// The body/joint/constraint graph is malformed.
    #[error("topology error: {0}")]
    Topology(String),

    /// An index, length, or type did not match what the system expects.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl SimError {
    /// Create an ordering error.
    #[must_use]
    pub fn ordering(msg: impl Into<String>) -> Self {
        Self::Ordering(msg.into())
    }

    /// Create a not-realized error.
    #[must_use]
    pub fn not_realized(what: impl Into<String>, required: Stage, current: Stage) -> Self {
        Self::NotRealized {
            what: what.into(),
            required,
            current,
        }
    }

    /// Create a topology error.
    #[must_use]
    pub fn topology(msg: impl Into<String>) -> Self {
        Self::Topology(msg.into())
    }

    /// Create an invalid argument error.
    #[must_use]
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, SimError>;

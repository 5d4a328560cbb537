//! Global configuration constants for the Stagebody engine.

use serde::{Deserialize, Serialize};

/// Standard gravity (Y-up).
pub const DEFAULT_GRAVITY: [f64; 3] = [0.0, -9.81, 0.0];

/// Largest scalar constraint error accepted by assembly and velocity projection.
pub const DEFAULT_CONSTRAINT_TOLERANCE: f64 = 1e-10;

/// Number of Newton iterations attempted before assembly gives up.
pub const DEFAULT_MAX_ASSEMBLY_ITERATIONS: u32 = 50;

/// Singular values below this are dropped by the minimum-norm solves.
pub const DEFAULT_SINGULAR_VALUE_EPSILON: f64 = 1e-12;

/// Tunables for the constraint engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub constraint_tolerance: f64,
    pub max_assembly_iterations: u32,
    pub singular_value_epsilon: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            constraint_tolerance: DEFAULT_CONSTRAINT_TOLERANCE,
            max_assembly_iterations: DEFAULT_MAX_ASSEMBLY_ITERATIONS,
            singular_value_epsilon: DEFAULT_SINGULAR_VALUE_EPSILON,
        }
    }
}

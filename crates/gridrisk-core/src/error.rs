//! Unified error types for the risk-averse OPF engine
//!
//! Every operation in this workspace is single-attempt and fail-fast: nothing
//! here is retried, and the variants below only classify *why* a call failed.
//!
//! # Example
//!
//! ```ignore
//! use gridrisk_core::{GridRiskError, GridRiskResult};
//!
//! fn solve(problem: &mut RiskAverseProblem) -> GridRiskResult<()> {
//!     let sol = problem.solve_lrelaxed_approx(1.0, None, None, None)?;
//!     println!("t = {}", sol.x.last().copied().unwrap_or_default());
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for all risk-problem operations.
#[derive(Error, Debug)]
pub enum GridRiskError {
    /// The convex solver terminated with a status other than "solved".
    ///
    /// Fatal for the call that triggered it; propagated, never retried.
    #[error("Solver '{solver}' did not converge: {status}")]
    SolverNonConvergence { solver: String, status: String },

    /// Degenerate numerics (zero reference cost, solver setup failure, ...)
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// A debug self-check (KKT residual, feasibility) failed.
    ///
    /// Signals a programming or convergence defect, not a user error.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Parameter validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Vector length mismatch at an API boundary
    #[error("Dimension mismatch for {what}: expected {expected}, got {got}")]
    Dimension {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// Worker pool errors
    #[error("Parallel evaluation error: {0}")]
    Parallel(String),

    /// I/O errors (configuration files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Convenience type alias for Results using GridRiskError.
pub type GridRiskResult<T> = Result<T, GridRiskError>;

impl GridRiskError {
    /// Check a slice length, returning [`GridRiskError::Dimension`] on mismatch.
    pub fn check_len(what: &'static str, expected: usize, got: usize) -> GridRiskResult<()> {
        if expected == got {
            Ok(())
        } else {
            Err(GridRiskError::Dimension {
                what,
                expected,
                got,
            })
        }
    }
}

impl From<serde_json::Error> for GridRiskError {
    fn from(err: serde_json::Error) -> Self {
        GridRiskError::Parse(err.to_string())
    }
}

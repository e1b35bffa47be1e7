//! Convex solvers used by the risk engine.
//!
//! - [`QuadraticProgram`]: one-shot QP on Clarabel (recourse and
//!   certainty-equivalent problems, LCCP subproblems)
//! - [`LccpSolver`]: smooth convex objective over linear constraints,
//!   driven through the [`Objective`] trait

mod lccp;
mod qp;

pub use lccp::{ConvexProblem, LccpSolver, Objective, ObjectiveEval, SolverResults, SolverStatus};
pub use qp::{upper_from_lower, QpSolution, QuadraticProgram};

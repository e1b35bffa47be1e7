//! # gridrisk-algo: Risk-Averse Two-Stage Stochastic DC-OPF
//!
//! This crate evaluates and solves the risk-averse two-stage dispatch problem:
//! choose stage-1 generation `p` before renewable output `r` is known, pay the
//! recourse cost `Q(p, r)` of re-dispatching afterwards, and keep the tail of
//! `Q` in check with a CVaR-style constraint on the threshold `t`.
//!
//! ## Components
//!
//! | Component | Role |
//! |-----------|------|
//! | [`DeterministicSubproblem`] | Two-stage DC-OPF data, recourse solves, scenario sampling |
//! | [`TwoStageDcopf`] | Concrete collaborator built from bus/generator/branch tables |
//! | [`RiskAverseProblem`] | Exact and smoothed risk evaluation, expectations, Lagrangian solves |
//! | [`LccpSolver`] | Linearly constrained convex solver on Clarabel QP subproblems |
//! | [`StochasticProblem`] | Interface for outer primal-dual drivers |
//!
//! ### Smoothing
//!
//! The hinge `(Q - Qmax - t)_+` is replaced in the Lagrangian subproblem by
//!
//! ```text
//! Qref / smax * ln(1 + exp(smax (Q - Qmax - t) / Qref))
//! ```
//!
//! which converges to the hinge as `smax_param` grows.
//!
//! ## Example
//!
//! ```ignore
//! use gridrisk_algo::{RiskAverseProblem, TwoStageDcopf};
//! use gridrisk_core::RiskParameters;
//!
//! let dcopf = builder.build()?;
//! let mut problem = RiskAverseProblem::new(dcopf, RiskParameters::default())?;
//! println!("{}", problem.summary());
//!
//! let x0 = problem.init_x()?;
//! let estimate = problem.eval_efg(&x0)?;
//! let sol = problem.solve_lrelaxed_approx(1.0, None, None, None)?;
//! ```

pub mod dcopf;
pub mod risk;
pub mod solver;

pub use dcopf::{
    BranchSpec, CertaintyEquivalent, DeterministicSubproblem, Dimensions, GeneratorSpec,
    RecourseProblem, RecourseValue, RenewableForecast, RenewableSpec, TwoStageData, TwoStageDcopf,
    TwoStageDcopfBuilder,
};
pub use risk::{
    ExpectationEstimate, LagrangianSolution, RiskAverseProblem, RiskEvaluation, RiskSummary,
    StochasticProblem,
};
pub use solver::{ConvexProblem, LccpSolver, Objective, ObjectiveEval, SolverResults, SolverStatus};

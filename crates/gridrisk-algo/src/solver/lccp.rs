//! Linearly constrained convex program (LCCP) solver.
//!
//! Solves
//!
//! ```text
//! minimize    phi(x)
//! subject to  A x = b
//!             l <= x <= u
//! ```
//!
//! for a smooth convex `phi` supplied through the [`Objective`] trait. Each
//! iteration builds the local quadratic model of `phi` at the iterate from
//! the objective's value, gradient and lower-triangular Hessian and solves it
//! exactly as a [`QuadraticProgram`]. The model minimizer `y` is always
//! feasible, so:
//!
//! - from an infeasible start the first step is taken in full;
//! - from a feasible iterate an Armijo backtracking search along `y - x`
//!   keeps every iterate feasible.
//!
//! The iteration stops once the Newton decrement `-g'(y - x)` falls below
//! `max(tol², 1e-10) (1 + |phi|)`; the model duals at that point are returned as the
//! KKT multipliers, with `x = y`.

use super::qp::{upper_from_lower, QuadraticProgram};
use gridrisk_core::linalg::{axpy, dot, mat_vec, norm_inf, sub, sym_lower_mat_vec};
use gridrisk_core::{GridRiskError, GridRiskResult};
use serde::{Deserialize, Serialize};
use sprs::{CsMat, TriMat};
use std::fmt;
use tracing::debug;
use web_time::Instant;

/// Smallest relative Newton decrement treated as meaningful; below this the
/// QP subproblem accuracy dominates.
const DECREMENT_FLOOR: f64 = 1e-10;

/// Structural part of an LCCP: `A x = b`, `l <= x <= u`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvexProblem {
    pub a: CsMat<f64>,
    pub b: Vec<f64>,
    pub l: Vec<f64>,
    pub u: Vec<f64>,
}

impl ConvexProblem {
    pub fn num_vars(&self) -> usize {
        self.l.len()
    }

    /// Zero clipped into the bounds. Usually violates `A x = b`.
    pub fn default_point(&self) -> Vec<f64> {
        self.l
            .iter()
            .zip(&self.u)
            .map(|(&l, &u)| 0.0_f64.min(u).max(l))
            .collect()
    }

    /// Whether `x` satisfies bounds and equalities to within `tol`.
    pub fn is_feasible(&self, x: &[f64], tol: f64) -> bool {
        let in_bounds = x
            .iter()
            .zip(self.l.iter().zip(&self.u))
            .all(|(&v, (&l, &u))| v >= l - tol && v <= u + tol);
        if !in_bounds {
            return false;
        }
        let ax = mat_vec(&self.a, x);
        norm_inf(&sub(&ax, &self.b)) <= tol * (1.0 + norm_inf(&self.b))
    }
}

/// Value, gradient and lower-triangular Hessian of an objective at a point.
#[derive(Debug)]
pub struct ObjectiveEval {
    pub value: f64,
    pub gradient: Vec<f64>,
    /// Lower triangle only: every entry has `row >= col`.
    pub hessian: TriMat<f64>,
}

/// Smooth convex objective evaluated by the solver.
pub trait Objective {
    fn eval(&self, x: &[f64]) -> ObjectiveEval;

    /// Objective value alone, used by the line search.
    fn value(&self, x: &[f64]) -> f64 {
        self.eval(x).value
    }
}

/// Terminal status of an LCCP solve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverStatus {
    Solved,
    MaxIterations,
    LineSearchFailed,
    SubproblemFailed(String),
}

impl fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverStatus::Solved => write!(f, "solved"),
            SolverStatus::MaxIterations => write!(f, "maximum iterations reached"),
            SolverStatus::LineSearchFailed => write!(f, "line search failed"),
            SolverStatus::SubproblemFailed(msg) => write!(f, "subproblem failed: {}", msg),
        }
    }
}

/// Primal/dual results, also accepted back as warm-start data.
///
/// Multipliers follow `gphi - A'lam + mu - pi = 0` with `mu, pi >= 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverResults {
    pub x: Vec<f64>,
    pub lam: Vec<f64>,
    pub mu: Vec<f64>,
    pub pi: Vec<f64>,
    pub status: SolverStatus,
    pub iterations: usize,
    pub solve_time_ms: u128,
}

/// Newton-type LCCP solver on Clarabel QP subproblems.
#[derive(Debug, Clone)]
pub struct LccpSolver {
    tolerance: f64,
    max_iterations: usize,
    armijo: f64,
    min_step: f64,
}

impl LccpSolver {
    pub fn new() -> Self {
        Self {
            tolerance: 1e-4,
            max_iterations: 200,
            armijo: 1e-4,
            min_step: 1e-10,
        }
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    /// Minimize `objective` over `problem`.
    ///
    /// Only the primal point of `warm_start` seeds the iteration; Clarabel
    /// has no dual warm start, so the returned multipliers always come from
    /// the final model solve. Non-convergence is reported through
    /// [`SolverResults::status`], not as an error.
    pub fn solve(
        &self,
        problem: &ConvexProblem,
        objective: &dyn Objective,
        warm_start: Option<&SolverResults>,
    ) -> GridRiskResult<SolverResults> {
        let start = Instant::now();
        let n = problem.num_vars();
        let m = problem.b.len();

        let mut x = match warm_start {
            Some(init) => {
                GridRiskError::check_len("warm-start x", n, init.x.len())?;
                init.x.clone()
            }
            None => problem.default_point(),
        };
        let mut feasible = problem.is_feasible(&x, 1e-9);

        let mut lam = vec![0.0; m];
        let mut mu = vec![0.0; n];
        let mut pi = vec![0.0; n];
        let mut status = SolverStatus::MaxIterations;
        let mut iterations = 0;

        while iterations < self.max_iterations {
            iterations += 1;
            let eval = objective.eval(&x);

            // Model in terms of the new point y:
            //   0.5 y'Hy + (g - Hx)'y
            let hx = sym_lower_mat_vec(&eval.hessian, &x);
            let model = QuadraticProgram {
                p: upper_from_lower(&eval.hessian),
                q: sub(&eval.gradient, &hx),
                a: problem.a.clone(),
                b: problem.b.clone(),
                l: problem.l.clone(),
                u: problem.u.clone(),
            };
            let sol = match model.solve() {
                Ok(sol) => sol,
                Err(err) => {
                    status = SolverStatus::SubproblemFailed(err.to_string());
                    break;
                }
            };

            let d = sub(&sol.x, &x);
            let slope = dot(&eval.gradient, &d);
            let decrement = -slope;
            debug!(
                iteration = iterations,
                value = eval.value,
                decrement,
                step = norm_inf(&d),
                "lccp iteration"
            );

            lam = sol.lam;
            mu = sol.mu;
            pi = sol.pi;

            if !feasible {
                x = sol.x;
                feasible = true;
                continue;
            }

            let scale = 1.0 + eval.value.abs();
            if decrement <= (self.tolerance * self.tolerance).max(DECREMENT_FLOOR) * scale {
                x = sol.x;
                status = SolverStatus::Solved;
                break;
            }

            let mut alpha = 1.0;
            loop {
                let trial = axpy(&x, alpha, &d);
                if objective.value(&trial) <= eval.value + self.armijo * alpha * slope {
                    x = trial;
                    break;
                }
                alpha *= 0.5;
                if alpha < self.min_step {
                    break;
                }
            }
            if alpha < self.min_step {
                // Model noise from the QP solver can stall the search right at
                // the optimum; accept the model point if the decrement is small.
                if decrement <= self.tolerance * scale {
                    x = sol.x;
                    status = SolverStatus::Solved;
                } else {
                    status = SolverStatus::LineSearchFailed;
                }
                break;
            }
        }

        Ok(SolverResults {
            x,
            lam,
            mu,
            pi,
            status,
            iterations,
            solve_time_ms: start.elapsed().as_millis(),
        })
    }
}

impl Default for LccpSolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// phi(x) = sum(exp(x_i)) - 2 x_0, subject to x_0 + x_1 = 2, 0 <= x <= 2
    struct ExpObjective;

    impl Objective for ExpObjective {
        fn eval(&self, x: &[f64]) -> ObjectiveEval {
            let mut hessian = TriMat::new((2, 2));
            hessian.add_triplet(0, 0, x[0].exp());
            hessian.add_triplet(1, 1, x[1].exp());
            ObjectiveEval {
                value: x[0].exp() + x[1].exp() - 2.0 * x[0],
                gradient: vec![x[0].exp() - 2.0, x[1].exp()],
                hessian,
            }
        }
    }

    fn problem() -> ConvexProblem {
        let mut a = TriMat::new((1, 2));
        a.add_triplet(0, 0, 1.0);
        a.add_triplet(0, 1, 1.0);
        ConvexProblem {
            a: a.to_csr(),
            b: vec![2.0],
            l: vec![0.0, 0.0],
            u: vec![2.0, 2.0],
        }
    }

    #[test]
    fn test_solves_smooth_convex_problem() {
        let solver = LccpSolver::new().with_tolerance(1e-8);
        let res = solver.solve(&problem(), &ExpObjective, None).unwrap();
        assert_eq!(res.status, SolverStatus::Solved);

        // Stationarity on the line x0 + x1 = 2: exp(x0) - 2 = exp(2 - x0)
        let x0 = res.x[0];
        assert!((x0.exp() - 2.0 - (2.0 - x0).exp()).abs() < 1e-5);
        assert!((res.x[0] + res.x[1] - 2.0).abs() < 1e-7);
    }

    #[test]
    fn test_multipliers_satisfy_stationarity() {
        let solver = LccpSolver::new().with_tolerance(1e-8);
        let res = solver.solve(&problem(), &ExpObjective, None).unwrap();
        let g = ExpObjective.eval(&res.x).gradient;
        for i in 0..2 {
            let r = g[i] - res.lam[0] + res.mu[i] - res.pi[i];
            assert!(r.abs() < 1e-5, "residual {} = {}", i, r);
        }
    }

    #[test]
    fn test_warm_start_converges_quickly() {
        let solver = LccpSolver::new().with_tolerance(1e-8);
        let cold = solver.solve(&problem(), &ExpObjective, None).unwrap();
        let warm = solver.solve(&problem(), &ExpObjective, Some(&cold)).unwrap();
        assert_eq!(warm.status, SolverStatus::Solved);
        assert!(warm.iterations <= cold.iterations);
        assert!((warm.x[0] - cold.x[0]).abs() < 1e-6);
    }

    #[test]
    fn test_warm_start_dimension_checked() {
        let solver = LccpSolver::new();
        let mut bad = solver.solve(&problem(), &ExpObjective, None).unwrap();
        bad.x.push(0.0);
        assert!(solver.solve(&problem(), &ExpObjective, Some(&bad)).is_err());
    }

    #[test]
    fn test_iteration_cap_reported_as_status() {
        let solver = LccpSolver::new().with_tolerance(1e-12).with_max_iterations(1);
        let res = solver.solve(&problem(), &ExpObjective, None).unwrap();
        assert_eq!(res.status, SolverStatus::MaxIterations);
    }

    #[test]
    fn test_default_point_respects_bounds() {
        let p = ConvexProblem {
            l: vec![1.0, f64::NEG_INFINITY],
            u: vec![2.0, f64::INFINITY],
            ..problem()
        };
        assert_eq!(p.default_point(), vec![1.0, 0.0]);
    }
}

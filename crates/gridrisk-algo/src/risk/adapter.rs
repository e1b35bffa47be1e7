//! Solving the Lagrangian subproblem and translating the result back to
//! the `(p, t)` space of the stochastic problem.

use super::lagrangian::{LagrangianObjective, LagrangianProblem, LagrangianTemplate};
use super::RiskAverseProblem;
use crate::dcopf::{DeterministicSubproblem, RecourseValue};
use crate::solver::{ConvexProblem, LccpSolver, Objective, SolverResults, SolverStatus};
use gridrisk_core::linalg::{mat_t_vec, mat_vec, norm2, sub};
use gridrisk_core::{GridRiskError, GridRiskResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Relative tolerance of the debug KKT self-check.
const KKT_TOL: f64 = 1e-4;

/// Solution of the Lagrangian subproblem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LagrangianSolution {
    /// `(p, t)`
    pub x: Vec<f64>,
    /// Gradient of the smoothed objective at `x`
    pub g_f_approx: Vec<f64>,
    /// Gradient of the smoothed risk constraint at `x`
    pub j_g_approx: Vec<f64>,
    /// Full solver output over `(p, t, q, w, s, y, z)`, reusable as warm start
    pub results: SolverResults,
}

impl<D: DeterministicSubproblem> RiskAverseProblem<D> {
    /// Build the Lagrangian subproblem for multiplier `lam`.
    ///
    /// Missing corrections default to zero. The constraint template is built
    /// on first use and shared by every later call.
    pub fn construct_lrelaxed_approx_problem(
        &mut self,
        lam: f64,
        g_corr: Option<&[f64]>,
        j_corr: Option<&[f64]>,
    ) -> GridRiskResult<LagrangianProblem<'_>> {
        let size_x = self.size_x();
        let eta = correction("g_corr", size_x, g_corr)?;
        let nu = correction("J_corr", size_x, j_corr)?;
        let (t_lo, t_hi) = self.t_bounds();

        let data = self.dcopf.data();
        let template = self
            .template
            .get_or_build(|| LagrangianTemplate::build(data, t_lo, t_hi))?;

        Ok(LagrangianProblem {
            template,
            objective: LagrangianObjective {
                data,
                lam,
                eta,
                nu,
                q_ref: self.q_ref,
                q_max: self.q_max,
                smax: self.params.smax_param,
                gamma: self.params.gamma,
                t_reg: self.params.t_reg,
            },
        })
    }

    /// Solve the Lagrangian subproblem, warm-starting from `init_data`.
    ///
    /// Any solver status other than solved is returned as
    /// [`GridRiskError::SolverNonConvergence`]. With `debug` set, the KKT
    /// conditions are verified before returning.
    pub fn solve_lrelaxed_approx(
        &mut self,
        lam: f64,
        g_corr: Option<&[f64]>,
        j_corr: Option<&[f64]>,
        init_data: Option<&SolverResults>,
    ) -> GridRiskResult<LagrangianSolution> {
        let solver = LccpSolver::new().with_tolerance(self.params.tol);
        let debug_checks = self.params.debug;

        let (results, q_range) = {
            let problem = self.construct_lrelaxed_approx_problem(lam, g_corr, j_corr)?;
            let results = solver.solve(problem.template.problem(), &problem.objective, init_data)?;
            if results.status != SolverStatus::Solved {
                return Err(GridRiskError::SolverNonConvergence {
                    solver: "lccp".into(),
                    status: results.status.to_string(),
                });
            }
            if debug_checks {
                check_kkt(problem.template.problem(), &problem.objective, &results)?;
            }
            (results, problem.template.q_range())
        };
        debug!(
            lam,
            iterations = results.iterations,
            solve_time_ms = results.solve_time_ms as u64,
            "lagrangian subproblem solved"
        );

        let num_p = self.dims().num_p;
        let p = &results.x[..num_p];
        let t = results.x[num_p];
        let q = &results.x[q_range];
        let (q_value, gphi1) = self.dcopf.data().phi1(q);
        let recourse = RecourseValue {
            q_value,
            gradient: gphi1.iter().map(|v| -v).collect(),
        };
        let approx = self.smoothed_evaluation(p, t, &recourse);

        Ok(LagrangianSolution {
            x: results.x[..=num_p].to_vec(),
            g_f_approx: approx.g_f,
            j_g_approx: approx.j_g,
            results,
        })
    }
}

fn correction(what: &'static str, size_x: usize, corr: Option<&[f64]>) -> GridRiskResult<Vec<f64>> {
    match corr {
        Some(v) => {
            GridRiskError::check_len(what, size_x, v.len())?;
            Ok(v.to_vec())
        }
        None => Ok(vec![0.0; size_x]),
    }
}

/// Verify stationarity, complementarity and feasibility of an LCCP result.
pub(crate) fn check_kkt(
    problem: &ConvexProblem,
    objective: &dyn Objective,
    results: &SolverResults,
) -> GridRiskResult<()> {
    let SolverResults { x, lam, mu, pi, .. } = results;
    let violation = |what: &str, lhs: f64, rhs: f64| {
        GridRiskError::InvariantViolation(format!("{}: {:.3e} > {:.3e}", what, lhs, rhs))
    };

    let gphi = objective.eval(x).gradient;
    let at_lam = mat_t_vec(&problem.a, lam);
    let residual: Vec<f64> = (0..x.len())
        .map(|i| gphi[i] - at_lam[i] + mu[i] - pi[i])
        .collect();
    let lhs = norm2(&residual);
    let rhs = KKT_TOL * (norm2(&gphi) + norm2(lam) + norm2(mu) + norm2(pi));
    if lhs > rhs {
        return Err(violation("stationarity", lhs, rhs));
    }

    let (mut comp_u, mut mu_f, mut gap_u) = (Vec::new(), Vec::new(), Vec::new());
    let (mut comp_l, mut pi_f, mut gap_l) = (Vec::new(), Vec::new(), Vec::new());
    for i in 0..x.len() {
        if problem.u[i].is_finite() {
            let gap = problem.u[i] - x[i];
            comp_u.push(mu[i] * gap);
            mu_f.push(mu[i]);
            gap_u.push(gap);
        }
        if problem.l[i].is_finite() {
            let gap = x[i] - problem.l[i];
            comp_l.push(pi[i] * gap);
            pi_f.push(pi[i]);
            gap_l.push(gap);
        }
    }
    let lhs = norm2(&comp_u);
    let rhs = KKT_TOL * (norm2(&mu_f) + norm2(&gap_u));
    if lhs > rhs {
        return Err(violation("upper complementarity", lhs, rhs));
    }
    let lhs = norm2(&comp_l);
    let rhs = KKT_TOL * (norm2(&pi_f) + norm2(&gap_l));
    if lhs > rhs {
        return Err(violation("lower complementarity", lhs, rhs));
    }

    for (i, &v) in x.iter().enumerate() {
        if v >= problem.u[i] + KKT_TOL || v <= problem.l[i] - KKT_TOL {
            return Err(GridRiskError::InvariantViolation(format!(
                "variable {} = {} outside [{}, {}]",
                i, v, problem.l[i], problem.u[i]
            )));
        }
    }

    let lhs = norm2(&sub(&mat_vec(&problem.a, x), &problem.b));
    let rhs = KKT_TOL * norm2(&problem.b);
    if lhs > rhs {
        return Err(violation("equality feasibility", lhs, rhs));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::ObjectiveEval;
    use sprs::TriMat;

    /// 0.5 ||x||^2 - x_0 subject to x_0 + x_1 = 1, 0 <= x <= 1
    struct Quadratic;

    impl Objective for Quadratic {
        fn eval(&self, x: &[f64]) -> ObjectiveEval {
            let mut hessian = TriMat::new((2, 2));
            hessian.add_triplet(0, 0, 1.0);
            hessian.add_triplet(1, 1, 1.0);
            ObjectiveEval {
                value: 0.5 * (x[0] * x[0] + x[1] * x[1]) - x[0],
                gradient: vec![x[0] - 1.0, x[1]],
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
            b: vec![1.0],
            l: vec![0.0, 0.0],
            u: vec![1.0, 1.0],
        }
    }

    fn results(x: Vec<f64>, lam: f64, pi1: f64) -> SolverResults {
        SolverResults {
            x,
            lam: vec![lam],
            mu: vec![0.0, 0.0],
            pi: vec![0.0, pi1],
            status: SolverStatus::Solved,
            iterations: 1,
            solve_time_ms: 0,
        }
    }

    #[test]
    fn test_kkt_accepts_optimum() {
        // x = (1, 0): g = (0, 0), lower bound on x_1 active with pi = 0
        check_kkt(&problem(), &Quadratic, &results(vec![1.0, 0.0], 0.0, 0.0)).unwrap();
    }

    #[test]
    fn test_kkt_rejects_bad_multipliers() {
        let err = check_kkt(&problem(), &Quadratic, &results(vec![0.5, 0.5], 0.0, 0.0)).unwrap_err();
        assert!(matches!(err, GridRiskError::InvariantViolation(_)));
    }

    #[test]
    fn test_kkt_rejects_infeasible_point() {
        // Stationary and complementary, but x_0 + x_1 = 1.5
        let mut res = results(vec![1.0, 0.5], 0.5, 0.0);
        res.mu[0] = 0.5;
        match check_kkt(&problem(), &Quadratic, &res) {
            Err(GridRiskError::InvariantViolation(msg)) => assert!(msg.starts_with("equality")),
            other => panic!("expected equality violation, got {:?}", other),
        }
    }
}

//! Interface consumed by outer stochastic-approximation drivers.

use super::{ExpectationEstimate, LagrangianSolution, RiskAverseProblem, RiskEvaluation};
use crate::dcopf::DeterministicSubproblem;
use crate::solver::SolverResults;
use gridrisk_core::GridRiskResult;
use rand::rngs::StdRng;

/// Stochastic problem with a single expected-value constraint family.
///
/// A primal-dual driver alternates sampled evaluations ([`eval_fg`]) with
/// Lagrangian subproblem solves ([`solve_lrelaxed_approx`]), projecting its
/// iterates with [`project_x`] and [`project_lam`].
///
/// [`eval_fg`]: StochasticProblem::eval_fg
/// [`solve_lrelaxed_approx`]: StochasticProblem::solve_lrelaxed_approx
/// [`project_x`]: StochasticProblem::project_x
/// [`project_lam`]: StochasticProblem::project_lam
pub trait StochasticProblem {
    fn size_x(&self) -> usize;
    fn size_lam(&self) -> usize;
    fn init_x(&mut self) -> GridRiskResult<Vec<f64>>;
    fn prop_x(&self, x: &[f64]) -> GridRiskResult<f64>;
    fn project_x(&self, x: &[f64]) -> GridRiskResult<Vec<f64>>;
    fn project_lam(&self, lam: f64) -> f64;
    fn sample_w(&self, rng: &mut StdRng) -> Vec<f64>;
    fn eval_fg(&self, x: &[f64], r: &[f64]) -> GridRiskResult<RiskEvaluation>;
    fn eval_efg(&self, x: &[f64]) -> GridRiskResult<ExpectationEstimate>;
    fn solve_lrelaxed_approx(
        &mut self,
        lam: f64,
        g_corr: Option<&[f64]>,
        j_corr: Option<&[f64]>,
        init_data: Option<&SolverResults>,
    ) -> GridRiskResult<LagrangianSolution>;
}

impl<D: DeterministicSubproblem> StochasticProblem for RiskAverseProblem<D> {
    fn size_x(&self) -> usize {
        RiskAverseProblem::size_x(self)
    }

    fn size_lam(&self) -> usize {
        RiskAverseProblem::size_lam(self)
    }

    fn init_x(&mut self) -> GridRiskResult<Vec<f64>> {
        RiskAverseProblem::init_x(self)
    }

    fn prop_x(&self, x: &[f64]) -> GridRiskResult<f64> {
        RiskAverseProblem::prop_x(self, x)
    }

    fn project_x(&self, x: &[f64]) -> GridRiskResult<Vec<f64>> {
        RiskAverseProblem::project_x(self, x)
    }

    fn project_lam(&self, lam: f64) -> f64 {
        RiskAverseProblem::project_lam(self, lam)
    }

    fn sample_w(&self, rng: &mut StdRng) -> Vec<f64> {
        self.dcopf.sample_w(rng)
    }

    fn eval_fg(&self, x: &[f64], r: &[f64]) -> GridRiskResult<RiskEvaluation> {
        RiskAverseProblem::eval_fg(self, x, r)
    }

    fn eval_efg(&self, x: &[f64]) -> GridRiskResult<ExpectationEstimate> {
        RiskAverseProblem::eval_efg(self, x)
    }

    fn solve_lrelaxed_approx(
        &mut self,
        lam: f64,
        g_corr: Option<&[f64]>,
        j_corr: Option<&[f64]>,
        init_data: Option<&SolverResults>,
    ) -> GridRiskResult<LagrangianSolution> {
        RiskAverseProblem::solve_lrelaxed_approx(self, lam, g_corr, j_corr, init_data)
    }
}

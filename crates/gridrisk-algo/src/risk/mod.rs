//! Risk-averse two-stage stochastic DC-OPF.
//!
//! [`RiskAverseProblem`] wraps a [`DeterministicSubproblem`] and adds the
//! risk threshold `t` to the decision vector `x = (p, t)`:
//!
//! ```text
//! minimize    phi0(p) + E[Q(p, r)]
//! subject to  E[(Q(p, r) - Qmax - t)_+ + (1 - gamma) t] <= 0
//!             p_min <= p <= p_max
//! ```
//!
//! The reference cost `Qref` comes from the certainty-equivalent dispatch at
//! construction; `Qmax` and the bounds on `t` are scaled by it.
//!
//! | Module | Operations |
//! |--------|------------|
//! | `measure` | [`eval_fg`](RiskAverseProblem::eval_fg), [`eval_fg_approx`](RiskAverseProblem::eval_fg_approx) |
//! | `expectation` | [`eval_efg_sequential`](RiskAverseProblem::eval_efg_sequential), [`eval_efg`](RiskAverseProblem::eval_efg) |
//! | `lagrangian`, `adapter` | [`solve_lrelaxed_approx`](RiskAverseProblem::solve_lrelaxed_approx) |
//! | `projection` | [`project_x`](RiskAverseProblem::project_x), [`project_lam`](RiskAverseProblem::project_lam) |

mod adapter;
mod driver;
mod expectation;
mod lagrangian;
mod measure;
mod projection;

pub use adapter::LagrangianSolution;
pub use driver::StochasticProblem;
pub use expectation::ExpectationEstimate;
pub use lagrangian::{LagrangianObjective, LagrangianProblem, LagrangianTemplate};
pub use measure::{hinge_risk, smoothed_risk, softplus, RiskEvaluation};

use crate::dcopf::{DeterministicSubproblem, Dimensions};
use gridrisk_core::{GridRiskError, GridRiskResult, RiskParameters};
use lagrangian::TemplateCache;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Risk-averse problem over a deterministic two-stage collaborator.
#[derive(Debug)]
pub struct RiskAverseProblem<D> {
    dcopf: D,
    params: RiskParameters,
    p_ce: Vec<f64>,
    q_ref: f64,
    q_max: f64,
    f_ref: f64,
    template: TemplateCache,
}

impl<D: DeterministicSubproblem> RiskAverseProblem<D> {
    /// Solve the certainty-equivalent problem and fix `Qref`, `Qmax`, `Fref`.
    ///
    /// `Qref` is the Monte Carlo mean recourse cost of the certainty-equivalent
    /// dispatch over `num_samples` scenarios drawn with `seed`.
    pub fn new(dcopf: D, params: RiskParameters) -> GridRiskResult<Self> {
        params.validate()?;
        let ce = dcopf.solve_approx()?;
        let eq = dcopf.eval_eq(&ce.p, params.num_samples, Some(params.seed))?;
        let q_ref = eq.q_value;
        if !q_ref.is_finite() || q_ref <= 0.0 {
            return Err(GridRiskError::Numerical(format!(
                "reference recourse cost must be positive, got {}",
                q_ref
            )));
        }
        let q_max = params.q_fac * q_ref;
        let f_ref = dcopf.data().phi0(&ce.p).0 + q_ref;
        info!(q_ref, q_max, f_ref, samples = params.num_samples, "risk-averse problem initialized");

        Ok(Self {
            dcopf,
            params,
            p_ce: ce.p,
            q_ref,
            q_max,
            f_ref,
            template: TemplateCache::Unbuilt,
        })
    }

    pub fn dcopf(&self) -> &D {
        &self.dcopf
    }

    pub fn params(&self) -> &RiskParameters {
        &self.params
    }

    pub fn dims(&self) -> Dimensions {
        self.dcopf.dims()
    }

    /// Length of `x = (p, t)`.
    pub fn size_x(&self) -> usize {
        self.dims().num_p + 1
    }

    /// Number of risk constraints.
    pub fn size_lam(&self) -> usize {
        1
    }

    /// Certainty-equivalent dispatch used for `Qref`.
    pub fn p_ce(&self) -> &[f64] {
        &self.p_ce
    }

    pub fn q_ref(&self) -> f64 {
        self.q_ref
    }

    pub fn q_max(&self) -> f64 {
        self.q_max
    }

    /// `phi0(p_ce) + Qref`
    pub fn f_ref(&self) -> f64 {
        self.f_ref
    }

    /// Absolute bounds on `t`.
    pub fn t_bounds(&self) -> (f64, f64) {
        (self.params.t_min * self.q_ref, self.params.t_max * self.q_ref)
    }

    /// Whether the Lagrangian template has been assembled yet.
    pub fn template_built(&self) -> bool {
        self.template.is_built()
    }

    /// Split `x` into `(p, t)`.
    pub(crate) fn split_x<'a>(&self, x: &'a [f64]) -> GridRiskResult<(&'a [f64], f64)> {
        GridRiskError::check_len("x", self.size_x(), x.len())?;
        let num_p = self.dims().num_p;
        Ok((&x[..num_p], x[num_p]))
    }

    /// Scalar progress property of `x`: the threshold `t`.
    pub fn prop_x(&self, x: &[f64]) -> GridRiskResult<f64> {
        Ok(self.split_x(x)?.1)
    }

    /// Lagrangian solution at `lam = 0` with `t` moved to its lower bound.
    pub fn init_x(&mut self) -> GridRiskResult<Vec<f64>> {
        let solution = self.solve_lrelaxed_approx(0.0, None, None, None)?;
        let mut x = solution.x;
        let num_p = self.dims().num_p;
        x[num_p] = self.t_bounds().0;
        Ok(x)
    }

    pub fn summary(&self) -> RiskSummary {
        let p = &self.params;
        RiskSummary {
            f_ref: self.f_ref,
            q_ref: self.q_ref,
            q_max: self.q_max,
            q_fac: p.q_fac,
            gamma: p.gamma,
            smax_param: p.smax_param,
            lam_max: p.lam_max,
            t_reg: p.t_reg,
            t_min: p.t_min,
            t_max: p.t_max,
            num_samples: p.num_samples,
            num_procs: p.num_procs,
        }
    }
}

/// Reference values and parameters of a constructed problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub f_ref: f64,
    pub q_ref: f64,
    pub q_max: f64,
    pub q_fac: f64,
    pub gamma: f64,
    pub smax_param: f64,
    pub lam_max: f64,
    pub t_reg: f64,
    pub t_min: f64,
    pub t_max: f64,
    pub num_samples: usize,
    pub num_procs: usize,
}

impl fmt::Display for RiskSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Risk-averse two-stage DC-OPF")?;
        writeln!(f, "  Fref:        {:.4e}", self.f_ref)?;
        writeln!(f, "  Qref:        {:.4e}", self.q_ref)?;
        writeln!(f, "  Qmax:        {:.4e}", self.q_max)?;
        writeln!(f, "  Qfac:        {:.2}", self.q_fac)?;
        writeln!(f, "  gamma:       {:.2}", self.gamma)?;
        writeln!(f, "  smax_param:  {:.2e}", self.smax_param)?;
        writeln!(f, "  lam_max:     {:.2e}", self.lam_max)?;
        writeln!(f, "  t_reg:       {:.2e}", self.t_reg)?;
        writeln!(f, "  t_min:       {:.2}", self.t_min)?;
        writeln!(f, "  t_max:       {:.2}", self.t_max)?;
        writeln!(f, "  num_samples: {}", self.num_samples)?;
        write!(f, "  num_procs:   {}", self.num_procs)
    }
}

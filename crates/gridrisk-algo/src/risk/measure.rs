//! Exact and smoothed evaluation of the objective and the risk constraint.
//!
//! The exact constraint is the CVaR hinge
//!
//! ```text
//! G(p, t, r) = max(Q(p, r) - Qmax - t, 0) + (1 - gamma) t
//! ```
//!
//! and the smooth approximation replaces the hinge by a scaled softplus with
//! sharpness `smax_param`, evaluated through shifted exponentials so that
//! neither branch overflows.

use super::RiskAverseProblem;
use crate::dcopf::{DeterministicSubproblem, RecourseProblem, RecourseValue};
use gridrisk_core::GridRiskResult;
use serde::{Deserialize, Serialize};

/// Objective and constraint values with their gradients in `x = (p, t)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEvaluation {
    pub f: f64,
    pub g_f: Vec<f64>,
    pub g: f64,
    pub j_g: Vec<f64>,
    /// 1 if `Q <= Qmax`, else 0. Averages to a reliability estimate.
    pub indicator: f64,
}

impl RiskEvaluation {
    pub(crate) fn zeros(size_x: usize) -> Self {
        Self {
            f: 0.0,
            g_f: vec![0.0; size_x],
            g: 0.0,
            j_g: vec![0.0; size_x],
            indicator: 0.0,
        }
    }
}

/// `(ln(1 + e^beta), 1 / (1 + e^-beta))` without overflow for large `|beta|`.
pub fn softplus(beta: f64) -> (f64, f64) {
    let a = beta.max(0.0);
    let lo = (-a).exp();
    let hi = (beta - a).exp();
    let sum = lo + hi;
    (a + sum.ln(), hi / sum)
}

/// Exact CVaR hinge at `sigma = Q - Qmax - t`.
///
/// Returns the constraint value and whether the hinge is active. The kink
/// `sigma = 0` counts as active.
pub fn hinge_risk(sigma: f64, t: f64, gamma: f64) -> (f64, bool) {
    (sigma.max(0.0) + (1.0 - gamma) * t, sigma >= 0.0)
}

/// Smoothed CVaR constraint and its slope `C = sigmoid(beta)`.
pub fn smoothed_risk(q_value: f64, q_max: f64, t: f64, q_ref: f64, smax: f64, gamma: f64) -> (f64, f64) {
    let beta = smax * (q_value - q_max - t) / q_ref;
    let (log_term, slope) = softplus(beta);
    (q_ref * log_term / smax + (1.0 - gamma) * t, slope)
}

impl<D: DeterministicSubproblem> RiskAverseProblem<D> {
    /// Exact `F`, `G` and their gradients for scenario `r`.
    pub fn eval_fg(&self, x: &[f64], r: &[f64]) -> GridRiskResult<RiskEvaluation> {
        let p = self.split_x(x)?.0;
        let problem = self.dcopf.recourse_problem(p, r)?;
        self.eval_fg_with(x, &problem)
    }

    /// As [`eval_fg`](Self::eval_fg) on a prepared recourse problem.
    pub fn eval_fg_with(&self, x: &[f64], problem: &RecourseProblem) -> GridRiskResult<RiskEvaluation> {
        let (p, t) = self.split_x(x)?;
        let recourse = self.dcopf.eval_q_with(problem)?;
        Ok(self.exact_evaluation(p, t, &recourse))
    }

    fn exact_evaluation(&self, p: &[f64], t: f64, recourse: &RecourseValue) -> RiskEvaluation {
        let RecourseValue { q_value, gradient } = recourse;
        let (phi0, gphi0) = self.dcopf.data().phi0(p);
        let gamma = self.params.gamma;

        let mut g_f: Vec<f64> = gphi0.iter().zip(gradient).map(|(a, b)| a + b).collect();
        g_f.push(0.0);

        let (g, active) = hinge_risk(q_value - self.q_max - t, t, gamma);
        let mut j_g = if active { gradient.clone() } else { vec![0.0; p.len()] };
        j_g.push(if active { -1.0 + (1.0 - gamma) } else { 1.0 - gamma });

        RiskEvaluation {
            f: phi0 + q_value,
            g_f,
            g,
            j_g,
            indicator: if *q_value <= self.q_max { 1.0 } else { 0.0 },
        }
    }

    /// Smooth approximation at the expected renewable output.
    pub fn eval_fg_approx(&self, x: &[f64]) -> GridRiskResult<RiskEvaluation> {
        let (p, t) = self.split_x(x)?;
        let recourse = self.dcopf.eval_q(p, &self.dcopf.data().er)?;
        Ok(self.smoothed_evaluation(p, t, &recourse))
    }

    pub(crate) fn smoothed_evaluation(&self, p: &[f64], t: f64, recourse: &RecourseValue) -> RiskEvaluation {
        let RecourseValue { q_value, gradient } = recourse;
        let params = &self.params;
        let (phi0, gphi0) = self.dcopf.data().phi0(p);

        let mut g_f: Vec<f64> = gphi0.iter().zip(gradient).map(|(a, b)| a + b).collect();
        g_f.push(params.t_reg * t);

        let (g, c) = smoothed_risk(*q_value, self.q_max, t, self.q_ref, params.smax_param, params.gamma);
        let mut j_g: Vec<f64> = gradient.iter().map(|v| c * v).collect();
        j_g.push(-c + 1.0 - params.gamma);

        RiskEvaluation {
            f: phi0 + q_value + 0.5 * params.t_reg * t * t,
            g_f,
            g,
            j_g,
            indicator: if *q_value <= self.q_max { 1.0 } else { 0.0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hinge_active_example() {
        // Qref = 10, Qmax = 8, gamma = 0.95, t = -0.5, Q = 9
        let (g, active) = hinge_risk(9.0 - 8.0 + 0.5, -0.5, 0.95);
        assert!(active);
        assert!((g - 1.475).abs() < 1e-12);
    }

    #[test]
    fn test_hinge_inactive() {
        let (g, active) = hinge_risk(-1.0, -0.5, 0.95);
        assert!(!active);
        assert!((g + 0.025).abs() < 1e-12);
    }

    #[test]
    fn test_hinge_kink_is_active() {
        let (g, active) = hinge_risk(0.0, 1.0, 0.9);
        assert!(active);
        assert!((g - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_softplus_finite_at_extremes() {
        let (v, s) = softplus(1e6);
        assert!(v.is_finite() && (v - 1e6).abs() < 1e-6);
        assert_eq!(s, 1.0);

        let (v, s) = softplus(-1e6);
        assert!(v.is_finite() && v.abs() < 1e-12);
        assert!(s.abs() < 1e-12);
    }

    #[test]
    fn test_softplus_at_zero() {
        let (v, s) = softplus(0.0);
        assert!((v - std::f64::consts::LN_2).abs() < 1e-15);
        assert!((s - 0.5).abs() < 1e-15);
    }

    #[test]
    fn test_smoothed_risk_converges_to_hinge() {
        let (q, q_max, t, q_ref, gamma) = (9.0, 8.0, -0.5, 10.0, 0.95);
        let (exact, _) = hinge_risk(q - q_max - t, t, gamma);
        let mut prev_gap = f64::INFINITY;
        for smax in [1.0, 10.0, 100.0, 1000.0] {
            let (approx, _) = smoothed_risk(q, q_max, t, q_ref, smax, gamma);
            // Softplus over-approximates the hinge
            let gap = approx - exact;
            assert!(gap >= -1e-12);
            assert!(gap <= prev_gap);
            prev_gap = gap;
        }
        assert!(prev_gap < 1e-3);
    }

    #[test]
    fn test_smoothed_slope_is_sigmoid() {
        let (_, c) = smoothed_risk(8.0, 8.0, 0.0, 10.0, 100.0, 0.95);
        assert!((c - 0.5).abs() < 1e-12);
        let (_, c) = smoothed_risk(20.0, 8.0, 0.0, 10.0, 100.0, 0.95);
        assert!((c - 1.0).abs() < 1e-12);
    }
}

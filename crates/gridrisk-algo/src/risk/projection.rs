use super::RiskAverseProblem;
use crate::dcopf::DeterministicSubproblem;
use gridrisk_core::GridRiskResult;

impl<D: DeterministicSubproblem> RiskAverseProblem<D> {
    /// Clip `p` into the generator limits and `t` into `[t_min Qref, t_max Qref]`.
    pub fn project_x(&self, x: &[f64]) -> GridRiskResult<Vec<f64>> {
        let (p, t) = self.split_x(x)?;
        let (t_lo, t_hi) = self.t_bounds();
        let mut projected = self.dcopf.project_x(p);
        projected.push(t.clamp(t_lo, t_hi));
        Ok(projected)
    }

    /// Clip `lam` into `[0, lam_max]`.
    pub fn project_lam(&self, lam: f64) -> f64 {
        lam.clamp(0.0, self.params.lam_max)
    }
}

//! Lagrangian-relaxed smooth subproblem.
//!
//! The subproblem lives on `(p, t, q, w, s, y, z)`: the stage-1 pair `x`
//! followed by the recourse variables at the expected renewable output. Its
//! constraints never depend on the multiplier, so they are assembled once
//! into a [`LagrangianTemplate`] and reused; only the objective carries
//! `lam` and the correction terms.

use crate::dcopf::{Dimensions, TwoStageData};
use crate::solver::{ConvexProblem, Objective, ObjectiveEval};
use gridrisk_core::linalg::{add_block, add_lower_block, add_scaled_identity};
use gridrisk_core::{GridRiskError, GridRiskResult};
use sprs::TriMat;

use super::measure::softplus;

/// Fixed constraint data `(A, b, l, u)` of the Lagrangian subproblem.
#[derive(Debug, Clone, PartialEq)]
pub struct LagrangianTemplate {
    problem: ConvexProblem,
    dims: Dimensions,
}

impl LagrangianTemplate {
    /// Assemble the constraints for `t` in `[t_lo, t_hi]`.
    pub(crate) fn build(data: &TwoStageData, t_lo: f64, t_hi: f64) -> Self {
        let dims = data.dims;
        let Dimensions {
            num_p,
            num_w,
            num_r,
            num_bus,
            num_br,
        } = dims;
        let n = 3 * num_p + 1 + num_w + num_r + num_br;
        let off_q = num_p + 1;
        let off_w = off_q + num_p;
        let off_s = off_w + num_w;
        let off_y = off_s + num_r;
        let off_z = off_y + num_p;

        let m = num_bus + num_p + num_br;
        let mut a = TriMat::new((m, n));
        add_block(&mut a, 0, 0, &data.g, 1.0);
        add_block(&mut a, 0, off_q, &data.g, 1.0);
        add_block(&mut a, 0, off_w, &data.a, -1.0);
        add_block(&mut a, 0, off_s, &data.r, 1.0);
        add_scaled_identity(&mut a, num_bus, 0, num_p, 1.0);
        add_scaled_identity(&mut a, num_bus, off_q, num_p, 1.0);
        add_scaled_identity(&mut a, num_bus, off_y, num_p, -1.0);
        add_block(&mut a, num_bus + num_p, off_w, &data.j, 1.0);
        add_scaled_identity(&mut a, num_bus + num_p, off_z, num_br, -1.0);
        let mut b = vec![0.0; m];
        b[..num_bus].copy_from_slice(&data.b);

        let q_range = data.q_range();
        let mut l = Vec::with_capacity(n);
        let mut u = Vec::with_capacity(n);
        l.extend_from_slice(&data.p_min);
        u.extend_from_slice(&data.p_max);
        l.push(t_lo);
        u.push(t_hi);
        l.extend(q_range.iter().map(|v| -v));
        u.extend_from_slice(&q_range);
        l.extend(std::iter::repeat(f64::NEG_INFINITY).take(num_w));
        u.extend(std::iter::repeat(f64::INFINITY).take(num_w));
        l.extend(std::iter::repeat(0.0).take(num_r));
        u.extend_from_slice(&data.er);
        l.extend_from_slice(&data.p_min);
        u.extend_from_slice(&data.p_max);
        l.extend_from_slice(&data.z_min);
        u.extend_from_slice(&data.z_max);

        Self {
            problem: ConvexProblem {
                a: a.to_csr(),
                b,
                l,
                u,
            },
            dims,
        }
    }

    pub fn problem(&self) -> &ConvexProblem {
        &self.problem
    }

    pub fn num_vars(&self) -> usize {
        self.problem.num_vars()
    }

    /// Index of `t` in the full variable vector.
    pub fn t_index(&self) -> usize {
        self.dims.num_p
    }

    /// Index range of `q` in the full variable vector.
    pub fn q_range(&self) -> std::ops::Range<usize> {
        let start = self.dims.num_p + 1;
        start..start + self.dims.num_p
    }
}

/// Lazily built template held by the owning problem.
#[derive(Debug, Clone, Default)]
pub(crate) enum TemplateCache {
    #[default]
    Unbuilt,
    Built(LagrangianTemplate),
}

impl TemplateCache {
    pub(crate) fn get_or_build(
        &mut self,
        build: impl FnOnce() -> LagrangianTemplate,
    ) -> GridRiskResult<&LagrangianTemplate> {
        if let TemplateCache::Unbuilt = self {
            *self = TemplateCache::Built(build());
        }
        match self {
            TemplateCache::Built(template) => Ok(template),
            TemplateCache::Unbuilt => Err(GridRiskError::InvariantViolation(
                "Lagrangian template missing after build".into(),
            )),
        }
    }

    pub(crate) fn is_built(&self) -> bool {
        matches!(self, TemplateCache::Built(_))
    }
}

/// Smoothed Lagrangian for a fixed multiplier and correction terms.
///
/// ```text
/// phi(x) = phi0(p) + phi1(q) + 0.5 t_reg t^2
///        + lam (Qref/smax softplus(beta) + (1 - gamma) t)
///        + (eta + lam nu)'(p, t)
/// beta   = smax (phi1(q) - Qmax - t) / Qref
/// ```
#[derive(Debug, Clone)]
pub struct LagrangianObjective<'a> {
    pub(crate) data: &'a TwoStageData,
    pub(crate) lam: f64,
    pub(crate) eta: Vec<f64>,
    pub(crate) nu: Vec<f64>,
    pub(crate) q_ref: f64,
    pub(crate) q_max: f64,
    pub(crate) smax: f64,
    pub(crate) gamma: f64,
    pub(crate) t_reg: f64,
}

/// Pieces of the objective shared by value and derivative evaluation.
struct Terms {
    value: f64,
    gphi0: Vec<f64>,
    gphi1: Vec<f64>,
    sigmoid: f64,
}

impl LagrangianObjective<'_> {
    fn terms(&self, x: &[f64]) -> Terms {
        let num_p = self.data.dims.num_p;
        let p = &x[..num_p];
        let t = x[num_p];
        let q = &x[num_p + 1..2 * num_p + 1];
        let lam = self.lam;

        let (phi0, gphi0) = self.data.phi0(p);
        let (phi1, gphi1) = self.data.phi1(q);
        let beta = self.smax * (phi1 - self.q_max - t) / self.q_ref;
        let (log_term, sigmoid) = softplus(beta);

        let linear: f64 = self
            .eta
            .iter()
            .zip(&self.nu)
            .zip(x)
            .map(|((e, n), v)| (e + lam * n) * v)
            .sum();
        let value = phi0
            + phi1
            + 0.5 * self.t_reg * t * t
            + lam * self.q_ref * log_term / self.smax
            + lam * (1.0 - self.gamma) * t
            + linear;

        Terms {
            value,
            gphi0,
            gphi1,
            sigmoid,
        }
    }
}

impl Objective for LagrangianObjective<'_> {
    fn eval(&self, x: &[f64]) -> ObjectiveEval {
        let n = x.len();
        let num_p = self.data.dims.num_p;
        let t_idx = num_p;
        let q0 = num_p + 1;
        let lam = self.lam;
        let Terms {
            value,
            gphi0,
            gphi1,
            sigmoid: c1,
        } = self.terms(x);
        let c2 = self.smax / self.q_ref * c1 * (1.0 - c1);

        let mut gradient = vec![0.0; n];
        for i in 0..num_p {
            gradient[i] = gphi0[i] + self.eta[i] + lam * self.nu[i];
            gradient[q0 + i] = (1.0 + lam * c1) * gphi1[i];
        }
        gradient[t_idx] =
            self.t_reg * x[t_idx] + lam * (-c1 + 1.0 - self.gamma) + self.eta[t_idx] + lam * self.nu[t_idx];

        let mut hessian = TriMat::new((n, n));
        add_lower_block(&mut hessian, 0, &self.data.h0, 1.0);
        hessian.add_triplet(t_idx, t_idx, self.t_reg + lam * c2);
        add_lower_block(&mut hessian, q0, &self.data.h1, 1.0 + lam * c1);
        let curvature = lam * c2;
        if curvature != 0.0 {
            for (i, gi) in gphi1.iter().enumerate() {
                if *gi == 0.0 {
                    continue;
                }
                hessian.add_triplet(q0 + i, t_idx, -curvature * gi);
                for (j, gj) in gphi1.iter().enumerate().take(i + 1) {
                    if *gj != 0.0 {
                        hessian.add_triplet(q0 + i, q0 + j, curvature * gi * gj);
                    }
                }
            }
        }

        ObjectiveEval {
            value,
            gradient,
            hessian,
        }
    }

    fn value(&self, x: &[f64]) -> f64 {
        self.terms(x).value
    }
}

/// Template plus objective, ready for the LCCP solver.
#[derive(Debug)]
pub struct LagrangianProblem<'a> {
    pub template: &'a LagrangianTemplate,
    pub objective: LagrangianObjective<'a>,
}

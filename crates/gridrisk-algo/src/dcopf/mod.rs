//! Two-stage DC-OPF collaborator.
//!
//! The risk engine never looks at network topology. It consumes the matrices
//! of the deterministic two-stage problem through [`DeterministicSubproblem`]:
//!
//! ```text
//! stage 1:   phi0(p) = 0.5 p'H0 p + g0'p,        p_min <= p <= p_max
//!
//! stage 2:   Q(p, r) = min  phi1(q) = 0.5 q'H1 q + g1'q
//!                      s.t. G(p + q) + R s - A w = b      (power balance)
//!                           p_min <= p + q <= p_max       (via y = p + q)
//!                           z_min <= J w <= z_max         (branch flows)
//!                           0 <= s <= r                   (renewables)
//! ```
//!
//! `w` holds the bus angles without the slack bus, so `A` has full column
//! rank and every recourse variable is pinned down by the equalities.
//!
//! [`TwoStageDcopf`] is the concrete implementation built from small
//! bus/generator/branch tables; other implementations only need to supply
//! [`DeterministicSubproblem::data`] and a sampler.

mod recourse;
mod two_stage;

pub use recourse::RecourseProblem;
pub use two_stage::{
    BranchSpec, GeneratorSpec, RenewableForecast, RenewableSpec, TwoStageDcopf, TwoStageDcopfBuilder,
};

use crate::solver::QuadraticProgram;
use gridrisk_core::linalg::{add, add_block, add_lower_block, add_scaled_identity, clip, dot, mat_vec};
use gridrisk_core::{GridRiskError, GridRiskResult};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use sprs::{CsMat, TriMat};

/// Problem dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Generators (length of `p` and `q`)
    pub num_p: usize,
    /// Non-slack bus angles
    pub num_w: usize,
    /// Renewable sources
    pub num_r: usize,
    pub num_bus: usize,
    /// Branches (length of `z`)
    pub num_br: usize,
}

/// Cost and constraint matrices of the two-stage problem.
#[derive(Debug, Clone, PartialEq)]
pub struct TwoStageData {
    pub dims: Dimensions,
    /// Stage-1 cost Hessian (num_p x num_p)
    pub h0: CsMat<f64>,
    pub g0: Vec<f64>,
    /// Stage-2 adjustment cost Hessian (num_p x num_p)
    pub h1: CsMat<f64>,
    pub g1: Vec<f64>,
    /// Generator-to-bus incidence (num_bus x num_p)
    pub g: CsMat<f64>,
    /// Renewable-to-bus incidence (num_bus x num_r)
    pub r: CsMat<f64>,
    /// Reduced susceptance matrix (num_bus x num_w)
    pub a: CsMat<f64>,
    /// Branch flow matrix (num_br x num_w)
    pub j: CsMat<f64>,
    /// Bus loads
    pub b: Vec<f64>,
    pub p_min: Vec<f64>,
    pub p_max: Vec<f64>,
    pub z_min: Vec<f64>,
    pub z_max: Vec<f64>,
    /// Expected renewable output
    pub er: Vec<f64>,
}

impl TwoStageData {
    /// `(phi0(p), H0 p + g0)`
    pub fn phi0(&self, p: &[f64]) -> (f64, Vec<f64>) {
        quadratic(&self.h0, &self.g0, p)
    }

    /// `(phi1(q), H1 q + g1)`
    pub fn phi1(&self, q: &[f64]) -> (f64, Vec<f64>) {
        quadratic(&self.h1, &self.g1, q)
    }

    /// Generation adjustment range `p_max - p_min`.
    pub fn q_range(&self) -> Vec<f64> {
        self.p_max.iter().zip(&self.p_min).map(|(u, l)| u - l).collect()
    }
}

fn quadratic(h: &CsMat<f64>, g: &[f64], x: &[f64]) -> (f64, Vec<f64>) {
    let hx = mat_vec(h, x);
    let value = 0.5 * dot(x, &hx) + dot(g, x);
    (value, add(&hx, g))
}

/// Optimal recourse cost and its subgradient with respect to `p`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecourseValue {
    pub q_value: f64,
    pub gradient: Vec<f64>,
}

/// Certainty-equivalent baseline: the two-stage problem at `r = Er`.
#[derive(Debug, Clone)]
pub struct CertaintyEquivalent {
    pub p: Vec<f64>,
    /// `H0 p + g0 + gQ` at the solution
    pub g_f: Vec<f64>,
    pub objective: f64,
    pub iterations: u32,
}

/// Deterministic two-stage DC-OPF seen by the risk engine.
///
/// Everything but [`data`](Self::data) and [`sample_w`](Self::sample_w) has
/// a default implementation in terms of the problem matrices.
pub trait DeterministicSubproblem: Send + Sync {
    fn data(&self) -> &TwoStageData;

    /// Draw a renewable scenario from the forecast distribution.
    fn sample_w(&self, rng: &mut StdRng) -> Vec<f64>;

    fn dims(&self) -> Dimensions {
        self.data().dims
    }

    /// Recourse QP for dispatch `p` with renewable availability `r`.
    fn recourse_problem(&self, p: &[f64], r: &[f64]) -> GridRiskResult<RecourseProblem> {
        RecourseProblem::new(self.data(), p, r)
    }

    /// Solve a (possibly mutated) recourse problem.
    ///
    /// The gradient follows from substituting `y = p + q`: only the cost
    /// `phi1(y - p)` depends on `p`, so `gQ = -(H1 q* + g1)`.
    fn eval_q_with(&self, problem: &RecourseProblem) -> GridRiskResult<RecourseValue> {
        let sol = problem.solve()?;
        let q = problem.recourse_q(&sol.x);
        let (q_value, gphi1) = self.data().phi1(q);
        Ok(RecourseValue {
            q_value,
            gradient: gphi1.iter().map(|v| -v).collect(),
        })
    }

    fn eval_q(&self, p: &[f64], r: &[f64]) -> GridRiskResult<RecourseValue> {
        let problem = self.recourse_problem(p, r)?;
        self.eval_q_with(&problem)
    }

    /// Monte Carlo estimate of `E[Q(p, r)]` and `E[gQ]`.
    fn eval_eq(&self, p: &[f64], num_samples: usize, seed: Option<u64>) -> GridRiskResult<RecourseValue> {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut problem = self.recourse_problem(p, &self.data().er)?;
        let mut mean = RecourseValue {
            q_value: 0.0,
            gradient: vec![0.0; p.len()],
        };
        for k in 1..=num_samples {
            let r = self.sample_w(&mut rng);
            problem.set_renewables(&r)?;
            let value = self.eval_q_with(&problem)?;
            let count = k as f64;
            mean.q_value += (value.q_value - mean.q_value) / count;
            for (m, v) in mean.gradient.iter_mut().zip(&value.gradient) {
                *m += (v - *m) / count;
            }
        }
        Ok(mean)
    }

    /// Clip `p` into the generator limits.
    fn project_x(&self, p: &[f64]) -> Vec<f64> {
        let data = self.data();
        clip(p, &data.p_min, &data.p_max)
    }

    /// Solve the certainty-equivalent problem over `(p, q, w, s, y, z)`.
    fn solve_approx(&self) -> GridRiskResult<CertaintyEquivalent> {
        let data = self.data();
        let Dimensions {
            num_p,
            num_w,
            num_r,
            num_bus,
            num_br,
        } = data.dims;
        let n = 3 * num_p + num_w + num_r + num_br;
        let (off_q, off_w) = (num_p, 2 * num_p);
        let off_s = off_w + num_w;
        let off_y = off_s + num_r;
        let off_z = off_y + num_p;

        let mut p_mat = TriMat::new((n, n));
        add_lower_block(&mut p_mat, 0, &data.h0, 1.0);
        add_lower_block(&mut p_mat, off_q, &data.h1, 1.0);
        let mut cost = vec![0.0; n];
        cost[..num_p].copy_from_slice(&data.g0);
        cost[off_q..off_w].copy_from_slice(&data.g1);

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

        let qp = QuadraticProgram {
            p: crate::solver::upper_from_lower(&p_mat),
            q: cost,
            a: a.to_csr(),
            b,
            l,
            u,
        };
        let sol = qp.solve()?;

        let p = sol.x[..num_p].to_vec();
        let q = &sol.x[off_q..off_w];
        let (phi0, gphi0) = data.phi0(&p);
        let (phi1, gphi1) = data.phi1(q);
        let g_f = gphi0.iter().zip(&gphi1).map(|(a, b)| a - b).collect();

        Ok(CertaintyEquivalent {
            p,
            g_f,
            objective: phi0 + phi1,
            iterations: sol.iterations,
        })
    }
}

/// Length check shared by the recourse and risk modules.
pub(crate) fn check_dispatch(dims: &Dimensions, p: &[f64]) -> GridRiskResult<()> {
    GridRiskError::check_len("dispatch p", dims.num_p, p.len())
}

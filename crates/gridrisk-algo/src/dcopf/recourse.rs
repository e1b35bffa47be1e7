//! Mutable second-stage problem.
//!
//! Variables are ordered `(q, w, s, y, z)`. The only scenario-dependent data
//! is the upper bound of `s`, which sits at offset `num_p + num_w` of the
//! bound vector. Monte Carlo loops build one problem per dispatch and then
//! overwrite that slice per sample instead of rebuilding the matrices.

use super::{check_dispatch, Dimensions, TwoStageData};
use crate::solver::{upper_from_lower, QpSolution, QuadraticProgram};
use gridrisk_core::linalg::{add_block, add_lower_block, add_scaled_identity, mat_vec};
use gridrisk_core::{GridRiskError, GridRiskResult};
use sprs::TriMat;

/// Recourse QP for a fixed stage-1 dispatch.
#[derive(Debug, Clone)]
pub struct RecourseProblem {
    qp: QuadraticProgram,
    dims: Dimensions,
}

impl RecourseProblem {
    /// Build the recourse problem at dispatch `p` and renewable availability `r`.
    pub fn new(data: &TwoStageData, p: &[f64], r: &[f64]) -> GridRiskResult<Self> {
        let dims = data.dims;
        check_dispatch(&dims, p)?;
        GridRiskError::check_len("renewable scenario", dims.num_r, r.len())?;
        let Dimensions {
            num_p,
            num_w,
            num_r,
            num_bus,
            num_br,
        } = dims;

        let n = 2 * num_p + num_w + num_r + num_br;
        let off_w = num_p;
        let off_s = off_w + num_w;
        let off_y = off_s + num_r;
        let off_z = off_y + num_p;

        let mut p_mat = TriMat::new((n, n));
        add_lower_block(&mut p_mat, 0, &data.h1, 1.0);
        let mut cost = vec![0.0; n];
        cost[..num_p].copy_from_slice(&data.g1);

        // G q - A w + R s = b - G p
        // q - y           = -p
        // J w - z         = 0
        let m = num_bus + num_p + num_br;
        let mut a = TriMat::new((m, n));
        add_block(&mut a, 0, 0, &data.g, 1.0);
        add_block(&mut a, 0, off_w, &data.a, -1.0);
        add_block(&mut a, 0, off_s, &data.r, 1.0);
        add_scaled_identity(&mut a, num_bus, 0, num_p, 1.0);
        add_scaled_identity(&mut a, num_bus, off_y, num_p, -1.0);
        add_block(&mut a, num_bus + num_p, off_w, &data.j, 1.0);
        add_scaled_identity(&mut a, num_bus + num_p, off_z, num_br, -1.0);

        let gp = mat_vec(&data.g, p);
        let mut b = Vec::with_capacity(m);
        b.extend(data.b.iter().zip(&gp).map(|(load, inj)| load - inj));
        b.extend(p.iter().map(|v| -v));
        b.extend(std::iter::repeat(0.0).take(num_br));

        let q_range = data.q_range();
        let mut l = Vec::with_capacity(n);
        let mut u = Vec::with_capacity(n);
        l.extend(q_range.iter().map(|v| -v));
        u.extend_from_slice(&q_range);
        l.extend(std::iter::repeat(f64::NEG_INFINITY).take(num_w));
        u.extend(std::iter::repeat(f64::INFINITY).take(num_w));
        l.extend(std::iter::repeat(0.0).take(num_r));
        u.extend_from_slice(r);
        l.extend_from_slice(&data.p_min);
        u.extend_from_slice(&data.p_max);
        l.extend_from_slice(&data.z_min);
        u.extend_from_slice(&data.z_max);

        Ok(Self {
            qp: QuadraticProgram {
                p: upper_from_lower(&p_mat),
                q: cost,
                a: a.to_csr(),
                b,
                l,
                u,
            },
            dims,
        })
    }

    fn renewable_range(&self) -> std::ops::Range<usize> {
        let start = self.dims.num_p + self.dims.num_w;
        start..start + self.dims.num_r
    }

    /// Overwrite the renewable upper bounds in place.
    pub fn set_renewables(&mut self, r: &[f64]) -> GridRiskResult<()> {
        GridRiskError::check_len("renewable scenario", self.dims.num_r, r.len())?;
        let range = self.renewable_range();
        self.qp.u[range].copy_from_slice(r);
        Ok(())
    }

    /// Current renewable upper bounds.
    pub fn renewables(&self) -> &[f64] {
        &self.qp.u[self.renewable_range()]
    }

    /// The `q` block of a solution vector.
    pub fn recourse_q<'a>(&self, x: &'a [f64]) -> &'a [f64] {
        &x[..self.dims.num_p]
    }

    pub fn solve(&self) -> GridRiskResult<QpSolution> {
        self.qp.solve()
    }
}

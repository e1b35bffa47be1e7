//! Convex quadratic programs solved with Clarabel.
//!
//! ```text
//! minimize    (1/2) x'Px + q'x
//! subject to  A x = b
//!             l <= x <= u
//! ```
//!
//! Clarabel works in the conic form `Ax + s = b, s ∈ K`. Equalities go to a
//! zero cone; every *finite* bound becomes one row of a nonnegative cone
//! (`x_i + s = u_i` for upper bounds, `-x_i + s = -l_i` for lower bounds).
//! Infinite bounds produce no row and get a zero dual.
//!
//! Duals are reported in the convention used throughout the crate:
//!
//! ```text
//! P x + q - A'lam + mu - pi = 0,    mu, pi >= 0
//! ```
//!
//! Clarabel's stationarity is `Px + q + A'z = 0`, so `lam = -z_eq`,
//! `mu = z_upper`, `pi = z_lower`.

use clarabel::{
    algebra::CscMatrix,
    solver::{DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus, SupportedConeT},
};
use gridrisk_core::linalg::add_block;
use gridrisk_core::{GridRiskError, GridRiskResult};
use sprs::{CsMat, TriMat};

/// Quadratic program with linear equalities and variable bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadraticProgram {
    /// Upper triangle of the PSD cost matrix (n x n)
    pub p: CsMat<f64>,
    /// Linear cost (n)
    pub q: Vec<f64>,
    /// Equality matrix (m x n)
    pub a: CsMat<f64>,
    /// Equality right-hand side (m)
    pub b: Vec<f64>,
    /// Lower bounds (n), `-inf` for free
    pub l: Vec<f64>,
    /// Upper bounds (n), `+inf` for free
    pub u: Vec<f64>,
}

/// Primal/dual solution of a [`QuadraticProgram`].
#[derive(Debug, Clone)]
pub struct QpSolution {
    pub x: Vec<f64>,
    /// Equality multipliers
    pub lam: Vec<f64>,
    /// Upper-bound multipliers (one per variable)
    pub mu: Vec<f64>,
    /// Lower-bound multipliers (one per variable)
    pub pi: Vec<f64>,
    pub objective: f64,
    pub iterations: u32,
}

/// Convert an `sprs` matrix into Clarabel's CSC type.
pub(crate) fn to_clarabel(m: &CsMat<f64>) -> CscMatrix<f64> {
    let csc = m.to_csc();
    CscMatrix::new(
        csc.rows(),
        csc.cols(),
        csc.indptr().raw_storage().to_vec(),
        csc.indices().to_vec(),
        csc.data().to_vec(),
    )
}

/// Upper-triangular CSC matrix holding the transpose of a lower triangle.
pub fn upper_from_lower(lower: &TriMat<f64>) -> CsMat<f64> {
    let mut upper = TriMat::with_capacity((lower.cols(), lower.rows()), lower.nnz());
    for (&v, (i, j)) in lower.triplet_iter() {
        upper.add_triplet(j, i, v);
    }
    upper.to_csc()
}

impl QuadraticProgram {
    pub fn num_vars(&self) -> usize {
        self.q.len()
    }

    /// Solve with Clarabel. Any status other than (almost) solved is an error.
    pub fn solve(&self) -> GridRiskResult<QpSolution> {
        let n = self.num_vars();
        let m_eq = self.b.len();
        GridRiskError::check_len("QP upper bounds", n, self.u.len())?;
        GridRiskError::check_len("QP lower bounds", n, self.l.len())?;

        let upper_idx: Vec<usize> = (0..n).filter(|&i| self.u[i].is_finite()).collect();
        let lower_idx: Vec<usize> = (0..n).filter(|&i| self.l[i].is_finite()).collect();
        let n_rows = m_eq + upper_idx.len() + lower_idx.len();

        // Stack [A; I_upper; -I_lower]
        let mut rows = TriMat::new((n_rows, n));
        add_block(&mut rows, 0, 0, &self.a, 1.0);
        let mut rhs = self.b.clone();
        for (k, &i) in upper_idx.iter().enumerate() {
            rows.add_triplet(m_eq + k, i, 1.0);
            rhs.push(self.u[i]);
        }
        let lower_start = m_eq + upper_idx.len();
        for (k, &i) in lower_idx.iter().enumerate() {
            rows.add_triplet(lower_start + k, i, -1.0);
            rhs.push(-self.l[i]);
        }
        let a_stack: CsMat<f64> = rows.to_csc();

        let mut cones = Vec::with_capacity(2);
        if m_eq > 0 {
            cones.push(SupportedConeT::ZeroConeT(m_eq));
        }
        if n_rows > m_eq {
            cones.push(SupportedConeT::NonnegativeConeT(n_rows - m_eq));
        }

        let settings = DefaultSettingsBuilder::default()
            .verbose(false)
            .build()
            .map_err(|e| GridRiskError::Numerical(format!("Clarabel settings error: {:?}", e)))?;

        let p_mat = to_clarabel(&self.p);
        let a_mat = to_clarabel(&a_stack);
        let mut solver = DefaultSolver::new(&p_mat, &self.q, &a_mat, &rhs, &cones, settings)
            .map_err(|e| GridRiskError::Numerical(format!("Clarabel initialization failed: {:?}", e)))?;

        solver.solve();

        let sol = &solver.solution;
        if !matches!(sol.status, SolverStatus::Solved | SolverStatus::AlmostSolved) {
            return Err(GridRiskError::SolverNonConvergence {
                solver: "clarabel".into(),
                status: format!("{:?}", sol.status),
            });
        }

        let z = &sol.z;
        let lam = z[..m_eq].iter().map(|v| -v).collect();
        let mut mu = vec![0.0; n];
        for (k, &i) in upper_idx.iter().enumerate() {
            mu[i] = z[m_eq + k];
        }
        let mut pi = vec![0.0; n];
        for (k, &i) in lower_idx.iter().enumerate() {
            pi[i] = z[lower_start + k];
        }

        Ok(QpSolution {
            x: sol.x.clone(),
            lam,
            mu,
            pi,
            objective: sol.obj_val,
            iterations: sol.iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// min 0.5 (x0² + x1²)  s.t.  x0 + x1 = 2,  x0 <= 0.5
    fn small_qp() -> QuadraticProgram {
        let mut p = TriMat::new((2, 2));
        p.add_triplet(0, 0, 1.0);
        p.add_triplet(1, 1, 1.0);
        let mut a = TriMat::new((1, 2));
        a.add_triplet(0, 0, 1.0);
        a.add_triplet(0, 1, 1.0);
        QuadraticProgram {
            p: p.to_csc(),
            q: vec![0.0, 0.0],
            a: a.to_csr(),
            b: vec![2.0],
            l: vec![f64::NEG_INFINITY, f64::NEG_INFINITY],
            u: vec![0.5, f64::INFINITY],
        }
    }

    #[test]
    fn test_bound_active_solution() {
        let sol = small_qp().solve().expect("QP should solve");
        assert!((sol.x[0] - 0.5).abs() < 1e-6);
        assert!((sol.x[1] - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_dual_sign_convention() {
        let sol = small_qp().solve().unwrap();
        // x1 - lam = 0 and x0 - lam + mu0 = 0
        assert!((sol.lam[0] - 1.5).abs() < 1e-5, "lam = {}", sol.lam[0]);
        assert!((sol.mu[0] - 1.0).abs() < 1e-5, "mu = {}", sol.mu[0]);
        assert_eq!(sol.mu[1], 0.0);
        assert!(sol.pi.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_upper_from_lower_transposes() {
        let mut lower = TriMat::new((2, 2));
        lower.add_triplet(0, 0, 1.0);
        lower.add_triplet(1, 0, 3.0);
        let upper = upper_from_lower(&lower);
        assert!(upper.iter().all(|(_, (i, j))| i <= j));
        assert_eq!(upper.get(0, 1), Some(&3.0));
    }

    #[test]
    fn test_infeasible_qp_is_reported() {
        let mut qp = small_qp();
        qp.u = vec![0.5, 0.5];
        assert!(matches!(
            qp.solve(),
            Err(GridRiskError::SolverNonConvergence { .. })
        ));
    }
}

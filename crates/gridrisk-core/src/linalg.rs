//! Sparse and dense linear-algebra helpers on top of `sprs`.
//!
//! The optimization code works with three shapes of data:
//! - `CsMat<f64>` for fixed matrices (costs, network incidence, constraints)
//! - `TriMat<f64>` for matrices assembled block by block (Hessians, `bmat`)
//! - `Vec<f64>` / `&[f64]` for iterates and gradients
//!
//! Symmetric matrices handed to solvers are stored as their lower triangle
//! (`row >= col`); [`sym_lower_mat_vec`] multiplies with the implied full matrix.

use sprs::{CsMat, TriMat};

/// `y = M x`
pub fn mat_vec(m: &CsMat<f64>, x: &[f64]) -> Vec<f64> {
    debug_assert_eq!(m.cols(), x.len());
    let mut y = vec![0.0; m.rows()];
    for (&v, (i, j)) in m.iter() {
        y[i] += v * x[j];
    }
    y
}

/// `y = M' x`
pub fn mat_t_vec(m: &CsMat<f64>, x: &[f64]) -> Vec<f64> {
    debug_assert_eq!(m.rows(), x.len());
    let mut y = vec![0.0; m.cols()];
    for (&v, (i, j)) in m.iter() {
        y[j] += v * x[i];
    }
    y
}

/// `y = S x` where `S` is symmetric and `lower` holds its lower triangle.
pub fn sym_lower_mat_vec(lower: &TriMat<f64>, x: &[f64]) -> Vec<f64> {
    let mut y = vec![0.0; lower.rows()];
    for (&v, (i, j)) in lower.triplet_iter() {
        y[i] += v * x[j];
        if i != j {
            y[j] += v * x[i];
        }
    }
    y
}

/// Copy `scale * block` into `target` with its top-left corner at `(row0, col0)`.
pub fn add_block(target: &mut TriMat<f64>, row0: usize, col0: usize, block: &CsMat<f64>, scale: f64) {
    for (&v, (i, j)) in block.iter() {
        if v != 0.0 {
            target.add_triplet(row0 + i, col0 + j, scale * v);
        }
    }
}

/// Like [`add_block`] but keeps only the block's lower triangle.
///
/// Used for diagonal blocks of symmetric matrices (`row0 == col0`).
pub fn add_lower_block(target: &mut TriMat<f64>, offset: usize, block: &CsMat<f64>, scale: f64) {
    for (&v, (i, j)) in block.iter() {
        if i >= j && v != 0.0 {
            target.add_triplet(offset + i, offset + j, scale * v);
        }
    }
}

/// `scale * I_n` placed at `(row0, col0)`.
pub fn add_scaled_identity(target: &mut TriMat<f64>, row0: usize, col0: usize, n: usize, scale: f64) {
    for k in 0..n {
        target.add_triplet(row0 + k, col0 + k, scale);
    }
}

/// Diagonal matrix in CSR format.
pub fn diag(values: &[f64]) -> CsMat<f64> {
    let n = values.len();
    let mut tri = TriMat::new((n, n));
    for (k, &v) in values.iter().enumerate() {
        tri.add_triplet(k, k, v);
    }
    tri.to_csr()
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn norm2(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

pub fn norm_inf(a: &[f64]) -> f64 {
    a.iter().fold(0.0_f64, |m, v| m.max(v.abs()))
}

/// `a + b`
pub fn add(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x + y).collect()
}

/// `a - b`
pub fn sub(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x - y).collect()
}

/// `a + alpha * d`
pub fn axpy(a: &[f64], alpha: f64, d: &[f64]) -> Vec<f64> {
    a.iter().zip(d).map(|(x, y)| x + alpha * y).collect()
}

/// Clip each entry of `x` into `[lo_i, hi_i]`.
pub fn clip(x: &[f64], lo: &[f64], hi: &[f64]) -> Vec<f64> {
    x.iter()
        .zip(lo.iter().zip(hi))
        .map(|(&v, (&l, &u))| v.min(u).max(l))
        .collect()
}

use std::sync::Arc;

use faer::Mat;
use log::info;

use crate::addressing::LduAddressing;
use crate::matrix::LduMatrix;

/// 1D Poisson operator on a chain of `n` cells: tridiagonal, symmetric
/// positive definite.
pub fn poisson_1d(n: usize) -> LduMatrix {
    let lower: Vec<usize> = (0..n - 1).collect();
    let upper: Vec<usize> = (1..n).collect();
    let addr = Arc::new(LduAddressing::new(n, lower, upper));
    let mut mat = LduMatrix::symmetric(addr);
    mat.diag_mut().fill(2.0);
    mat.upper_mut().fill(-1.0);
    mat
}

/// 7-point Poisson operator on a structured `nx * ny * nz` grid, with a
/// constant diagonal so the matrix stays positive definite regardless of the
/// grid shape. Faces come out sorted in upper-triangular order.
pub fn poisson_3d(nx: usize, ny: usize, nz: usize) -> LduMatrix {
    let index = |i: usize, j: usize, k: usize| i + nx * (j + ny * k);
    let mut lower = Vec::new();
    let mut upper = Vec::new();
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let c = index(i, j, k);
                if i + 1 < nx {
                    lower.push(c);
                    upper.push(index(i + 1, j, k));
                }
                if j + 1 < ny {
                    lower.push(c);
                    upper.push(index(i, j + 1, k));
                }
                if k + 1 < nz {
                    lower.push(c);
                    upper.push(index(i, j, k + 1));
                }
            }
        }
    }
    let addr = Arc::new(LduAddressing::new(nx * ny * nz, lower, upper));
    let mut mat = LduMatrix::symmetric(addr);
    mat.diag_mut().fill(6.0);
    mat.upper_mut().fill(-1.0);
    mat
}

/// 1D convection-diffusion operator: tridiagonal and asymmetric, with the
/// skew controlled by the convective weight `gamma` in (0, 1).
pub fn convection_diffusion_1d(n: usize, gamma: f64) -> LduMatrix {
    let lower: Vec<usize> = (0..n - 1).collect();
    let upper: Vec<usize> = (1..n).collect();
    let addr = Arc::new(LduAddressing::new(n, lower, upper));
    let mut mat = LduMatrix::asymmetric(addr);
    mat.diag_mut().fill(2.5);
    mat.upper_mut().fill(-1.0 + gamma);
    mat.lower_mut().fill(-1.0 - gamma);
    mat
}

/// Expands an LDU matrix to a dense faer matrix, for direct factorization of
/// coarse levels and for reference computations in tests.
pub fn to_dense(matrix: &LduMatrix) -> Mat<f64> {
    let n = matrix.n_cells();
    let addr = matrix.addressing();
    let mut dense = Mat::zeros(n, n);
    for (cell, &d) in matrix.diag().iter().enumerate() {
        dense[(cell, cell)] = d;
    }
    let upper = matrix.upper();
    let lower = matrix.lower();
    for face in 0..addr.n_faces() {
        let l = addr.lower_addr()[face];
        let u = addr.upper_addr()[face];
        dense[(l, u)] = upper[face];
        dense[(u, l)] = lower[face];
    }
    dense
}

/// Logs size, sparsity and diagonal-dominance figures for a matrix.
pub fn matrix_stats(name: &str, matrix: &LduMatrix) {
    let n = matrix.n_cells();
    let nnz = n + 2 * matrix.n_faces();

    let mut off_diag = vec![0.0; n];
    matrix.sum_mag_off_diag(&mut off_diag);
    let dominant = matrix
        .diag()
        .iter()
        .zip(off_diag.iter())
        .filter(|(d, o)| d.abs() >= **o)
        .count();

    info!(
        "{}: {} cells, {} faces, {:.4} nnz/row, {} symmetric, {}/{} diagonally dominant rows",
        name,
        n,
        matrix.n_faces(),
        nnz as f64 / n as f64,
        if matrix.is_symmetric() { "is" } else { "not" },
        dominant,
        n
    );
}

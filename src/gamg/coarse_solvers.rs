use faer::linalg::solvers::{Llt as DenseLlt, PartialPivLu, SolveCore};
use faer::{Conj, Mat, Side};
use log::warn;

use crate::matrix::LduMatrix;
use crate::utils::to_dense;

/// Direct solver for the coarsest multigrid level, where a dense
/// factorization is cheap relative to the sub-problem size. Symmetric
/// matrices take a Cholesky factorization, asymmetric ones partial-pivoting
/// LU; an indefinite symmetric coarse matrix falls back to LU.
pub enum CoarseSolver {
    Cholesky(DenseLlt<f64>),
    Lu(PartialPivLu<f64>),
}

impl CoarseSolver {
    pub fn new(matrix: &LduMatrix) -> Self {
        let dense = to_dense(matrix);
        if matrix.is_symmetric() {
            match dense.llt(Side::Lower) {
                Ok(llt) => return CoarseSolver::Cholesky(llt),
                Err(_) => {
                    warn!(
                        "coarsest level ({} cells) is not positive definite, \
                         falling back to LU",
                        matrix.n_cells()
                    );
                }
            }
        }
        CoarseSolver::Lu(dense.partial_piv_lu())
    }

    pub fn solve(&self, x: &mut [f64], b: &[f64]) {
        let mut rhs = Mat::from_fn(b.len(), 1, |i, _| b[i]);
        match self {
            CoarseSolver::Cholesky(decomp) => {
                decomp.solve_in_place_with_conj(Conj::No, rhs.as_mut());
            }
            CoarseSolver::Lu(decomp) => {
                decomp.solve_in_place_with_conj(Conj::No, rhs.as_mut());
            }
        }
        for (cell, xi) in x.iter_mut().enumerate() {
            *xi = rhs[(cell, 0)];
        }
    }
}

use std::sync::Arc;

use crate::addressing::LduAddressing;
use crate::matrix::LduMatrix;
use crate::preconditioners::Preconditioner;

/// Simplified diagonal-based incomplete Cholesky preconditioner for symmetric
/// matrices: only the diagonal of the factorization is modified, the
/// off-diagonal coefficients are used as stored.
///
/// The substitution sweeps run in plain face order, which is a valid
/// elimination order because the addressing is upper-triangular and sorted by
/// owner: every face writing into cell `u` is preceded by all faces writing
/// into cells below `u`.
pub struct DicPreconditioner {
    addressing: Arc<LduAddressing>,
    upper: Vec<f64>,
    /// Reciprocal of the factorized diagonal.
    r_d: Vec<f64>,
}

impl DicPreconditioner {
    pub fn new(matrix: &LduMatrix) -> Self {
        if !matrix.is_symmetric() {
            panic!("DIC preconditioner requires a symmetric matrix; use DILU instead");
        }
        let addr = matrix.addressing();
        let upper = matrix.upper().to_vec();
        let mut r_d = matrix.diag().to_vec();

        for face in 0..addr.n_faces() {
            let l = addr.lower_addr()[face];
            let u = addr.upper_addr()[face];
            r_d[u] -= upper[face] * upper[face] / r_d[l];
        }
        for d in r_d.iter_mut() {
            *d = 1.0 / *d;
        }

        Self {
            addressing: Arc::clone(addr),
            upper,
            r_d,
        }
    }
}

impl Preconditioner for DicPreconditioner {
    fn precondition(&mut self, w: &mut [f64], r: &[f64]) {
        let addr = &self.addressing;
        let r_d = &self.r_d;
        let upper = &self.upper;

        for (cell, wi) in w.iter_mut().enumerate() {
            *wi = r_d[cell] * r[cell];
        }
        for face in 0..addr.n_faces() {
            let l = addr.lower_addr()[face];
            let u = addr.upper_addr()[face];
            w[u] -= r_d[u] * upper[face] * w[l];
        }
        for face in (0..addr.n_faces()).rev() {
            let l = addr.lower_addr()[face];
            let u = addr.upper_addr()[face];
            w[l] -= r_d[l] * upper[face] * w[u];
        }
    }
}

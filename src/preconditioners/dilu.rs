use std::sync::Arc;

use crate::addressing::LduAddressing;
use crate::matrix::LduMatrix;
use crate::preconditioners::Preconditioner;

/// Diagonal-based incomplete LU preconditioner for asymmetric matrices. The
/// factorized diagonal absorbs the product of opposing off-diagonals; the
/// substitution sweeps use the stored upper/lower coefficients directly.
///
/// `precondition_transpose` performs the substitution for the transposed
/// system by swapping the roles of the upper and lower coefficients, as
/// required by PBiCG.
pub struct DiluPreconditioner {
    addressing: Arc<LduAddressing>,
    upper: Vec<f64>,
    lower: Vec<f64>,
    r_d: Vec<f64>,
}

impl DiluPreconditioner {
    pub fn new(matrix: &LduMatrix) -> Self {
        let addr = matrix.addressing();
        let upper = matrix.upper().to_vec();
        let lower = matrix.lower().to_vec();
        let mut r_d = matrix.diag().to_vec();

        // Face order is a valid elimination order, see DicPreconditioner.
        for face in 0..addr.n_faces() {
            let l = addr.lower_addr()[face];
            let u = addr.upper_addr()[face];
            r_d[u] -= upper[face] * lower[face] / r_d[l];
        }
        for d in r_d.iter_mut() {
            *d = 1.0 / *d;
        }

        Self {
            addressing: Arc::clone(addr),
            upper,
            lower,
            r_d,
        }
    }

    fn substitute(&self, w: &mut [f64], r: &[f64], forward: &[f64], backward: &[f64]) {
        let addr = &self.addressing;
        let r_d = &self.r_d;

        for (cell, wi) in w.iter_mut().enumerate() {
            *wi = r_d[cell] * r[cell];
        }
        for face in 0..addr.n_faces() {
            let l = addr.lower_addr()[face];
            let u = addr.upper_addr()[face];
            w[u] -= r_d[u] * forward[face] * w[l];
        }
        for face in (0..addr.n_faces()).rev() {
            let l = addr.lower_addr()[face];
            let u = addr.upper_addr()[face];
            w[l] -= r_d[l] * backward[face] * w[u];
        }
    }
}

impl Preconditioner for DiluPreconditioner {
    fn precondition(&mut self, w: &mut [f64], r: &[f64]) {
        self.substitute(w, r, &self.lower, &self.upper);
    }

    fn precondition_transpose(&mut self, w: &mut [f64], r: &[f64]) {
        self.substitute(w, r, &self.upper, &self.lower);
    }
}

use std::sync::Arc;

use rayon::iter::{IndexedParallelIterator, IntoParallelRefMutIterator, ParallelIterator};

use crate::addressing::LduAddressing;
use crate::VSMALL;

/// Cell count above which the matrix-vector product switches from the serial
/// face loop to the rayon row-wise kernel.
const PAR_CELL_THRESHOLD: usize = 16_384;

/// Sparse matrix in LDU form: a dense diagonal (one coefficient per cell) and
/// off-diagonal coefficients stored per internal face of the owner/neighbour
/// addressing. `upper[f]` couples the owner row to the neighbour column,
/// `lower[f]` the neighbour row to the owner column.
///
/// A symmetric matrix stores a single off-diagonal array; `lower` is only
/// materialized once a caller asks for distinct lower coefficients.
pub struct LduMatrix {
    addressing: Arc<LduAddressing>,
    diag: Vec<f64>,
    upper: Vec<f64>,
    lower: Option<Vec<f64>>,
}

impl LduMatrix {
    /// Zero-initialized symmetric matrix over the given addressing.
    pub fn symmetric(addressing: Arc<LduAddressing>) -> Self {
        let n_cells = addressing.n_cells();
        let n_faces = addressing.n_faces();
        Self {
            addressing,
            diag: vec![0.0; n_cells],
            upper: vec![0.0; n_faces],
            lower: None,
        }
    }

    /// Zero-initialized asymmetric matrix with distinct upper/lower arrays.
    pub fn asymmetric(addressing: Arc<LduAddressing>) -> Self {
        let mut mat = Self::symmetric(addressing);
        mat.lower = Some(vec![0.0; mat.upper.len()]);
        mat
    }

    /// Builds a matrix from preassembled coefficient arrays, panicking when
    /// the array sizes disagree with the addressing.
    pub fn from_coeffs(
        addressing: Arc<LduAddressing>,
        diag: Vec<f64>,
        upper: Vec<f64>,
        lower: Option<Vec<f64>>,
    ) -> Self {
        if diag.len() != addressing.n_cells() {
            panic!(
                "diagonal has {} coefficients but the addressing has {} cells",
                diag.len(),
                addressing.n_cells()
            );
        }
        if upper.len() != addressing.n_faces() {
            panic!(
                "upper has {} coefficients but the addressing has {} faces",
                upper.len(),
                addressing.n_faces()
            );
        }
        if let Some(lower) = &lower {
            if lower.len() != addressing.n_faces() {
                panic!(
                    "lower has {} coefficients but the addressing has {} faces",
                    lower.len(),
                    addressing.n_faces()
                );
            }
        }
        Self {
            addressing,
            diag,
            upper,
            lower,
        }
    }

    pub fn addressing(&self) -> &Arc<LduAddressing> {
        &self.addressing
    }

    pub fn n_cells(&self) -> usize {
        self.addressing.n_cells()
    }

    pub fn n_faces(&self) -> usize {
        self.addressing.n_faces()
    }

    pub fn is_symmetric(&self) -> bool {
        self.lower.is_none()
    }

    /// True when the matrix carries no off-diagonal coupling at all.
    pub fn is_diagonal(&self) -> bool {
        self.addressing.n_faces() == 0
    }

    pub fn diag(&self) -> &[f64] {
        &self.diag
    }

    pub fn diag_mut(&mut self) -> &mut [f64] {
        &mut self.diag
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    pub fn upper_mut(&mut self) -> &mut [f64] {
        &mut self.upper
    }

    /// Lower coefficients; for a symmetric matrix this is the upper array.
    pub fn lower(&self) -> &[f64] {
        self.lower.as_deref().unwrap_or(&self.upper)
    }

    /// Mutable lower coefficients. Promotes a symmetric matrix to asymmetric
    /// by cloning the shared off-diagonal array.
    pub fn lower_mut(&mut self) -> &mut [f64] {
        if self.lower.is_none() {
            self.lower = Some(self.upper.clone());
        }
        self.lower.as_mut().unwrap()
    }

    fn check_vector(&self, name: &str, len: usize) {
        if len != self.n_cells() {
            panic!(
                "{} has {} entries but the matrix has {} cells",
                name,
                len,
                self.n_cells()
            );
        }
    }

    /// `out = A * x`.
    pub fn amul(&self, out: &mut [f64], x: &[f64]) {
        self.check_vector("product", out.len());
        self.check_vector("operand", x.len());
        self.mul_impl(out, x, &self.upper, self.lower());
    }

    /// `out = transpose(A) * x`. Equal to `amul` for a symmetric matrix.
    pub fn tmul(&self, out: &mut [f64], x: &[f64]) {
        self.check_vector("product", out.len());
        self.check_vector("operand", x.len());
        self.mul_impl(out, x, self.lower(), &self.upper);
    }

    fn mul_impl(&self, out: &mut [f64], x: &[f64], upper: &[f64], lower: &[f64]) {
        if self.n_cells() >= PAR_CELL_THRESHOLD {
            self.mul_rowwise(out, x, upper, lower);
        } else {
            self.mul_facewise(out, x, upper, lower);
        }
    }

    fn mul_facewise(&self, out: &mut [f64], x: &[f64], upper: &[f64], lower: &[f64]) {
        let addr = &self.addressing;
        for (cell, o) in out.iter_mut().enumerate() {
            *o = self.diag[cell] * x[cell];
        }
        for face in 0..addr.n_faces() {
            let l = addr.lower_addr()[face];
            let u = addr.upper_addr()[face];
            out[l] += upper[face] * x[u];
            out[u] += lower[face] * x[l];
        }
    }

    // Row-wise form of the face loop: every cell accumulates its own row, so
    // rows can be computed independently across threads.
    fn mul_rowwise(&self, out: &mut [f64], x: &[f64], upper: &[f64], lower: &[f64]) {
        let addr = &self.addressing;
        let diag = &self.diag;
        out.par_iter_mut().enumerate().for_each(|(cell, o)| {
            let mut acc = diag[cell] * x[cell];
            for face in addr.owner_faces(cell) {
                acc += upper[face] * x[addr.upper_addr()[face]];
            }
            for &face in addr.neighbour_faces(cell) {
                acc += lower[face] * x[addr.lower_addr()[face]];
            }
            *o = acc;
        });
    }

    /// `out = b - A * x`, with the same floating-point operations as `amul`
    /// followed by the subtraction.
    pub fn residual(&self, out: &mut [f64], x: &[f64], b: &[f64]) {
        self.check_vector("source", b.len());
        self.amul(out, x);
        for (o, &bi) in out.iter_mut().zip(b.iter()) {
            *o = bi - *o;
        }
    }

    /// Row sums `out[c] = diag[c] + sum of off-diagonals in row c`.
    pub fn sum_a(&self, out: &mut [f64]) {
        self.check_vector("row sums", out.len());
        out.copy_from_slice(&self.diag);
        let addr = &self.addressing;
        let lower = self.lower();
        for face in 0..addr.n_faces() {
            out[addr.lower_addr()[face]] += self.upper[face];
            out[addr.upper_addr()[face]] += lower[face];
        }
    }

    /// Per-row sum of off-diagonal magnitudes, for diagonal-dominance
    /// diagnostics.
    pub fn sum_mag_off_diag(&self, out: &mut [f64]) {
        self.check_vector("off-diagonal sums", out.len());
        out.fill(0.0);
        let addr = &self.addressing;
        let lower = self.lower();
        for face in 0..addr.n_faces() {
            out[addr.lower_addr()[face]] += self.upper[face].abs();
            out[addr.upper_addr()[face]] += lower[face].abs();
        }
    }

    /// Normalization factor for residual norms, so convergence tolerances are
    /// comparable across equations of different scale:
    /// `sum(|A x - A x_ref| + |b - A x_ref|) + VSMALL` with `x_ref` the mean
    /// of the solution. `ax` must hold `A * x`.
    pub fn norm_factor(&self, x: &[f64], b: &[f64], ax: &[f64]) -> f64 {
        let n = self.n_cells() as f64;
        let x_ref = x.iter().sum::<f64>() / n;

        let mut row_sums = vec![0.0; self.n_cells()];
        self.sum_a(&mut row_sums);

        let mut norm = 0.0;
        for cell in 0..self.n_cells() {
            let ax_ref = row_sums[cell] * x_ref;
            norm += (ax[cell] - ax_ref).abs() + (b[cell] - ax_ref).abs();
        }
        norm + VSMALL
    }
}

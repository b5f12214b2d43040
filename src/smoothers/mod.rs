use std::sync::Arc;

use crate::matrix::LduMatrix;
use crate::registry::Registry;

/// Relaxation operator applied a fixed number of times, either as a cheap
/// standalone solver (`smoothSolver`) or as the per-level smoother inside the
/// multigrid cycle. Smoothers carry no stopping criterion of their own; the
/// caller fixes the sweep count.
pub trait Smoother {
    fn smooth(&mut self, x: &mut [f64], b: &[f64], n_sweeps: usize);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOrder {
    Forward,
    Backward,
    /// One forward plus one backward pass per sweep.
    Symmetric,
}

/// Gauss-Seidel relaxation over the LDU addressing, handling symmetric and
/// asymmetric matrices alike.
pub struct GaussSeidelSmoother {
    matrix: Arc<LduMatrix>,
    order: SweepOrder,
}

impl GaussSeidelSmoother {
    pub fn new(matrix: Arc<LduMatrix>, order: SweepOrder) -> Self {
        Self { matrix, order }
    }

    fn relax_cell(&self, x: &mut [f64], b: &[f64], cell: usize) {
        let matrix = &self.matrix;
        let addr = matrix.addressing();
        let upper = matrix.upper();
        let lower = matrix.lower();

        let mut acc = b[cell];
        for face in addr.owner_faces(cell) {
            acc -= upper[face] * x[addr.upper_addr()[face]];
        }
        for &face in addr.neighbour_faces(cell) {
            acc -= lower[face] * x[addr.lower_addr()[face]];
        }
        x[cell] = acc / matrix.diag()[cell];
    }

    fn forward(&self, x: &mut [f64], b: &[f64]) {
        for cell in 0..self.matrix.n_cells() {
            self.relax_cell(x, b, cell);
        }
    }

    fn backward(&self, x: &mut [f64], b: &[f64]) {
        for cell in (0..self.matrix.n_cells()).rev() {
            self.relax_cell(x, b, cell);
        }
    }
}

impl Smoother for GaussSeidelSmoother {
    fn smooth(&mut self, x: &mut [f64], b: &[f64], n_sweeps: usize) {
        for _ in 0..n_sweeps {
            match self.order {
                SweepOrder::Forward => self.forward(x, b),
                SweepOrder::Backward => self.backward(x, b),
                SweepOrder::Symmetric => {
                    self.forward(x, b);
                    self.backward(x, b);
                }
            }
        }
    }
}

pub type SmootherFactory = fn(Arc<LduMatrix>) -> Box<dyn Smoother>;

/// Registry of the built-in smoothers.
pub fn standard() -> Registry<SmootherFactory> {
    let mut reg: Registry<SmootherFactory> = Registry::new("smoother");
    reg.insert("GaussSeidel", |matrix| {
        Box::new(GaussSeidelSmoother::new(matrix, SweepOrder::Forward))
    });
    reg.insert("backGaussSeidel", |matrix| {
        Box::new(GaussSeidelSmoother::new(matrix, SweepOrder::Backward))
    });
    reg.insert("symGaussSeidel", |matrix| {
        Box::new(GaussSeidelSmoother::new(matrix, SweepOrder::Symmetric))
    });
    reg
}
